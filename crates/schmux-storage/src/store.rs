// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `StateStore`: the guarded, persisted document plus its CRUD surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use schmux_core::{
    Error, Preview, PreviewId, RemoteHost, RemoteHostId, Session, SessionId, Workspace,
    WorkspaceId, WorkspaceStatus,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::document::Document;
use crate::snapshot;

const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

struct Inner {
    document: RwLock<Document>,
    path: PathBuf,
    debounce: Duration,
    pending_save: AsyncMutex<Option<JoinHandle<()>>>,
}

/// The in-memory, process-wide document with atomic file persistence and
/// coalesced saves. Cheap to clone; every clone shares the same guarded
/// document and the same pending-save timer.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

impl StateStore {
    /// Loads `path` if present, or starts from an empty document. This is
    /// the only place a `StateStore` is constructed; callers thread the
    /// resulting value explicitly rather than looking it up from a global.
    pub fn load(path: PathBuf) -> Result<Self, Error> {
        let document = snapshot::load(&path)?;
        Ok(Self {
            inner: Arc::new(Inner {
                document: RwLock::new(document),
                path,
                debounce: DEFAULT_SAVE_DEBOUNCE,
                pending_save: AsyncMutex::new(None),
            }),
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        let inner = Arc::get_mut(&mut self.inner);
        debug_assert!(inner.is_some(), "with_debounce must run before cloning");
        if let Some(inner) = inner {
            inner.debounce = debounce;
        }
        self
    }

    // ---- workspaces ----------------------------------------------------

    pub fn add_workspace(&self, workspace: Workspace) {
        self.inner
            .document
            .write()
            .workspaces
            .insert(workspace.id.clone(), workspace);
    }

    pub fn update_workspace(&self, workspace: Workspace) -> Result<(), Error> {
        let mut doc = self.inner.document.write();
        if !doc.workspaces.contains_key(&workspace.id) {
            return Err(Error::not_found(&workspace.id));
        }
        doc.workspaces.insert(workspace.id.clone(), workspace);
        Ok(())
    }

    pub fn remove_workspace(&self, id: &WorkspaceId) -> Result<Workspace, Error> {
        let mut doc = self.inner.document.write();
        let workspace = doc.workspaces.remove(id).ok_or_else(|| Error::not_found(id))?;
        doc.previews.retain(|_, preview| &preview.workspace_id != id);
        Ok(workspace)
    }

    pub fn get_workspace(&self, id: &WorkspaceId) -> Option<Workspace> {
        self.inner.document.read().workspaces.get(id).cloned()
    }

    pub fn get_workspaces(&self) -> Vec<Workspace> {
        self.inner.document.read().workspaces.values().cloned().collect()
    }

    pub fn find_available_workspace(&self, repo: &str) -> Option<Workspace> {
        self.inner
            .document
            .read()
            .workspaces
            .values()
            .find(|w| w.repo == repo && matches!(w.status, WorkspaceStatus::Ready))
            .cloned()
    }

    // ---- sessions --------------------------------------------------------

    pub fn add_session(&self, session: Session) {
        self.inner
            .document
            .write()
            .sessions
            .insert(session.id.clone(), session);
    }

    pub fn update_session(&self, session: Session) -> Result<(), Error> {
        let mut doc = self.inner.document.write();
        if !doc.sessions.contains_key(&session.id) {
            return Err(Error::not_found(&session.id));
        }
        doc.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    pub fn remove_session(&self, id: &SessionId) -> Result<Session, Error> {
        self.inner
            .document
            .write()
            .sessions
            .remove(id)
            .ok_or_else(|| Error::not_found(id))
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.inner.document.read().sessions.get(id).cloned()
    }

    pub fn get_sessions(&self) -> Vec<Session> {
        self.inner.document.read().sessions.values().cloned().collect()
    }

    /// Atomic read-modify-write; returns the new value, or 0 if the session
    /// is unknown. Never panics.
    pub fn increment_nudge_seq(&self, id: &SessionId) -> u64 {
        let mut doc = self.inner.document.write();
        match doc.sessions.get_mut(id) {
            Some(session) => {
                session.nudge_seq += 1;
                session.nudge_seq
            }
            None => 0,
        }
    }

    pub fn get_nudge_seq(&self, id: &SessionId) -> Option<u64> {
        self.inner.document.read().sessions.get(id).map(|s| s.nudge_seq)
    }

    pub fn update_session_last_signal(&self, id: &SessionId, ts: DateTime<Utc>) -> Result<(), Error> {
        let mut doc = self.inner.document.write();
        let session = doc.sessions.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        session.last_signal_at = Some(ts);
        Ok(())
    }

    /// In-memory only; never persisted and never triggers a save.
    pub fn update_session_last_output(&self, id: &SessionId, at: Instant) -> Result<(), Error> {
        let mut doc = self.inner.document.write();
        let session = doc.sessions.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        session.last_output_at = Some(at);
        Ok(())
    }

    pub fn update_session_nudge(&self, id: &SessionId, payload: impl Into<String>) -> Result<(), Error> {
        let mut doc = self.inner.document.write();
        let session = doc.sessions.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        session.nudge = payload.into();
        Ok(())
    }

    /// Returns whether the field was non-empty before clearing.
    pub fn clear_session_nudge(&self, id: &SessionId) -> Result<bool, Error> {
        let mut doc = self.inner.document.write();
        let session = doc.sessions.get_mut(id).ok_or_else(|| Error::not_found(id))?;
        let was_set = !session.nudge.is_empty();
        session.nudge.clear();
        Ok(was_set)
    }

    // ---- remote hosts ------------------------------------------------

    pub fn add_remote_host(&self, host: RemoteHost) {
        self.inner.document.write().remote_hosts.insert(host.id.clone(), host);
    }

    pub fn update_remote_host(&self, host: RemoteHost) -> Result<(), Error> {
        let mut doc = self.inner.document.write();
        if !doc.remote_hosts.contains_key(&host.id) {
            return Err(Error::not_found(&host.id));
        }
        doc.remote_hosts.insert(host.id.clone(), host);
        Ok(())
    }

    pub fn remove_remote_host(&self, id: &RemoteHostId) -> Result<RemoteHost, Error> {
        self.inner
            .document
            .write()
            .remote_hosts
            .remove(id)
            .ok_or_else(|| Error::not_found(id))
    }

    pub fn get_remote_host(&self, id: &RemoteHostId) -> Option<RemoteHost> {
        self.inner.document.read().remote_hosts.get(id).cloned()
    }

    pub fn get_remote_hosts(&self) -> Vec<RemoteHost> {
        self.inner.document.read().remote_hosts.values().cloned().collect()
    }

    // ---- previews ------------------------------------------------------

    pub fn add_preview(&self, preview: Preview) {
        self.inner.document.write().previews.insert(preview.id.clone(), preview);
    }

    pub fn remove_preview(&self, id: &PreviewId) -> Result<Preview, Error> {
        self.inner
            .document
            .write()
            .previews
            .remove(id)
            .ok_or_else(|| Error::not_found(id))
    }

    pub fn get_preview(&self, id: &PreviewId) -> Option<Preview> {
        self.inner.document.read().previews.get(id).cloned()
    }

    pub fn previews_for_workspace(&self, workspace_id: &WorkspaceId) -> Vec<Preview> {
        self.inner
            .document
            .read()
            .previews
            .values()
            .filter(|p| &p.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    // ---- persistence ----------------------------------------------------

    /// Writes the entire document atomically. Logged, not propagated, on
    /// failure — callers are expected to read the log; in-memory state is
    /// unaffected either way.
    pub fn save(&self) -> Result<(), Error> {
        let snapshot = self.inner.document.read().clone();
        snapshot::save(&self.inner.path, &snapshot)
    }

    /// Schedules `save` to run after a quiet period, coalescing any number
    /// of calls into at most one write. A pending timer is reset on every
    /// call; concurrent callers never block on one another beyond the
    /// short critical section guarding the timer handle itself.
    pub async fn save_batched(&self) {
        let mut pending = self.inner.pending_save.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let store = self.clone();
        let debounce = self.inner.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = store.save() {
                error!(error = %e, "state store save_batched failed");
            }
        }));
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

/// Logs and swallows a store error from a context that must not fail (the
/// signal callback path, per the error handling design: defensive, never
/// crashes the process).
pub fn log_and_ignore(context: &str, result: Result<(), Error>) {
    if let Err(e) = result {
        warn!(context, error = %e, "state store operation failed");
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
