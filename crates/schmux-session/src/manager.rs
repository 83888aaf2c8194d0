// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session manager (C7): a thin coordinator that builds a
//! [`SessionTracker`] and, for local sessions, a `FileSignalWatcher` per
//! session, wiring both to the same signal callback so the two transports
//! produce identical downstream effects.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use schmux_core::{Error, Session, SessionId, ShortId, Signal, SignalState};
use schmux_signal::FileSignalWatcher;
use schmux_storage::{log_and_ignore, StateStore};
use tokio::sync::broadcast;

use crate::adapter::SessionAdapter;
use crate::tracker::SessionTracker;

/// Shared by every session's `SessionTracker` and `FileSignalWatcher`. Maps
/// a signal onto the persisted nudge/sequence fields and notifies the
/// external broadcaster, in that fixed order.
pub struct SignalCallback {
    store: StateStore,
    broadcast: Arc<dyn Fn(SessionId, Signal) + Send + Sync>,
}

impl SignalCallback {
    pub fn new(store: StateStore, broadcast: Arc<dyn Fn(SessionId, Signal) + Send + Sync>) -> Self {
        Self { store, broadcast }
    }

    /// (a) maps the signal to a nudge payload, (b) increments the
    /// sequence, (c) stamps `last_signal_at`, (d) sets or clears the
    /// nudge, (e) schedules a batched save, (f) invokes the external
    /// broadcast. Store failures are logged and otherwise ignored: a
    /// dropped nudge update must never take the process down.
    pub fn handle(&self, session_id: SessionId, signal: Signal) {
        let payload = nudge_payload(&signal);

        self.store.increment_nudge_seq(&session_id);
        log_and_ignore(
            "update_session_last_signal",
            self.store.update_session_last_signal(&session_id, Utc::now()),
        );

        if signal.state == SignalState::Working {
            log_and_ignore("clear_session_nudge", self.store.clear_session_nudge(&session_id).map(|_| ()));
        } else {
            log_and_ignore("update_session_nudge", self.store.update_session_nudge(&session_id, payload));
        }

        let store = self.store.clone();
        tokio::spawn(async move { store.save_batched().await });

        (self.broadcast)(session_id, signal);
    }
}

/// Opaque JSON attention-state payload stored on `Session.nudge`.
fn nudge_payload(signal: &Signal) -> String {
    serde_json::json!({
        "state": signal.state.as_wire_token(),
        "message": signal.message,
    })
    .to_string()
}

struct TrackedSession<A: SessionAdapter> {
    tracker: Arc<SessionTracker<A>>,
    /// `None` for a remote session: the file it would watch lives on the
    /// remote host, outside this process's filesystem, so a lightweight
    /// remote monitor owns status delivery for it instead.
    watcher: Option<FileSignalWatcher>,
}

/// Creates and wires a [`SessionTracker`] plus, for local sessions, a
/// `FileSignalWatcher`, per session.
pub struct SessionManager<A: SessionAdapter> {
    adapter: A,
    store: StateStore,
    callback: Arc<SignalCallback>,
    sessions: Mutex<HashMap<SessionId, TrackedSession<A>>>,
}

impl<A: SessionAdapter> SessionManager<A> {
    pub fn new(adapter: A, store: StateStore, callback: Arc<SignalCallback>) -> Self {
        Self {
            adapter,
            store,
            callback,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts tracking `session`. A no-op (returns `Ok`) if already
    /// tracked. For a local session this also starts the file signal
    /// watcher at `<workspace>/.schmux/signal/<session-id>` and seeds its
    /// dedup cache from whatever the file already contains, so a value
    /// written while the daemon was down is not replayed as a fresh nudge
    /// once the watcher starts observing it.
    pub fn start_session(&self, session: &Session) -> Result<(), Error> {
        if self.sessions.lock().contains_key(&session.id) {
            return Ok(());
        }

        let tracker_callback = self.callback.clone();
        let tracker_session_id = session.id.clone();
        let tracker = SessionTracker::start(
            self.adapter.clone(),
            session.id.clone(),
            session.tmux_session.clone(),
            move |signal| tracker_callback.handle(tracker_session_id.clone(), signal),
        );

        let watcher = if session.is_remote() {
            None
        } else {
            let workspace = self
                .store
                .get_workspace(&session.workspace_id)
                .ok_or_else(|| Error::not_found(&session.workspace_id))?;
            let signal_path =
                PathBuf::from(&workspace.path).join(".schmux").join("signal").join(session.id.as_str());

            let watcher_callback = self.callback.clone();
            let watcher_session_id = session.id.clone();
            let watcher = FileSignalWatcher::start(
                signal_path,
                move |signal| watcher_callback.handle(watcher_session_id.clone(), signal),
                |invalid| tracing::warn!(content = %invalid, "session manager: invalid file signal content"),
            )
            .map_err(|e| Error::invalid(e.to_string()))?;

            // Populate the dedup cache without replaying a stale signal.
            let _ = watcher.read_current();
            Some(watcher)
        };

        self.sessions.lock().insert(session.id.clone(), TrackedSession { tracker, watcher });
        Ok(())
    }

    /// Stops and forgets the session's tracker and watcher, if any.
    pub fn stop_session(&self, id: &SessionId) {
        if let Some(mut tracked) = self.sessions.lock().remove(id) {
            tracked.tracker.stop();
            if let Some(watcher) = tracked.watcher.as_mut() {
                watcher.stop();
            }
        }
    }

    pub fn subscribe_output(&self, id: &SessionId) -> Option<broadcast::Receiver<bytes::Bytes>> {
        self.sessions.lock().get(id).map(|s| s.tracker.subscribe())
    }

    pub fn set_tmux_session(&self, id: &SessionId, name: impl Into<String>) {
        if let Some(tracked) = self.sessions.lock().get(id) {
            tracked.tracker.set_tmux_session(name);
        }
    }

    pub fn is_tracked(&self, id: &SessionId) -> bool {
        self.sessions.lock().contains_key(id)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
