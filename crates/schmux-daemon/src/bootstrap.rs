// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires C1 through C7 and the externally-injected callbacks into one
//! `Daemon` handle. Contains no subsystem logic of its own — the dashboard,
//! CLI, and tmux subprocess wrapper live elsewhere — only construction
//! order and explicit dependency threading: the store, session manager,
//! and overlay manager are constructed once here and passed down, never
//! discovered by lookup.

use std::sync::{Arc, OnceLock};

use schmux_core::{Error, Session, SessionId, Workspace};
use schmux_overlay::{LlmExecutor, ManifestUpdateFn, OverlayManager};
use schmux_session::{SessionAdapter, SessionManager, SignalCallback, TmuxAdapter};
use schmux_storage::StateStore;
use thiserror::Error;

use crate::config::Config;
use crate::overlay_entries::{declared_paths, repo_name_from_url};
use crate::propagate::make_propagate;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    State(#[from] Error),
    #[error("overlay watcher failed to start: {0}")]
    Overlay(#[from] schmux_overlay::WatcherError),
}

/// Everything the process entry point needs after bootstrap: the store
/// (persistence and CRUD), the session manager (C6+C7, generic over the
/// session adapter so tests can substitute `FakeSessionAdapter`), and the
/// overlay manager (C4+C5).
pub struct Daemon<A: SessionAdapter> {
    pub config: Config,
    pub store: StateStore,
    pub session_manager: Arc<SessionManager<A>>,
    pub overlay_manager: OverlayManager,
}

impl Daemon<TmuxAdapter> {
    /// Bootstraps the daemon against a real tmux-backed session adapter —
    /// the binary entry point's only construction path. `broadcast` and
    /// `llm_executor` are externally-supplied callbacks; the dashboard and
    /// WebSocket layer and the LLM inference backend both live outside
    /// this crate and are injected rather than looked up.
    pub fn bootstrap(
        config: Config,
        broadcast: Arc<dyn Fn(SessionId, schmux_core::Signal) + Send + Sync>,
        llm_executor: Option<Arc<dyn LlmExecutor>>,
    ) -> Result<Self, BootstrapError> {
        Self::bootstrap_with_adapter(config, TmuxAdapter::new(), broadcast, llm_executor)
    }
}

impl<A: SessionAdapter> Daemon<A> {
    /// Adapter-generic bootstrap path, used directly by tests with
    /// `FakeSessionAdapter` and by the real entry point via
    /// [`Daemon::bootstrap`].
    pub fn bootstrap_with_adapter(
        config: Config,
        adapter: A,
        broadcast: Arc<dyn Fn(SessionId, schmux_core::Signal) + Send + Sync>,
        llm_executor: Option<Arc<dyn LlmExecutor>>,
    ) -> Result<Self, BootstrapError> {
        let store = StateStore::load(config.state_file_path.clone())?.with_debounce(config.save_debounce());

        let signal_callback = Arc::new(SignalCallback::new(store.clone(), broadcast));
        let session_manager = Arc::new(SessionManager::new(adapter, store.clone(), signal_callback));

        // `OverlayManager::new` requires a `PropagateFn`, but that closure
        // needs to call back into the manager (`suppress`,
        // `set_manifest_entry`) once it exists. The cell is filled
        // immediately below, strictly before any workspace is registered.
        let overlay_cell: Arc<OnceLock<OverlayManager>> = Arc::new(OnceLock::new());
        let propagate = make_propagate(store.clone(), overlay_cell.clone());
        let on_manifest_update = make_manifest_update_sink(store.clone());

        let overlay_manager =
            OverlayManager::new(config.overlay_root.clone(), propagate, on_manifest_update, llm_executor)?;
        let _ = overlay_cell.set(overlay_manager.clone());

        Ok(Self {
            config,
            store,
            session_manager,
            overlay_manager,
        })
    }

    /// Starts tracking every persisted session whose workspace still
    /// exists, and reconciles every persisted workspace's overlay
    /// manifest. Run once at startup, after a restart, to recover both the
    /// session-tracker attachment state and any overlay edits made while
    /// the daemon was down.
    ///
    /// Every persisted workspace is (re-)registered with the overlay
    /// manager before reconciling it: the manager's workspace registry is
    /// in-memory only, so after a restart it starts out empty and
    /// `OverlayManager::reconcile` would otherwise be a silent no-op for
    /// every workspace. Global/per-repo overlay path lists are an external
    /// config-loading concern (`spec.md` §1); only the builtin paths are
    /// known here.
    pub async fn recover(&self, cancel: &tokio_util::sync::CancellationToken) {
        for session in self.store.get_sessions() {
            if self.store.get_workspace(&session.workspace_id).is_none() {
                tracing::warn!(session_id = %session.id, "daemon recovery: workspace missing, skipping session");
                continue;
            }
            if let Err(e) = self.start_session(&session) {
                tracing::warn!(session_id = %session.id, error = %e, "daemon recovery: failed to start session");
            }
        }

        for workspace in self.store.get_workspaces() {
            if cancel.is_cancelled() {
                return;
            }
            self.register_workspace(&workspace);
            self.overlay_manager.reconcile(&workspace.id, cancel).await;
        }
    }

    /// Registers `workspace` with the overlay manager so its declared files
    /// are watched and its manifest is reconcilable.
    fn register_workspace(&self, workspace: &Workspace) {
        let repo_name = repo_name_from_url(&workspace.repo);
        self.overlay_manager.add_workspace(
            workspace.id.clone(),
            std::path::PathBuf::from(&workspace.path),
            workspace.repo.clone(),
            repo_name,
            workspace.overlay_manifest.clone(),
            declared_paths(&[], &[]),
        );
    }

    pub fn start_session(&self, session: &Session) -> Result<(), Error> {
        self.session_manager.start_session(session)
    }

    pub fn stop_session(&self, id: &SessionId) {
        self.session_manager.stop_session(id);
    }
}

fn make_manifest_update_sink(store: StateStore) -> ManifestUpdateFn {
    Arc::new(move |workspace_id, rel_path, hash| {
        let Some(mut workspace) = store.get_workspace(&workspace_id) else {
            return;
        };
        workspace.overlay_manifest.set(rel_path, hash);
        if let Err(e) = store.update_workspace(workspace) {
            tracing::error!(workspace_id = %workspace_id, error = %e, "bootstrap: failed persisting overlay manifest update");
        }
        let store = store.clone();
        tokio::spawn(async move { store.save_batched().await });
    })
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
