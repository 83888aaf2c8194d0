// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `OverlayManager`: wires the overlay watcher's (C4) change events into
//! the compounder's (C5) merge pipeline and propagation callback.
//!
//! Function-valued callbacks for `Propagate` and the manifest-update sink
//! are injected at construction; the LLM executor is a single-method
//! `async_trait` object, the same pluggable-adapter shape used for the
//! session adapter.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use schmux_core::{Error, OverlayManifest, RelPath, WorkspaceId};
use tracing::error;

use crate::compounder::{determine_merge_action, execute_merge, MergeAction};
use crate::hashing::hash_bytes;
use crate::watcher::OverlayWatcher;

/// An external collaborator with one async operation. An `Err` result
/// degrades deterministically to last-write-wins, same as an empty response.
#[async_trait]
pub trait LlmExecutor: Send + Sync {
    async fn execute(&self, prompt: &str, timeout: Duration) -> Result<String, Error>;
}

/// `fn(sourceWorkspaceID, repoURL, relPath, mergedBytes)`. The environment
/// is responsible for iterating sibling workspaces of the same repo,
/// writing the bytes into each, suppressing their watchers, and updating
/// their manifests.
pub type PropagateFn = Arc<dyn Fn(WorkspaceId, String, RelPath, Vec<u8>) + Send + Sync>;

/// `fn(workspaceID, relPath, newHash)`, invoked after this workspace's own
/// manifest entry is updated, so the daemon can persist the change into
/// the session store's `Workspace.overlay_manifest`.
pub type ManifestUpdateFn = Arc<dyn Fn(WorkspaceId, RelPath, String) + Send + Sync>;

struct WorkspaceEntry {
    root: PathBuf,
    repo_url: String,
    repo_name: String,
    manifest: OverlayManifest,
}

struct Inner {
    overlay_root: PathBuf,
    workspaces: Mutex<HashMap<WorkspaceId, WorkspaceEntry>>,
    propagate: PropagateFn,
    on_manifest_update: ManifestUpdateFn,
    llm_executor: Option<Arc<dyn LlmExecutor>>,
    watcher: OverlayWatcher,
}

/// Orchestrates [`crate::watcher::OverlayWatcher`] callbacks into a
/// three-way merge and propagates the result to sibling workspaces. Cheap
/// to clone; every clone shares the same watcher and workspace registry.
#[derive(Clone)]
pub struct OverlayManager {
    inner: Arc<Inner>,
}

impl OverlayManager {
    pub fn new(
        overlay_root: PathBuf,
        propagate: PropagateFn,
        on_manifest_update: ManifestUpdateFn,
        llm_executor: Option<Arc<dyn LlmExecutor>>,
    ) -> Result<Self, crate::watcher::WatcherError> {
        // The watcher's callback only has to hand the event off; the
        // actual pipeline needs a handle to `inner`, which does not exist
        // yet, so bridge through an unbounded channel drained by the task
        // spawned below.
        let (on_change_tx, mut on_change_rx) =
            tokio::sync::mpsc::unbounded_channel::<(WorkspaceId, RelPath)>();
        let watcher = OverlayWatcher::start(move |workspace_id, rel_path| {
            let _ = on_change_tx.send((workspace_id, rel_path));
        })?;

        let inner = Arc::new(Inner {
            overlay_root,
            workspaces: Mutex::new(HashMap::new()),
            propagate,
            on_manifest_update,
            llm_executor,
            watcher,
        });

        // Drain the bridge channel onto the real pipeline for as long as
        // `inner` is alive; one lightweight task per manager instance.
        let pipeline_inner = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some((workspace_id, rel_path)) = on_change_rx.recv().await {
                let Some(inner) = pipeline_inner.upgrade() else { break };
                tokio::spawn(on_file_change(inner, workspace_id, rel_path));
            }
        });

        Ok(Self { inner })
    }

    /// Registers a workspace for watching. `declared_paths` is the union
    /// the caller has already computed from the builtin/global/repo lists
    /// (§3); this call further unions it with `manifest`'s own keys.
    pub fn add_workspace(
        &self,
        workspace_id: WorkspaceId,
        workspace_root: PathBuf,
        repo_url: String,
        repo_name: String,
        manifest: OverlayManifest,
        declared_paths: Vec<RelPath>,
    ) {
        let manifest_paths: Vec<RelPath> = manifest.iter().map(|(p, _)| p.clone()).collect();
        self.inner.watcher.add_workspace_with_declared_paths(
            workspace_id.clone(),
            workspace_root.clone(),
            manifest_paths,
            declared_paths,
        );
        self.inner.workspaces.lock().insert(
            workspace_id,
            WorkspaceEntry {
                root: workspace_root,
                repo_url,
                repo_name,
                manifest,
            },
        );
    }

    pub fn remove_workspace(&self, workspace_id: &WorkspaceId) {
        self.inner.watcher.remove_workspace(workspace_id);
        self.inner.workspaces.lock().remove(workspace_id);
    }

    /// Adopts `hash` as the new manifest baseline for `(workspace_id,
    /// rel_path)` without running the merge pipeline. Used by the
    /// propagate sink after it has already written merged bytes verbatim
    /// into a sibling workspace: that sibling's working tree now matches
    /// the overlay, so this becomes the new three-way merge base for the
    /// pair without a redundant `onFileChange` pass.
    pub fn set_manifest_entry(&self, workspace_id: &WorkspaceId, rel_path: RelPath, hash: String) {
        if let Some(entry) = self.inner.workspaces.lock().get_mut(workspace_id) {
            entry.manifest.set(rel_path, hash);
        }
    }

    pub fn suppress(&self, workspace_id: &WorkspaceId, rel_path: &RelPath) {
        self.inner.watcher.suppress(workspace_id, rel_path);
    }

    /// Iterates every entry in the workspace's manifest and reruns the
    /// change pipeline for each, honouring `cancel` between iterations. No
    /// partial manifest mutation is left behind, since each iteration is
    /// itself idempotent.
    pub async fn reconcile(&self, workspace_id: &WorkspaceId, cancel: &tokio_util::sync::CancellationToken) {
        let rel_paths: Vec<RelPath> = {
            let workspaces = self.inner.workspaces.lock();
            match workspaces.get(workspace_id) {
                Some(entry) => entry.manifest.iter().map(|(p, _)| p.clone()).collect(),
                None => return,
            }
        };
        for rel_path in rel_paths {
            if cancel.is_cancelled() {
                return;
            }
            on_file_change(self.inner.clone(), workspace_id.clone(), rel_path).await;
        }
    }

    /// Invokes the change pipeline directly, bypassing the watcher's
    /// debounce. Exposed for tests and for callers that already know a
    /// file changed (e.g. a propagation writer on a sibling workspace).
    pub async fn on_file_change(&self, workspace_id: WorkspaceId, rel_path: RelPath) {
        on_file_change(self.inner.clone(), workspace_id, rel_path).await;
    }
}

/// The seven-step change pipeline from the component design.
async fn on_file_change(inner: Arc<Inner>, workspace_id: WorkspaceId, rel_path: RelPath) {
    let (ws_root, overlay_path, manifest_hash, repo_url) = {
        let workspaces = inner.workspaces.lock();
        let Some(entry) = workspaces.get(&workspace_id) else {
            return;
        };
        let manifest_hash = entry.manifest.get(&rel_path).unwrap_or("").to_string();
        let overlay_path = inner
            .overlay_root
            .join(&entry.repo_name)
            .join(rel_path.as_ref() as &std::path::Path);
        (entry.root.clone(), overlay_path, manifest_hash, entry.repo_url.clone())
    };

    // Suspend this pair's watcher before touching disk so the write below
    // does not retrigger the watcher that is about to observe it.
    inner.watcher.suppress(&workspace_id, &rel_path);

    let ws_path = ws_root.join(rel_path.as_ref() as &std::path::Path);
    if !ws_path.exists() {
        return;
    }

    let action = match determine_merge_action(&ws_path, &overlay_path, &manifest_hash) {
        Ok(action) => action,
        Err(e) => {
            error!(workspace_id = %workspace_id, rel_path = %rel_path, error = %e, "overlay compounder: determine_merge_action failed");
            return;
        }
    };
    if action == MergeAction::Skip {
        return;
    }

    let merged = match execute_merge(action, &ws_path, &overlay_path, inner.llm_executor.as_deref()).await {
        Ok(merged) => merged,
        Err(e) => {
            error!(workspace_id = %workspace_id, rel_path = %rel_path, error = %e, "overlay compounder: execute_merge failed");
            return;
        }
    };
    let Some(merged_bytes) = merged else { return };

    let new_hash = hash_bytes(&merged_bytes);
    {
        let mut workspaces = inner.workspaces.lock();
        if let Some(entry) = workspaces.get_mut(&workspace_id) {
            entry.manifest.set(rel_path.clone(), new_hash.clone());
        }
    }
    (inner.on_manifest_update)(workspace_id.clone(), rel_path.clone(), new_hash);

    (inner.propagate)(workspace_id, repo_url, rel_path, merged_bytes);
}

/// Test-only executor that never produces a merge, forcing deterministic
/// last-write-wins; useful for exercising the degrade path without a real
/// LLM backend wired in.
pub struct NoopLlmExecutor;

#[async_trait]
impl LlmExecutor for NoopLlmExecutor {
    async fn execute(&self, _prompt: &str, _timeout: Duration) -> Result<String, Error> {
        Err(Error::invalid("no LLM executor configured"))
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
