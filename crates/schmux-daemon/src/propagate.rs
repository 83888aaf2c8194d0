// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The propagate sink: the environment's half of the compounder's
//! `Propagate` callback. Iterates every sibling workspace of the source's
//! `repoURL`, writes the merged bytes into each sibling's working tree,
//! suppresses that sibling's overlay watcher for the pair, and adopts the
//! new hash as both the persisted and in-memory manifest baseline.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use schmux_core::{RelPath, WorkspaceId};
use schmux_overlay::{hash_bytes, OverlayManager, PropagateFn};
use schmux_storage::StateStore;
use tracing::error;

/// Builds the `PropagateFn` injected into the [`OverlayManager`] at
/// bootstrap. `overlay` is an `OnceLock` rather than a plain value because
/// the manager that will eventually fill it does not exist yet at the
/// point this closure is constructed — `OverlayManager::new` itself
/// requires a `PropagateFn` — so bootstrap fills the cell immediately
/// after construction, strictly before any workspace is registered and
/// therefore strictly before any event can reach this closure.
pub fn make_propagate(store: StateStore, overlay: Arc<OnceLock<OverlayManager>>) -> PropagateFn {
    Arc::new(move |source_workspace_id, repo_url, rel_path, merged_bytes| {
        let store = store.clone();
        let overlay = overlay.clone();
        tokio::spawn(async move {
            let Some(overlay) = overlay.get().cloned() else {
                error!("propagate: invoked before the overlay manager was installed");
                return;
            };
            propagate_to_siblings(store, overlay, source_workspace_id, repo_url, rel_path, merged_bytes).await;
        });
    })
}

/// The propagate sink's actual work, factored out so it is directly
/// unit-testable without going through the `OnceLock` indirection
/// `make_propagate` needs for construction-order reasons.
pub async fn propagate_to_siblings(
    store: StateStore,
    overlay: OverlayManager,
    source_workspace_id: WorkspaceId,
    repo_url: String,
    rel_path: RelPath,
    merged_bytes: Vec<u8>,
) {
    let hash = hash_bytes(&merged_bytes);
    let siblings = store
        .get_workspaces()
        .into_iter()
        .filter(|w| w.repo == repo_url && w.id != source_workspace_id);

    for mut sibling in siblings {
        overlay.suppress(&sibling.id, &rel_path);

        if let Err(e) = write_sibling(&sibling.path, &rel_path, &merged_bytes) {
            error!(
                workspace_id = %sibling.id,
                rel_path = %rel_path,
                error = %e,
                "propagate: failed writing merged bytes to sibling workspace"
            );
            continue;
        }

        sibling.overlay_manifest.set(rel_path.clone(), hash.clone());
        if let Err(e) = store.update_workspace(sibling.clone()) {
            error!(workspace_id = %sibling.id, error = %e, "propagate: failed updating sibling manifest");
        }
        overlay.set_manifest_entry(&sibling.id, rel_path.clone(), hash.clone());
    }

    let store = store.clone();
    tokio::spawn(async move { store.save_batched().await });
}

fn write_sibling(workspace_path: &str, rel_path: &schmux_core::RelPath, bytes: &[u8]) -> std::io::Result<()> {
    let dest: PathBuf = Path::new(workspace_path).join(rel_path.as_ref() as &Path);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest, bytes)
}

#[cfg(test)]
#[path = "propagate_tests.rs"]
mod tests;
