// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use schmux_core::{RelPath, Workspace, WorkspaceId, WorkspaceStatus};
use schmux_overlay::{NoopLlmExecutor, OverlayManager};
use std::sync::Arc;

fn workspace(id: &str, repo: &str, path: &std::path::Path) -> Workspace {
    Workspace {
        id: WorkspaceId::new(id),
        repo: repo.to_string(),
        branch: "main".to_string(),
        path: path.to_string_lossy().into_owned(),
        remote_host_id: None,
        remote_path: None,
        status: WorkspaceStatus::Ready,
        overlay_manifest: Default::default(),
    }
}

async fn wait_for<F: Fn() -> bool>(f: F) {
    for _ in 0..50 {
        if f() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn propagate_writes_merged_bytes_into_every_sibling_and_skips_the_source() {
    let source_dir = tempfile::tempdir().expect("tempdir");
    let sibling_dir = tempfile::tempdir().expect("tempdir");
    let overlay_dir = tempfile::tempdir().expect("tempdir");
    let state_dir = tempfile::tempdir().expect("tempdir");

    let store = StateStore::load(state_dir.path().join("state.json")).expect("load store");
    store.add_workspace(workspace("ws-source", "repo-a", source_dir.path()));
    store.add_workspace(workspace("ws-sibling", "repo-a", sibling_dir.path()));
    store.add_workspace(workspace("ws-other-repo", "repo-b", sibling_dir.path()));

    let overlay = OverlayManager::new(
        overlay_dir.path().to_path_buf(),
        Arc::new(|_, _, _, _| {}),
        Arc::new(|_, _, _| {}),
        Some(Arc::new(NoopLlmExecutor)),
    )
    .expect("construct overlay manager");

    let rel_path = RelPath::parse("settings.json").expect("rel path");
    propagate_to_siblings(
        store.clone(),
        overlay,
        WorkspaceId::new("ws-source"),
        "repo-a".to_string(),
        rel_path.clone(),
        b"merged".to_vec(),
    )
    .await;

    wait_for(|| sibling_dir.path().join("settings.json").exists()).await;

    assert_eq!(
        std::fs::read(sibling_dir.path().join("settings.json")).expect("read"),
        b"merged"
    );
    assert!(!source_dir.path().join("settings.json").exists());

    let sibling = store.get_workspace(&WorkspaceId::new("ws-sibling")).expect("sibling");
    assert_eq!(sibling.overlay_manifest.get(&rel_path), Some(hash_bytes(b"merged").as_str()));
}

#[tokio::test]
async fn make_propagate_is_a_noop_until_the_overlay_cell_is_filled() {
    let state_dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::load(state_dir.path().join("state.json")).expect("load store");

    let cell: Arc<std::sync::OnceLock<OverlayManager>> = Arc::new(std::sync::OnceLock::new());
    let propagate = make_propagate(store, cell);
    // No overlay manager was ever installed into the cell; this must not
    // panic, and simply does nothing.
    propagate(
        WorkspaceId::new("ws-source"),
        "repo-a".to_string(),
        RelPath::parse("settings.json").expect("rel path"),
        b"merged".to_vec(),
    );
}
