// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::manager::LlmExecutor;
use async_trait::async_trait;
use std::time::Duration;

fn write(dir: &std::path::Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

// --- DetermineMergeAction: the five-branch table (Testable Property 3) ---

#[test]
fn skip_when_workspace_matches_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", b"same");
    let overlay = write(dir.path(), "overlay.json", b"different");
    let manifest_hash = hash_bytes(b"same");

    let action = determine_merge_action(&ws, &overlay, &manifest_hash).expect("decide");
    assert_eq!(action, MergeAction::Skip);
}

#[test]
fn fast_path_when_overlay_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", b"content");
    let overlay = dir.path().join("does-not-exist.json");

    let action = determine_merge_action(&ws, &overlay, "stale-hash").expect("decide");
    assert_eq!(action, MergeAction::FastPath);
}

#[test]
fn skip_when_workspace_matches_overlay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", b"identical");
    let overlay = write(dir.path(), "overlay.json", b"identical");

    let action = determine_merge_action(&ws, &overlay, "stale-manifest-hash").expect("decide");
    assert_eq!(action, MergeAction::Skip);
}

#[test]
fn fast_path_when_overlay_matches_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", b"new-workspace-content");
    let overlay = write(dir.path(), "overlay.json", b"old-content");
    let manifest_hash = hash_bytes(b"old-content");

    let action = determine_merge_action(&ws, &overlay, &manifest_hash).expect("decide");
    assert_eq!(action, MergeAction::FastPath);
}

#[test]
fn llm_merge_on_three_way_divergence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", b"workspace-version");
    let overlay = write(dir.path(), "overlay.json", b"overlay-version");
    let manifest_hash = hash_bytes(b"yet-another-version");

    let action = determine_merge_action(&ws, &overlay, &manifest_hash).expect("decide");
    assert_eq!(action, MergeAction::LlmMerge);
}

// --- ExecuteMerge ---

#[tokio::test]
async fn execute_merge_skip_returns_nothing() {
    let result = execute_merge(
        MergeAction::Skip,
        std::path::Path::new("/nonexistent/ws"),
        std::path::Path::new("/nonexistent/overlay"),
        None,
    )
    .await
    .expect("skip never touches disk");
    assert_eq!(result, None);
}

#[tokio::test]
async fn execute_merge_fast_path_copies_workspace_bytes_to_overlay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", b"fresh content");
    let overlay = dir.path().join("nested").join("overlay.json");

    let bytes = execute_merge(MergeAction::FastPath, &ws, &overlay, None)
        .await
        .expect("fast path")
        .expect("fast path returns bytes");

    assert_eq!(bytes, b"fresh content");
    assert_eq!(std::fs::read(&overlay).expect("read overlay"), b"fresh content");
}

#[tokio::test]
async fn execute_merge_jsonl_unions_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.jsonl", b"{\"a\":1}\n{\"b\":2}\n");
    let overlay = write(dir.path(), "overlay.jsonl", b"{\"a\":1}\n{\"c\":3}\n");

    let bytes = execute_merge(MergeAction::LlmMerge, &ws, &overlay, None)
        .await
        .expect("jsonl merge")
        .expect("jsonl merge returns bytes");

    let text = String::from_utf8(bytes).expect("utf8");
    assert_eq!(text, "{\"a\":1}\n{\"c\":3}\n{\"b\":2}\n");
}

#[tokio::test]
async fn execute_merge_binary_falls_back_to_last_write_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.bin", &[1, 2, 0, 3]);
    let overlay = write(dir.path(), "overlay.bin", &[9, 9, 0, 9]);

    let bytes = execute_merge(MergeAction::LlmMerge, &ws, &overlay, None)
        .await
        .expect("binary merge")
        .expect("binary merge returns bytes");

    assert_eq!(bytes, vec![1, 2, 0, 3]);
    assert_eq!(std::fs::read(&overlay).expect("read"), vec![1, 2, 0, 3]);
}

#[tokio::test]
async fn execute_merge_oversized_falls_back_to_last_write_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let big = vec![b'x'; 200 * 1024];
    let ws = write(dir.path(), "ws.txt", &big);
    let overlay = write(dir.path(), "overlay.txt", b"small");

    let bytes = execute_merge(MergeAction::LlmMerge, &ws, &overlay, None)
        .await
        .expect("oversized merge")
        .expect("oversized merge returns bytes");

    assert_eq!(bytes, big);
}

#[tokio::test]
async fn execute_merge_no_executor_falls_back_to_last_write_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.txt", b"workspace wins");
    let overlay = write(dir.path(), "overlay.txt", b"overlay loses");

    let bytes = execute_merge(MergeAction::LlmMerge, &ws, &overlay, None)
        .await
        .expect("no executor merge")
        .expect("falls back to workspace content");

    assert_eq!(bytes, b"workspace wins");
}

struct FixedExecutor(Option<&'static str>);

#[async_trait]
impl LlmExecutor for FixedExecutor {
    async fn execute(&self, _prompt: &str, _timeout: Duration) -> Result<String, schmux_core::Error> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| schmux_core::Error::invalid("no response configured"))
    }
}

#[tokio::test]
async fn execute_merge_uses_llm_response_when_available() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", br#"{"permissions":["write"]}"#);
    let overlay = write(dir.path(), "overlay.json", br#"{"permissions":["read"]}"#);
    let executor = FixedExecutor(Some(r#"{"permissions":["read","write"]}"#));

    let bytes = execute_merge(MergeAction::LlmMerge, &ws, &overlay, Some(&executor))
        .await
        .expect("llm merge")
        .expect("llm merge returns bytes");

    assert_eq!(bytes, br#"{"permissions":["read","write"]}"#);
    assert_eq!(
        std::fs::read(&overlay).expect("read overlay"),
        br#"{"permissions":["read","write"]}"#
    );
}

#[tokio::test]
async fn execute_merge_empty_llm_response_falls_back_to_last_write_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ws = write(dir.path(), "ws.json", b"workspace-side");
    let overlay = write(dir.path(), "overlay.json", b"overlay-side");
    let executor = FixedExecutor(Some(""));

    let bytes = execute_merge(MergeAction::LlmMerge, &ws, &overlay, Some(&executor))
        .await
        .expect("empty response merge")
        .expect("falls back to workspace content");

    assert_eq!(bytes, b"workspace-side");
}

// --- mergeJSONLLines (Testable Property 5) ---

#[test]
fn merge_jsonl_lines_dedups_and_preserves_order() {
    let a = b"line1\nline2\n";
    let b = b"line2\nline3\n\n";
    let merged = merge_jsonl_lines(a, b);
    assert_eq!(merged, b"line1\nline2\nline3\n".to_vec());
}

#[test]
fn merge_jsonl_lines_drops_empty_lines() {
    let a = b"\n\nonly\n";
    let b = b"\n";
    let merged = merge_jsonl_lines(a, b);
    assert_eq!(merged, b"only\n".to_vec());
}
