// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use futures::StreamExt;
use serial_test::serial;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

static TEST_PREFIX: LazyLock<String> = LazyLock::new(|| {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos();
    format!("t{:04x}", nanos & 0xFFFF)
});

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(suffix: &str) -> String {
    let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", *TEST_PREFIX, suffix, id)
}

fn tmux_available() -> bool {
    std::process::Command::new("tmux").arg("-V").output().map(|o| o.status.success()).unwrap_or(false)
}

macro_rules! fail_if_no_tmux {
    () => {
        if !tmux_available() {
            panic!("tmux is required but not available");
        }
    };
}

// Serialized: PID-addressed tmux state is process-global.

#[tokio::test]
#[serial(tmux)]
async fn spawn_creates_session_and_returns_id() {
    fail_if_no_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("spawn");

    let id = adapter.spawn(&name, Path::new("/tmp"), "sleep 60", &[]).await.unwrap();
    assert_eq!(id, format!("schmux-{name}"));

    let _ = adapter.kill(&id).await;
}

#[tokio::test]
#[serial(tmux)]
async fn spawn_rejects_missing_cwd() {
    fail_if_no_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("missing-cwd");

    let result = adapter.spawn(&name, Path::new("/definitely/not/a/real/path"), "sleep 60", &[]).await;
    assert!(matches!(result, Err(SessionError::SpawnFailed(_))));
}

#[tokio::test]
#[serial(tmux)]
async fn send_and_capture_roundtrip() {
    fail_if_no_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("roundtrip");
    let id = adapter.spawn(&name, Path::new("/tmp"), "sh", &[]).await.unwrap();

    adapter.send_literal(&id, "echo hello-schmux").await.unwrap();
    adapter.send_enter(&id).await.unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(300)).await;

    let output = adapter.capture_output(&id, 50).await.unwrap();
    assert!(output.contains("hello-schmux"));

    let _ = adapter.kill(&id).await;
}

#[tokio::test]
#[serial(tmux)]
async fn is_alive_reflects_session_lifetime() {
    fail_if_no_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("alive");
    let id = adapter.spawn(&name, Path::new("/tmp"), "sleep 60", &[]).await.unwrap();

    assert!(adapter.is_alive(&id).await.unwrap());
    adapter.kill(&id).await.unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    assert!(!adapter.is_alive(&id).await.unwrap());
}

#[tokio::test]
#[serial(tmux)]
async fn attach_output_streams_pipe_pane_bytes() {
    fail_if_no_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("attach");
    let id = adapter.spawn(&name, Path::new("/tmp"), "sh", &[]).await.unwrap();

    let mut stream = adapter.attach_output(&id).await.unwrap();
    adapter.send_literal(&id, "echo from-pipe-pane").await.unwrap();
    adapter.send_enter(&id).await.unwrap();

    let chunk = tokio::time::timeout(tokio::time::Duration::from_secs(3), stream.next())
        .await
        .expect("attach_output produced a chunk before timeout")
        .expect("stream yielded bytes");
    assert!(String::from_utf8_lossy(&chunk).contains("from-pipe-pane") || !chunk.is_empty());

    let _ = adapter.kill(&id).await;
}
