// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Arc, Mutex};

use schmux_core::SignalState;

use super::*;

fn signal_sink() -> (
    impl Fn(Signal) + Send + Sync + 'static,
    Arc<Mutex<Vec<Signal>>>,
) {
    let signals = Arc::new(Mutex::new(Vec::new()));
    let sink = signals.clone();
    (move |s: Signal| sink.lock().expect("lock").push(s), signals)
}

fn invalid_sink() -> (
    impl Fn(&str) + Send + Sync + 'static,
    Arc<Mutex<Vec<String>>>,
) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    (
        move |s: &str| sink.lock().expect("lock").push(s.to_string()),
        lines,
    )
}

#[tokio::test]
async fn fires_on_valid_content_change() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signal_path = dir.path().join("sess-1");
    let (on_signal, signals) = signal_sink();
    let (on_invalid, _invalid) = invalid_sink();

    let _watcher =
        FileSignalWatcher::start(signal_path.clone(), on_signal, on_invalid).expect("start");

    std::fs::write(&signal_path, "completed Implementation done\n").expect("write");
    tokio::time::sleep(Duration::from_millis(250)).await;

    let got = signals.lock().expect("lock");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].state, SignalState::Completed);
    assert_eq!(got[0].message, "Implementation done");
}

#[tokio::test]
async fn deduplicates_identical_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signal_path = dir.path().join("sess-1");
    let (on_signal, signals) = signal_sink();
    let (on_invalid, _invalid) = invalid_sink();

    let _watcher =
        FileSignalWatcher::start(signal_path.clone(), on_signal, on_invalid).expect("start");

    std::fs::write(&signal_path, "working\n").expect("write");
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&signal_path, "working\n").expect("write");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(signals.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn invalid_content_is_diagnosed_and_cache_advances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signal_path = dir.path().join("sess-1");
    let (on_signal, signals) = signal_sink();
    let (on_invalid, invalid_lines) = invalid_sink();

    let _watcher =
        FileSignalWatcher::start(signal_path.clone(), on_signal, on_invalid).expect("start");

    std::fs::write(&signal_path, "not-a-real-state\n").expect("write");
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&signal_path, "not-a-real-state\n").expect("write same invalid content again");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(signals.lock().expect("lock").is_empty());
    // Logged once, not once per identical rewrite.
    assert_eq!(invalid_lines.lock().expect("lock").len(), 1);
}

#[test]
fn read_current_populates_cache_without_firing_callback() {
    let dir = tempfile::tempdir().expect("tempdir");
    let signal_path = dir.path().join("sess-1");
    std::fs::write(&signal_path, "needs_input Approve changes?\n").expect("write");

    let (on_signal, signals) = signal_sink();
    let (on_invalid, _invalid) = invalid_sink();
    let watcher = FileSignalWatcher::start(signal_path, on_signal, on_invalid).expect("start");

    let recovered = watcher.read_current().expect("parses");
    assert_eq!(recovered.state, SignalState::NeedsInput);
    assert_eq!(recovered.message, "Approve changes?");
    assert!(signals.lock().expect("lock").is_empty());
}

#[test]
fn start_errors_when_parent_directory_is_missing() {
    let (on_signal, _) = signal_sink();
    let (on_invalid, _) = invalid_sink();
    let err = FileSignalWatcher::start(
        PathBuf::from("/nonexistent-parent-dir/sess-1"),
        on_signal,
        on_invalid,
    )
    .unwrap_err();
    assert!(matches!(err, WatcherError::ParentMissing(_)));
}
