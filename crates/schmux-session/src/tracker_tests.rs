// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use schmux_core::SignalState;

use super::*;
use crate::adapter::FakeSessionAdapter;

fn new_session_id() -> SessionId {
    SessionId::new("test-session")
}

async fn wait_until(mut f: impl FnMut() -> bool) {
    for _ in 0..200 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn scrollback_replay_feeds_detector_on_startup() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s1", true);
    adapter.set_output("s1", vec!["--<[schmux:needs_input:ready]>--".to_string()]);

    let signals: Arc<Mutex<Vec<Signal>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = signals.clone();
    let tracker = SessionTracker::start(adapter, new_session_id(), "s1", move |signal| {
        recorder.lock().push(signal);
    });

    wait_until(|| !signals.lock().is_empty()).await;
    assert_eq!(signals.lock()[0].state, SignalState::NeedsInput);
    tracker.stop();
}

#[tokio::test]
async fn live_output_feeds_detector_and_subscribers() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s1", true);

    let signals: Arc<Mutex<Vec<Signal>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = signals.clone();
    let tracker = SessionTracker::start(adapter.clone(), new_session_id(), "s1", move |signal| {
        recorder.lock().push(signal);
    });

    let mut rx = tracker.subscribe();
    // Give the read loop a chance to attach before pushing bytes.
    wait_until(|| !adapter.calls().is_empty()).await;
    adapter.push_output_bytes("s1", Bytes::from_static(b"--<[schmux:completed:done]>--\n"));

    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, Bytes::from_static(b"--<[schmux:completed:done]>--\n"));

    wait_until(|| !signals.lock().is_empty()).await;
    assert_eq!(signals.lock()[0].state, SignalState::Completed);
    tracker.stop();
}

#[tokio::test]
async fn set_tmux_session_retargets_without_losing_subscribers() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s1", true);
    adapter.add_session("s2", true);

    let tracker = SessionTracker::start(adapter.clone(), new_session_id(), "s1", |_| {});
    let mut rx = tracker.subscribe();

    tracker.set_tmux_session("s2");
    wait_until(|| adapter.calls().iter().any(|c| matches!(c, crate::adapter::SessionCall::AttachOutput { id } if id == "s2"))).await;

    adapter.push_output_bytes("s2", Bytes::from_static(b"hello from s2"));
    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, Bytes::from_static(b"hello from s2"));
    tracker.stop();
}

#[tokio::test]
async fn stop_is_idempotent_and_ends_loop() {
    let adapter = FakeSessionAdapter::new();
    adapter.add_session("s1", true);

    let tracker = SessionTracker::start(adapter, new_session_id(), "s1", |_| {});
    tracker.stop();
    tracker.stop();
}
