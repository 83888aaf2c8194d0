// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session tracker (C6): attaches to a single local session's live
//! output, feeding the signal detector and a bounded broadcast channel in
//! that order, and replays scrollback once on startup.
//!
//! State machine: `Detached -> Attaching -> Attached -> Detached`. The
//! states above are implicit in the read loop's control flow rather than an
//! explicit enum, since nothing outside the loop ever needs to observe
//! `Attaching` as distinct from `Detached`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use schmux_core::{Signal, SessionId};
use schmux_signal::SignalDetector;
use tokio::sync::{broadcast, oneshot, watch};

use crate::adapter::SessionAdapter;

const OUTPUT_CHANNEL_CAPACITY: usize = 1024;
const SCROLLBACK_LINES: u32 = 200;
const SCROLLBACK_TIMEOUT: Duration = Duration::from_secs(2);
const FLUSH_CHECK_INTERVAL: Duration = Duration::from_millis(150);
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Tracks one local session's live tmux (or other multiplexer) output.
pub struct SessionTracker<A: SessionAdapter> {
    session_id: SessionId,
    tmux_session: watch::Sender<String>,
    output_tx: broadcast::Sender<Bytes>,
    stop_tx: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
    stopped: AtomicBool,
    _adapter: std::marker::PhantomData<A>,
}

impl<A: SessionAdapter> SessionTracker<A> {
    /// Spawns the read loop and returns the tracker handle. `on_signal` is
    /// the detector's callback, invoked synchronously from the read loop
    /// task for every marker found in the stream.
    pub fn start(
        adapter: A,
        session_id: SessionId,
        tmux_session: impl Into<String>,
        on_signal: impl FnMut(Signal) + Send + 'static,
    ) -> Arc<Self> {
        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        let (tmux_session_tx, tmux_session_rx) = watch::channel(tmux_session.into());

        let tracker = Arc::new(Self {
            session_id,
            tmux_session: tmux_session_tx,
            output_tx: output_tx.clone(),
            stop_tx: parking_lot::Mutex::new(Some(stop_tx)),
            stopped: AtomicBool::new(false),
            _adapter: std::marker::PhantomData,
        });

        let detector = SignalDetector::new(on_signal);
        tokio::spawn(run_loop(adapter, tmux_session_rx, detector, output_tx, stop_rx));

        tracker
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// A fresh subscriber receives only bytes sent after this call; it does
    /// not see the startup scrollback replay.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.output_tx.subscribe()
    }

    /// Re-points the tracker at a different underlying multiplexer session
    /// name (e.g. after a remote reconnect assigns a new tmux session)
    /// without tearing down the detector's buffered state or the
    /// broadcast channel's subscribers.
    pub fn set_tmux_session(&self, name: impl Into<String>) {
        let _ = self.tmux_session.send(name.into());
    }

    pub fn stop(&self) {
        if self.stopped.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            if let Some(tx) = self.stop_tx.lock().take() {
                let _ = tx.send(());
            }
        }
    }
}

impl<A: SessionAdapter> Drop for SessionTracker<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop<A: SessionAdapter>(
    adapter: A,
    mut tmux_session: watch::Receiver<String>,
    mut detector: SignalDetector,
    output_tx: broadcast::Sender<Bytes>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let name = tmux_session.borrow().clone();
    if let Ok(Ok(scrollback)) =
        tokio::time::timeout(SCROLLBACK_TIMEOUT, adapter.capture_output(&name, SCROLLBACK_LINES)).await
    {
        detector.feed(scrollback.as_bytes());
        detector.flush();
    }

    loop {
        let name = tmux_session.borrow().clone();
        let stream = match adapter.attach_output(&name).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(session = %name, error = %err, "session tracker: attach failed, retrying");
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => return,
                    _ = tmux_session.changed() => continue,
                    _ = tokio::time::sleep(RESTART_DELAY) => continue,
                }
            }
        };
        tokio::pin!(stream);

        let mut tick = tokio::time::interval(FLUSH_CHECK_INTERVAL);
        tick.tick().await;
        let mut retargeted = false;

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    detector.flush();
                    return;
                }
                changed = tmux_session.changed() => {
                    if changed.is_err() {
                        detector.flush();
                        return;
                    }
                    tracing::debug!(session = %name, "session tracker: retargeted, reattaching");
                    retargeted = true;
                    break;
                }
                chunk = stream.next() => {
                    match chunk {
                        Some(bytes) => {
                            detector.feed(&bytes);
                            let _ = output_tx.send(bytes);
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    if detector.should_flush() {
                        detector.flush();
                    }
                }
            }
        }

        if retargeted {
            continue;
        }

        tracing::debug!(session = %name, "session tracker: output stream ended, reattaching");
        tokio::select! {
            biased;
            _ = &mut stop_rx => return,
            _ = tokio::time::sleep(RESTART_DELAY) => {}
        }
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
