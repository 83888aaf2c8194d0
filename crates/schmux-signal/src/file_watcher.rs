// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The file signal watcher (C3): watches a single file and emits
//! deduplicated signals on content change. Canonical transport for
//! agent-to-daemon status, including cross-restart recovery via
//! [`FileSignalWatcher::read_current`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use schmux_core::{Signal, SignalState};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

const DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("parent directory does not exist: {0}")]
    ParentMissing(PathBuf),
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches `<workspace>/.schmux/signal/<session-id>` for content changes.
pub struct FileSignalWatcher {
    path: PathBuf,
    last_content: Arc<Mutex<Option<String>>>,
    stopped: Arc<AtomicBool>,
    _watcher: Option<RecommendedWatcher>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl FileSignalWatcher {
    /// Starts watching `path`. `path`'s parent directory must already
    /// exist. `on_signal` fires for every valid, content-distinct signal;
    /// `on_invalid` fires (as a diagnostic only) when the file's content
    /// changed but does not parse as a valid `"STATE [MESSAGE]"` record.
    pub fn start(
        path: PathBuf,
        on_signal: impl Fn(Signal) + Send + Sync + 'static,
        on_invalid: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<Self, WatcherError> {
        let parent = path
            .parent()
            .filter(|p| p.exists())
            .ok_or_else(|| WatcherError::ParentMissing(path.clone()))?
            .to_path_buf();
        let basename = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();

        let last_content: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicU64::new(0));
        let on_signal = Arc::new(on_signal);
        let on_invalid = Arc::new(on_invalid);

        let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel::<notify::Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = notify_tx.send(event);
            }
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        let (stop_tx, mut stop_rx) = oneshot::channel();

        let watch_path = path.clone();
        let task_last_content = last_content.clone();
        let task_stopped = stopped.clone();
        let task_generation = generation.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    event = notify_rx.recv() => {
                        let Some(event) = event else { break };
                        if !is_relevant(&event, &basename) {
                            continue;
                        }
                        let gen = task_generation.fetch_add(1, Ordering::SeqCst) + 1;
                        let path = watch_path.clone();
                        let last_content = task_last_content.clone();
                        let stopped = task_stopped.clone();
                        let generation = task_generation.clone();
                        let on_signal = on_signal.clone();
                        let on_invalid = on_invalid.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(DEBOUNCE).await;
                            if generation.load(Ordering::SeqCst) != gen || stopped.load(Ordering::SeqCst) {
                                return;
                            }
                            check_and_emit(&path, &last_content, on_signal.as_ref(), on_invalid.as_ref());
                        });
                    }
                }
            }
        });

        Ok(Self {
            path,
            last_content,
            stopped,
            _watcher: Some(watcher),
            stop_tx: Some(stop_tx),
        })
    }

    /// Synchronous read for cross-restart recovery: populates the
    /// dedup cache and returns the parsed signal without firing any
    /// callback.
    pub fn read_current(&self) -> Option<Signal> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let trimmed = raw.trim().to_string();
        *self.last_content.lock() = Some(trimmed.clone());
        let (state, message) = parse_file_signal(&trimmed)?;
        Some(Signal::new(state, message, std::time::Instant::now()))
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for FileSignalWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_relevant(event: &notify::Event, basename: &std::ffi::OsStr) -> bool {
    use notify::EventKind;
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(basename))
}

fn check_and_emit(
    path: &Path,
    last_content: &Mutex<Option<String>>,
    on_signal: &(dyn Fn(Signal) + Send + Sync),
    on_invalid: &(dyn Fn(&str) + Send + Sync),
) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "file signal watcher: read failed");
            return;
        }
    };
    let trimmed = raw.trim().to_string();

    let mut cache = last_content.lock();
    if cache.as_deref() == Some(trimmed.as_str()) {
        return;
    }
    *cache = Some(trimmed.clone());
    drop(cache);

    match parse_file_signal(&trimmed) {
        Some((state, message)) => on_signal(Signal::new(state, message, std::time::Instant::now())),
        None => {
            warn!(path = %path.display(), "file signal watcher: invalid signal content");
            on_invalid(&trimmed);
        }
    }
}

/// `"STATE [MESSAGE]"`: the state token is required and must be one of the
/// five valid states; the message is the remainder (may be empty); only
/// the first non-empty line is considered.
fn parse_file_signal(content: &str) -> Option<(SignalState, String)> {
    let first_line = content.lines().find(|l| !l.trim().is_empty())?;
    let trimmed = first_line.trim_end();
    let (state_token, message) = match trimmed.split_once(' ') {
        Some((state, message)) => (state, message.trim_start()),
        None => (trimmed, ""),
    };
    let state = SignalState::from_str(state_token).ok()?;
    Some((state, message.to_string()))
}

#[cfg(test)]
#[path = "file_watcher_tests.rs"]
mod tests;
