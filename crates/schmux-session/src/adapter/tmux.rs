// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tmux-backed [`super::SessionAdapter`]. `attach_output` tails a
//! `tmux pipe-pane` log file with a notify-plus-incremental-offset idiom.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{SessionAdapter, SessionError};

/// tmux-based session adapter.
#[derive(Clone)]
pub struct TmuxAdapter {
    pipe_dir: PathBuf,
}

impl Default for TmuxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxAdapter {
    pub fn new() -> Self {
        Self {
            pipe_dir: std::env::temp_dir().join("schmux-pipes"),
        }
    }
}

#[async_trait]
impl SessionAdapter for TmuxAdapter {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        if !cwd.exists() {
            return Err(SessionError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let session_id = format!("schmux-{name}");

        let existing = Command::new("tmux")
            .args(["has-session", "-t", &session_id])
            .output()
            .await;
        if existing.map(|o| o.status.success()).unwrap_or(false) {
            tracing::warn!(session_id, "session already exists, killing first");
            let _ = Command::new("tmux")
                .args(["kill-session", "-t", &session_id])
                .output()
                .await;
        }

        let mut tmux_cmd = Command::new("tmux");
        tmux_cmd.arg("new-session").arg("-d").arg("-s").arg(&session_id).arg("-c").arg(cwd);
        for (key, value) in env {
            tmux_cmd.arg("-e").arg(format!("{key}={value}"));
        }
        tmux_cmd.arg(cmd);

        let output = tmux_cmd.output().await.map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(session_id, stderr = %stderr, "tmux spawn failed");
            return Err(SessionError::SpawnFailed(stderr.to_string()));
        }

        Ok(session_id)
    }

    async fn send(&self, id: &str, input: &str) -> Result<(), SessionError> {
        let output = Command::new("tmux")
            .args(["send-keys", "-t", id, input])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let output = Command::new("tmux")
            .args(["send-keys", "-t", id, "-l", "--", text])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        let output = Command::new("tmux")
            .args(["send-keys", "-t", id, "Enter"])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let _ = Command::new("tmux").args(["kill-session", "-t", id]).output().await;
        let _ = std::fs::remove_file(self.pipe_dir.join(format!("{id}.out")));
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let output = Command::new("tmux")
            .args(["has-session", "-t", id])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        Ok(output.status.success())
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", id, "-p", "-S", &format!("-{lines}")])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn is_process_running(&self, id: &str, pattern: &str) -> Result<bool, SessionError> {
        let output = Command::new("tmux")
            .args(["list-panes", "-t", id, "-F", "#{pane_pid}"])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        let pane_pid = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if pane_pid.is_empty() {
            return Ok(false);
        }

        let (ps_output, pgrep_output) = tokio::try_join!(
            async {
                Command::new("ps")
                    .args(["-p", &pane_pid, "-o", "command="])
                    .output()
                    .await
                    .map_err(|e| SessionError::CommandFailed(e.to_string()))
            },
            async {
                Command::new("pgrep")
                    .args(["-P", &pane_pid, "-f", pattern])
                    .output()
                    .await
                    .map_err(|e| SessionError::CommandFailed(e.to_string()))
            },
        )?;

        if ps_output.status.success() {
            let cmd_line = String::from_utf8_lossy(&ps_output.stdout);
            if cmd_line.contains(pattern) {
                return Ok(true);
            }
        }
        Ok(pgrep_output.status.success())
    }

    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        let output = Command::new("tmux")
            .args(["display-message", "-t", id, "-p", "#{pane_dead_status}"])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        let status_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if status_str.is_empty() {
            return Ok(None);
        }
        Ok(status_str.parse::<i32>().ok())
    }

    async fn configure(&self, id: &str, config: &serde_json::Value) -> Result<(), SessionError> {
        if let Some(title) = config.get("title").and_then(|v| v.as_str()) {
            run_tmux_set_option(id, "set-titles", "on").await?;
            run_tmux_set_option(id, "set-titles-string", title).await?;
        }
        if let Some(left) = config.get("status_left").and_then(|v| v.as_str()) {
            run_tmux_set_option(id, "status-left", &format!(" {left} ")).await?;
        }
        if let Some(right) = config.get("status_right").and_then(|v| v.as_str()) {
            run_tmux_set_option(id, "status-right", &format!(" {right} ")).await?;
        }
        Ok(())
    }

    async fn attach_output(&self, id: &str) -> Result<BoxStream<'static, Bytes>, SessionError> {
        std::fs::create_dir_all(&self.pipe_dir).map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        let pipe_path = self.pipe_dir.join(format!("{id}.out"));
        if !pipe_path.exists() {
            std::fs::File::create(&pipe_path).map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        }

        let output = Command::new("tmux")
            .args(["pipe-pane", "-t", id, "-o", &format!("cat >> {}", pipe_path.display())])
            .output()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(SessionError::NotFound(id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
        tokio::spawn(tail_pipe(pipe_path, tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

async fn run_tmux_set_option(session_id: &str, option: &str, value: &str) -> Result<(), SessionError> {
    let output = Command::new("tmux")
        .args(["set-option", "-t", session_id, option, value])
        .output()
        .await
        .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(session_id, option, value, stderr = %stderr, "tmux set-option failed");
    }
    Ok(())
}

/// Tails `path` for appended bytes, forwarding each newly observed chunk on
/// `tx`: the same incremental-offset tailing idiom as a log parser, but
/// forwarding raw bytes instead of parsed lines.
async fn tail_pipe(path: PathBuf, tx: mpsc::UnboundedSender<Bytes>) {
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<notify::Event>();
    let watch_result = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = notify_tx.send(event);
        }
    });
    let mut watcher: RecommendedWatcher = match watch_result {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "tmux adapter: failed to construct pipe watcher");
            return;
        }
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
        tracing::warn!(path = %path.display(), error = %e, "tmux adapter: failed to watch pipe directory");
        return;
    }

    let mut offset: u64 = 0;
    loop {
        let Some(_event) = notify_rx.recv().await else { break };
        offset = read_new_bytes(&path, offset, &tx);
        if tx.is_closed() {
            break;
        }
    }
}

fn read_new_bytes(path: &Path, offset: u64, tx: &mpsc::UnboundedSender<Bytes>) -> u64 {
    let Ok(mut file) = std::fs::File::open(path) else {
        return offset;
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if len <= offset {
        return offset;
    }
    if file.seek(SeekFrom::Start(offset)).is_err() {
        return offset;
    }
    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return offset;
    }
    let new_offset = offset + buf.len() as u64;
    let _ = tx.send(Bytes::from(buf));
    new_offset
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
