// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test double for [`super::SessionAdapter`], so the session tracker's
//! (C6) read loop is testable without a real tmux binary.
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{SessionAdapter, SessionError};

const OUTPUT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum SessionCall {
    Spawn { name: String, cwd: PathBuf, cmd: String, env: Vec<(String, String)> },
    Send { id: String, input: String },
    SendLiteral { id: String, text: String },
    SendEnter { id: String },
    Kill { id: String },
    IsAlive { id: String },
    CaptureOutput { id: String, lines: u32 },
    IsProcessRunning { id: String, pattern: String },
    Configure { id: String, config: serde_json::Value },
    AttachOutput { id: String },
}

pub struct FakeSession {
    pub name: String,
    pub cwd: PathBuf,
    pub cmd: String,
    pub env: Vec<(String, String)>,
    pub output: Vec<String>,
    pub alive: bool,
    pub exit_code: Option<i32>,
    pub process_running: bool,
    output_tx: broadcast::Sender<Bytes>,
}

struct FakeSessionState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<SessionCall>,
    next_id: u64,
}

/// Fake session adapter for testing. Cheap to clone; every clone shares
/// the same session table.
#[derive(Clone)]
pub struct FakeSessionAdapter {
    inner: Arc<Mutex<FakeSessionState>>,
}

impl Default for FakeSessionAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeSessionState {
                sessions: HashMap::new(),
                calls: Vec::new(),
                next_id: 0,
            })),
        }
    }
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    pub fn set_output(&self, id: &str, output: Vec<String>) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.output = output;
        }
    }

    pub fn set_exited(&self, id: &str, exit_code: i32) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.alive = false;
            session.exit_code = Some(exit_code);
        }
    }

    pub fn set_process_running(&self, id: &str, running: bool) {
        if let Some(session) = self.inner.lock().sessions.get_mut(id) {
            session.process_running = running;
        }
    }

    pub fn add_session(&self, id: &str, alive: bool) {
        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        self.inner.lock().sessions.insert(
            id.to_string(),
            FakeSession {
                name: id.to_string(),
                cwd: PathBuf::new(),
                cmd: String::new(),
                env: Vec::new(),
                output: Vec::new(),
                alive,
                exit_code: None,
                process_running: alive,
                output_tx,
            },
        );
    }

    /// Pushes a chunk of bytes to every current `attach_output` subscriber
    /// of `id`. A no-op if the session does not exist or has no
    /// subscribers yet.
    pub fn push_output_bytes(&self, id: &str, bytes: impl Into<Bytes>) {
        if let Some(session) = self.inner.lock().sessions.get(id) {
            let _ = session.output_tx.send(bytes.into());
        }
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("fake-{}", inner.next_id);

        inner.calls.push(SessionCall::Spawn {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            cmd: cmd.to_string(),
            env: env.to_vec(),
        });

        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        inner.sessions.insert(
            id.clone(),
            FakeSession {
                name: name.to_string(),
                cwd: cwd.to_path_buf(),
                cmd: cmd.to_string(),
                env: env.to_vec(),
                output: Vec::new(),
                alive: true,
                exit_code: None,
                process_running: true,
                output_tx,
            },
        );

        Ok(id)
    }

    async fn send(&self, id: &str, input: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Send { id: id.to_string(), input: input.to_string() });
        if !inner.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::SendLiteral { id: id.to_string(), text: text.to_string() });
        if !inner.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::SendEnter { id: id.to_string() });
        if !inner.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Kill { id: id.to_string() });
        if let Some(session) = inner.sessions.get_mut(id) {
            session.alive = false;
        }
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::IsAlive { id: id.to_string() });
        Ok(inner.sessions.get(id).map(|s| s.alive).unwrap_or(false))
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::CaptureOutput { id: id.to_string(), lines });
        match inner.sessions.get(id) {
            Some(session) => {
                let start = session.output.len().saturating_sub(lines as usize);
                Ok(session.output[start..].join("\n"))
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn is_process_running(&self, id: &str, pattern: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::IsProcessRunning { id: id.to_string(), pattern: pattern.to_string() });
        Ok(inner.sessions.get(id).map(|s| s.process_running).unwrap_or(false))
    }

    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        let inner = self.inner.lock();
        Ok(inner.sessions.get(id).and_then(|s| s.exit_code))
    }

    async fn configure(&self, id: &str, config: &serde_json::Value) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Configure { id: id.to_string(), config: config.clone() });
        if !inner.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn attach_output(&self, id: &str) -> Result<BoxStream<'static, Bytes>, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::AttachOutput { id: id.to_string() });
        let Some(session) = inner.sessions.get(id) else {
            return Err(SessionError::NotFound(id.to_string()));
        };
        let rx = session.output_tx.subscribe();
        Ok(BroadcastStream::new(rx).filter_map(|item| async move { item.ok() }).boxed())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
