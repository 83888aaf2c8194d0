// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable attachment to the underlying terminal multiplexer.
//! `attach_output` is a streaming method distinct from the poll-based
//! `capture_output` (`tmux capture-pane`), since the session tracker (C6)
//! needs a continuous byte feed rather than a snapshot.

mod tmux;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use tmux::TmuxAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Adapter for managing terminal sessions (tmux, etc.)
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError>;

    async fn send(&self, id: &str, input: &str) -> Result<(), SessionError>;

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError>;

    async fn send_enter(&self, id: &str) -> Result<(), SessionError>;

    async fn kill(&self, id: &str) -> Result<(), SessionError>;

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError>;

    async fn is_process_running(&self, id: &str, pattern: &str) -> Result<bool, SessionError>;

    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError>;

    /// Applies styling (status bar, title) to an existing session. Default
    /// implementation is a no-op; adapters without a notion of styling
    /// need not override it.
    async fn configure(&self, _id: &str, _config: &serde_json::Value) -> Result<(), SessionError> {
        Ok(())
    }

    /// A live feed of output bytes from attachment time onward. Distinct
    /// from `capture_output`'s snapshot: this is what the session
    /// tracker's read loop feeds to the signal detector and the output
    /// subscriber channel.
    async fn attach_output(&self, id: &str) -> Result<BoxStream<'static, Bytes>, SessionError>;
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
