// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted data model: workspaces, sessions, overlay manifests, remote
//! hosts.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{PreviewId, RemoteHostId, SessionId, WorkspaceId};
use crate::path::RelPath;

/// A checkout of one source repository at one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub repo: String,
    pub branch: String,
    pub path: String,
    pub remote_host_id: Option<RemoteHostId>,
    pub remote_path: Option<String>,
    pub status: WorkspaceStatus,
    /// `relPath -> content hash` recording the overlay-managed contents
    /// last synced into this workspace; the three-way merge base.
    #[serde(default)]
    pub overlay_manifest: OverlayManifest,
}

impl Workspace {
    pub fn is_remote(&self) -> bool {
        self.remote_host_id.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum WorkspaceStatus {
    #[default]
    Creating,
    Ready,
    InUse {
        by: SessionId,
    },
    Cleaning,
    Failed {
        reason: String,
    },
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspaceStatus::Creating => write!(f, "creating"),
            WorkspaceStatus::Ready => write!(f, "ready"),
            WorkspaceStatus::InUse { by } => write!(f, "in-use (by {by})"),
            WorkspaceStatus::Cleaning => write!(f, "cleaning"),
            WorkspaceStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One running agent attached to one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub workspace_id: WorkspaceId,
    pub target: String,
    pub tmux_session: String,
    pub created_at: DateTime<Utc>,
    pub nickname: Option<String>,
    /// Opaque JSON string representing the current attention state, or
    /// empty when the agent is working.
    #[serde(default)]
    pub nudge: String,
    /// Monotonic, never decreases for this session's lifetime.
    #[serde(default)]
    pub nudge_seq: u64,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub remote_host_id: Option<RemoteHostId>,

    /// Derived; never persisted.
    #[serde(skip)]
    pub last_output_at: Option<Instant>,
}

impl Session {
    pub fn new(
        id: SessionId,
        workspace_id: WorkspaceId,
        target: impl Into<String>,
        tmux_session: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            target: target.into(),
            tmux_session: tmux_session.into(),
            created_at,
            nickname: None,
            nudge: String::new(),
            nudge_seq: 0,
            last_signal_at: None,
            remote_host_id: None,
            last_output_at: None,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote_host_id.is_some()
    }
}

/// Where a declared overlay path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayEntrySource {
    Builtin,
    Global,
    Repo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayEntryStatus {
    Synced,
    Pending,
}

/// A declared overlay-managed path and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayEntry {
    pub repo_name: String,
    pub rel_path: RelPath,
    pub source: OverlayEntrySource,
    pub status: OverlayEntryStatus,
}

/// Workspace-scoped `relPath -> sha256-hex`; the three-way merge base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayManifest(pub HashMap<RelPath, String>);

impl OverlayManifest {
    pub fn get(&self, rel_path: &RelPath) -> Option<&str> {
        self.0.get(rel_path).map(String::as_str)
    }

    pub fn set(&mut self, rel_path: RelPath, hash: String) {
        self.0.insert(rel_path, hash);
    }

    pub fn remove(&mut self, rel_path: &RelPath) -> Option<String> {
        self.0.remove(rel_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelPath, &str)> {
        self.0.iter().map(|(k, v)| (k, v.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteHostStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteHost {
    pub id: RemoteHostId,
    pub flavor_id: String,
    pub hostname: String,
    pub status: RemoteHostStatus,
    pub connected_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A forwarded preview tunnel owned by one workspace. The tunnelling and
/// SSH orchestration behind it are an external collaborator; the store only
/// tracks bookkeeping needed to tear previews down with their workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    pub id: PreviewId,
    pub workspace_id: WorkspaceId,
    pub port: u16,
    pub url: String,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
