// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The document persisted verbatim to `state.json`.

use std::collections::HashMap;

use schmux_core::{Preview, PreviewId, RemoteHost, RemoteHostId, Session, SessionId, Workspace, WorkspaceId};
use serde::{Deserialize, Serialize};

/// The whole of the daemon's durable state. Unknown fields on load are
/// ignored by `serde_json`'s default behaviour; missing fields default via
/// `#[serde(default)]`, matching the backward-compatibility rule in the
/// external interfaces contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub workspaces: HashMap<WorkspaceId, Workspace>,
    #[serde(default)]
    pub sessions: HashMap<SessionId, Session>,
    #[serde(default)]
    pub remote_hosts: HashMap<RemoteHostId, RemoteHost>,
    #[serde(default)]
    pub previews: HashMap<PreviewId, Preview>,
}
