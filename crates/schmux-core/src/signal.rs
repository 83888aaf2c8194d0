// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Signal` value produced by the signal detector and file watcher.

use std::str::FromStr;
use std::time::Instant;

/// One of the five states an agent may report. The wire token (used both in
/// the terminal marker and the file-backed signal format) is the
/// `snake_case` name below, and is part of the external contract: it must
/// not be renamed independently of the marker regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalState {
    NeedsInput,
    NeedsTesting,
    Completed,
    Error,
    Working,
}

impl SignalState {
    pub const ALL: [SignalState; 5] = [
        SignalState::NeedsInput,
        SignalState::NeedsTesting,
        SignalState::Completed,
        SignalState::Error,
        SignalState::Working,
    ];

    pub fn as_wire_token(self) -> &'static str {
        match self {
            SignalState::NeedsInput => "needs_input",
            SignalState::NeedsTesting => "needs_testing",
            SignalState::Completed => "completed",
            SignalState::Error => "error",
            SignalState::Working => "working",
        }
    }
}

impl std::fmt::Display for SignalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire_token())
    }
}

impl FromStr for SignalState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_input" => Ok(SignalState::NeedsInput),
            "needs_testing" => Ok(SignalState::NeedsTesting),
            "completed" => Ok(SignalState::Completed),
            "error" => Ok(SignalState::Error),
            "working" => Ok(SignalState::Working),
            _ => Err(()),
        }
    }
}

/// An ephemeral status report. Never itself persisted; only its effect on a
/// session's nudge, sequence, and last-signal timestamp survives.
#[derive(Debug, Clone)]
pub struct Signal {
    pub state: SignalState,
    pub message: String,
    pub timestamp: Instant,
}

impl Signal {
    pub fn new(state: SignalState, message: impl Into<String>, timestamp: Instant) -> Self {
        Self {
            state,
            message: message.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
