// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bracket-marker regex shared by the signal detector (C2) and, for the
//! plain `"STATE [MESSAGE]"` flavour, the file signal watcher (C3).

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use schmux_core::SignalState;

/// Fixed bit-for-bit; do not reformat. Anchors to start-of-line (allowing
/// common bullet prefixes and control bytes) and end-of-line (allowing
/// trailing spaces, tabs, and CRs).
pub const MARKER_PATTERN: &str = r"^[\x00-\x1f⏺•\-\*\s]*--<\[schmux:(\w+):([^\]]*)\]>--[ \t]*\r*$";

#[allow(clippy::expect_used)]
static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(MARKER_PATTERN).expect("marker pattern is a fixed, valid regex")
});

pub const NEAR_MISS_NEEDLE: &str = "--<[schmux:";

/// Matches `line` against the marker pattern and validates the captured
/// state token. Returns `None` for a non-match or an unrecognised state
/// word — the caller is responsible for near-miss diagnostics.
pub fn match_marker(line: &str) -> Option<(SignalState, String)> {
    let caps = MARKER.captures(line)?;
    let state_token = caps.get(1)?.as_str();
    let state = SignalState::from_str(state_token).ok()?;
    let message = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
    Some((state, message))
}

#[cfg(test)]
#[path = "marker_tests.rs"]
mod tests;
