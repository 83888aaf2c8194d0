// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Resolve state directory: `SCHMUX_STATE_DIR` > `XDG_STATE_HOME/schmux` >
/// `~/.local/state/schmux`. No migration logic: this is the external
/// "configuration loading" collaborator's narrow slice that `schmux-daemon`
/// needs in order to construct C1-C7 at all.
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("SCHMUX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("schmux"));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoStateDir)?;
    Ok(home.join(".local/state/schmux"))
}

/// Resolve the overlay root: `SCHMUX_OVERLAY_ROOT` > `<state_dir>/overlays`.
pub fn overlay_root(state_dir: &std::path::Path) -> PathBuf {
    std::env::var("SCHMUX_OVERLAY_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| state_dir.join("overlays"))
}
