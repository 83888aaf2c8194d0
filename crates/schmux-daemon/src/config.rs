// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: resolved paths and the tunables governing signal
//! debounce, overlay suppression, save coalescing, LLM merge timeout, and
//! scrollback capture. Defaults reproduce the documented empirical values
//! (4 KiB buffer / 500 ms flush / 100 ms file debounce / 5 s suppression)
//! unchanged. No migration logic lives here: the shape of these values is
//! this crate's concern, loading and versioning config files is an
//! external collaborator's.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::env;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve a home directory to derive the state directory")]
    NoStateDir,
}

/// Resolved paths and tunables needed to wire C1 through C7.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub state_file_path: PathBuf,
    pub overlay_root: PathBuf,
    pub log_path: PathBuf,
    pub signal_debounce_ms: u64,
    pub overlay_suppress_secs: u64,
    pub save_debounce_ms: u64,
    pub llm_timeout_secs: u64,
    pub scrollback_timeout_secs: u64,
}

impl Config {
    /// Loads configuration for the user-level daemon: fixed paths under
    /// `~/.local/state/schmux/` (or `$XDG_STATE_HOME/schmux/`), one daemon
    /// per user. Tunables fall back to their documented defaults when unset.
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = env::state_dir()?;
        let overlay_root = env::overlay_root(&state_dir);

        Ok(Self {
            state_file_path: state_dir.join("state.json"),
            log_path: state_dir.join("schmuxd.log"),
            overlay_root,
            signal_debounce_ms: env_u64("SCHMUX_SIGNAL_DEBOUNCE_MS", 100),
            overlay_suppress_secs: env_u64("SCHMUX_OVERLAY_SUPPRESS_SECS", 5),
            save_debounce_ms: env_u64("SCHMUX_SAVE_DEBOUNCE_MS", 500),
            llm_timeout_secs: env_u64("SCHMUX_LLM_TIMEOUT_SECS", 30),
            scrollback_timeout_secs: env_u64("SCHMUX_SCROLLBACK_TIMEOUT_SECS", 2),
            state_dir,
        })
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_to_default_when_unset_or_unparseable() {
        assert_eq!(env_u64("SCHMUX_DOES_NOT_EXIST_XYZ", 42), 42);
    }
}
