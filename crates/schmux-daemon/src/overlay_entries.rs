// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declared-path resolution: the union of a hard-coded builtin set, a
//! global list, and a per-repo list, deduplicated in that order. Entries
//! with no file on disk yet are still watched (`OverlayEntryStatus::Pending`).

use schmux_core::{OverlayEntry, OverlayEntrySource, OverlayEntryStatus, RelPath};

/// The two canonical agent-config paths every repo's overlay manages
/// regardless of global/per-repo configuration.
pub const BUILTIN_OVERLAY_PATHS: &[&str] = &[".claude/settings.local.json", ".mcp.json"];

/// Builds the declared-path union for one repo: builtin defaults, then the
/// global list, then the per-repo list, deduplicated in that order. `status`
/// for each entry reflects whether `repo_root.join(rel_path)` exists.
pub fn declared_entries(
    repo_name: &str,
    repo_root: &std::path::Path,
    global: &[RelPath],
    repo: &[RelPath],
) -> Vec<OverlayEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();

    let mut push = |rel_path: RelPath, source: OverlayEntrySource| {
        if !seen.insert(rel_path.as_str().to_string()) {
            return;
        }
        let status = if repo_root.join(rel_path.as_ref() as &std::path::Path).exists() {
            OverlayEntryStatus::Synced
        } else {
            OverlayEntryStatus::Pending
        };
        entries.push(OverlayEntry {
            repo_name: repo_name.to_string(),
            rel_path,
            source,
            status,
        });
    };

    for raw in BUILTIN_OVERLAY_PATHS {
        if let Ok(rel_path) = RelPath::parse(*raw) {
            push(rel_path, OverlayEntrySource::Builtin);
        }
    }
    for rel_path in global {
        push(rel_path.clone(), OverlayEntrySource::Global);
    }
    for rel_path in repo {
        push(rel_path.clone(), OverlayEntrySource::Repo);
    }

    entries
}

/// Derives the overlay directory name for a repo from its URL or path: the
/// final path segment with a trailing `.git` stripped. Falls back to the
/// input verbatim if it has no path separator.
pub fn repo_name_from_url(repo: &str) -> String {
    let trimmed = repo.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Just the relative paths, in the same deduplicated union order — what
/// `OverlayManager::add_workspace` wants for `declared_paths`.
pub fn declared_paths(global: &[RelPath], repo: &[RelPath]) -> Vec<RelPath> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for raw in BUILTIN_OVERLAY_PATHS {
        if let Ok(rel_path) = RelPath::parse(*raw) {
            if seen.insert(rel_path.as_str().to_string()) {
                out.push(rel_path);
            }
        }
    }
    for rel_path in global.iter().chain(repo) {
        if seen.insert(rel_path.as_str().to_string()) {
            out.push(rel_path.clone());
        }
    }
    out
}

#[cfg(test)]
#[path = "overlay_entries_tests.rs"]
mod tests;
