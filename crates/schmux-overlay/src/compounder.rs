// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The overlay compounder's decision function and execution step (C5).
//! Free functions, not methods, so the five-branch decision table and each
//! merge strategy are independently unit-testable without constructing a
//! full compounder.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::hashing::hash_file;
use crate::manager::LlmExecutor;

/// 8 KiB prefix scanned for a null byte to decide "binary".
const BINARY_SNIFF_LEN: usize = 8 * 1024;
/// Files larger than this on either side force last-write-wins even inside
/// `LlmMerge`.
const MAX_LLM_MERGE_BYTES: u64 = 100 * 1024;
pub const LLM_MERGE_TIMEOUT: Duration = Duration::from_secs(30);

/// The prompt wording is part of the external contract for whatever
/// executor is plugged in (an Open Question in the component design:
/// reimplementations should treat the wording as observable, not an
/// implementation detail).
pub const LLM_MERGE_PROMPT_TEMPLATE: &str = "\
You are merging a three-way conflict in an overlay-managed configuration \
file. Produce the fully merged file contents and nothing else: no code \
fences, no commentary, no explanation.

--- overlay version ---
{overlay}
--- workspace version ---
{workspace}
--- end ---
";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("reading workspace file: {0}")]
    ReadWorkspace(std::io::Error),
    #[error("reading overlay file: {0}")]
    ReadOverlay(std::io::Error),
    #[error("writing overlay file: {0}")]
    WriteOverlay(std::io::Error),
    #[error("creating overlay parent directory: {0}")]
    CreateParent(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Skip,
    FastPath,
    LlmMerge,
}

/// `DetermineMergeAction`: computes `wsHash`, `overlayHash`, and compares
/// them against `manifestHash` per the five-branch table in the component
/// design. Hash errors on the workspace file surface as errors; a missing
/// overlay file is routed to `FastPath`, not an error.
pub fn determine_merge_action(
    ws_path: &Path,
    overlay_path: &Path,
    manifest_hash: &str,
) -> Result<MergeAction, MergeError> {
    let ws_hash = hash_file(ws_path).map_err(MergeError::ReadWorkspace)?;
    if ws_hash == manifest_hash {
        return Ok(MergeAction::Skip);
    }
    if !overlay_path.exists() {
        return Ok(MergeAction::FastPath);
    }
    let overlay_hash = hash_file(overlay_path).map_err(MergeError::ReadOverlay)?;
    if ws_hash == overlay_hash {
        return Ok(MergeAction::Skip);
    }
    if overlay_hash == manifest_hash {
        return Ok(MergeAction::FastPath);
    }
    Ok(MergeAction::LlmMerge)
}

/// `ExecuteMerge`: applies `action`, writing the overlay file as needed and
/// returning the bytes that now represent the overlay's canonical content
/// (`None` for `Skip`).
pub async fn execute_merge(
    action: MergeAction,
    ws_path: &Path,
    overlay_path: &Path,
    executor: Option<&dyn LlmExecutor>,
) -> Result<Option<Vec<u8>>, MergeError> {
    match action {
        MergeAction::Skip => Ok(None),
        MergeAction::FastPath => {
            let bytes = std::fs::read(ws_path).map_err(MergeError::ReadWorkspace)?;
            write_overlay(overlay_path, &bytes)?;
            Ok(Some(bytes))
        }
        MergeAction::LlmMerge => execute_llm_merge(ws_path, overlay_path, executor).await,
    }
}

async fn execute_llm_merge(
    ws_path: &Path,
    overlay_path: &Path,
    executor: Option<&dyn LlmExecutor>,
) -> Result<Option<Vec<u8>>, MergeError> {
    let ws_bytes = std::fs::read(ws_path).map_err(MergeError::ReadWorkspace)?;
    let overlay_bytes = std::fs::read(overlay_path).map_err(MergeError::ReadOverlay)?;

    if overlay_path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        let merged = merge_jsonl_lines(&overlay_bytes, &ws_bytes);
        write_overlay(overlay_path, &merged)?;
        return Ok(Some(merged));
    }

    if is_binary(&ws_bytes) || is_binary(&overlay_bytes) {
        write_overlay(overlay_path, &ws_bytes)?;
        return Ok(Some(ws_bytes));
    }

    if ws_bytes.len() as u64 > MAX_LLM_MERGE_BYTES || overlay_bytes.len() as u64 > MAX_LLM_MERGE_BYTES {
        write_overlay(overlay_path, &ws_bytes)?;
        return Ok(Some(ws_bytes));
    }

    let prompt = LLM_MERGE_PROMPT_TEMPLATE
        .replace("{overlay}", &String::from_utf8_lossy(&overlay_bytes))
        .replace("{workspace}", &String::from_utf8_lossy(&ws_bytes));

    let response = match executor {
        Some(executor) => match executor.execute(&prompt, LLM_MERGE_TIMEOUT).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "overlay compounder: llm executor failed, falling back to last-write-wins");
                None
            }
        },
        None => None,
    };

    match response {
        Some(text) if !text.is_empty() => {
            let merged = text.into_bytes();
            write_overlay(overlay_path, &merged)?;
            Ok(Some(merged))
        }
        // Empty response, error, or no executor: degrade deterministically
        // to last-write-wins.
        _ => {
            write_overlay(overlay_path, &ws_bytes)?;
            Ok(Some(ws_bytes))
        }
    }
}

fn is_binary(bytes: &[u8]) -> bool {
    let sniff_len = bytes.len().min(BINARY_SNIFF_LEN);
    bytes[..sniff_len].contains(&0)
}

fn write_overlay(overlay_path: &Path, bytes: &[u8]) -> Result<(), MergeError> {
    if let Some(parent) = overlay_path.parent() {
        std::fs::create_dir_all(parent).map_err(MergeError::CreateParent)?;
        set_mode(parent, 0o755);
    }
    std::fs::write(overlay_path, bytes).map_err(MergeError::WriteOverlay)?;
    set_mode(overlay_path, 0o644);
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

/// `mergeJSONLLines(a, b)`: trims, splits on `\n`, drops empties,
/// deduplicates by exact trimmed line, and returns `a`'s lines followed by
/// any lines from `b` not already present in `a`, joined with `\n` and a
/// single trailing newline.
pub fn merge_jsonl_lines(a: &[u8], b: &[u8]) -> Vec<u8> {
    let a_text = String::from_utf8_lossy(a);
    let b_text = String::from_utf8_lossy(b);

    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for line in a_text.lines().chain(b_text.lines()) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            merged.push(trimmed.to_string());
        }
    }

    let mut out = merged.join("\n").into_bytes();
    out.push(b'\n');
    out
}

#[cfg(test)]
#[path = "compounder_tests.rs"]
mod tests;
