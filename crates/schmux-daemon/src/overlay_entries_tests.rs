// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn declared_paths_always_includes_the_two_builtin_agent_config_paths() {
    let paths = declared_paths(&[], &[]);
    let strs: Vec<&str> = paths.iter().map(RelPath::as_str).collect();
    assert!(strs.contains(&".claude/settings.local.json"));
    assert!(strs.contains(&".mcp.json"));
}

#[test]
fn declared_paths_dedups_across_builtin_global_and_repo_in_order() {
    let global = vec![RelPath::parse(".mcp.json").expect("rel path"), RelPath::parse("a.json").expect("rel path")];
    let repo = vec![RelPath::parse("a.json").expect("rel path"), RelPath::parse("b.json").expect("rel path")];

    let paths = declared_paths(&global, &repo);
    let strs: Vec<&str> = paths.iter().map(RelPath::as_str).collect();

    assert_eq!(
        strs,
        vec![".claude/settings.local.json", ".mcp.json", "a.json", "b.json"]
    );
}

#[test]
fn declared_entries_marks_pending_when_no_file_exists_yet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let entries = declared_entries("repo", dir.path(), &[], &[]);

    assert!(entries
        .iter()
        .all(|e| matches!(e.status, OverlayEntryStatus::Pending)));
    assert!(entries.iter().any(|e| e.source == OverlayEntrySource::Builtin));
}

#[test]
fn repo_name_from_url_takes_the_final_segment_and_strips_dot_git() {
    assert_eq!(repo_name_from_url("git@github.com:acme/widgets.git"), "widgets");
    assert_eq!(repo_name_from_url("https://github.com/acme/widgets"), "widgets");
    assert_eq!(repo_name_from_url("widgets"), "widgets");
}

#[test]
fn declared_entries_marks_synced_when_the_file_already_exists() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join(".claude")).expect("mkdir");
    std::fs::write(dir.path().join(".claude/settings.local.json"), b"{}").expect("write");

    let entries = declared_entries("repo", dir.path(), &[], &[]);
    let claude_entry = entries
        .iter()
        .find(|e| e.rel_path.as_str() == ".claude/settings.local.json")
        .expect("entry present");
    assert!(matches!(claude_entry.status, OverlayEntryStatus::Synced));
}
