// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn matches_plain_marker() {
    let (state, msg) = match_marker("--<[schmux:completed:Task done]>--").expect("matches");
    assert_eq!(state, SignalState::Completed);
    assert_eq!(msg, "Task done");
}

#[test]
fn matches_with_bullet_prefix_and_trailing_cr() {
    let (state, msg) = match_marker("⏺ --<[schmux:needs_input:How can I help]>--\r").expect("matches");
    assert_eq!(state, SignalState::NeedsInput);
    assert_eq!(msg, "How can I help");
}

#[test]
fn rejects_unknown_state_word() {
    assert!(match_marker("--<[schmux:bogus:message]>--").is_none());
}

#[test]
fn rejects_non_marker_lines() {
    assert!(match_marker("just some output").is_none());
    assert!(match_marker("--<[schmux:completed:missing terminator").is_none());
}

#[test]
fn near_miss_needle_detects_partial_markers() {
    assert!("--<[schmux:completed:oops".contains(NEAR_MISS_NEEDLE));
    assert!(!"ordinary output".contains(NEAR_MISS_NEEDLE));
}
