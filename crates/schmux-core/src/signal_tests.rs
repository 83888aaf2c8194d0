// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    needs_input = { "needs_input", SignalState::NeedsInput },
    needs_testing = { "needs_testing", SignalState::NeedsTesting },
    completed = { "completed", SignalState::Completed },
    error = { "error", SignalState::Error },
    working = { "working", SignalState::Working },
)]
fn parses_valid_state_tokens(token: &str, expected: SignalState) {
    assert_eq!(SignalState::from_str(token), Ok(expected));
}

#[yare::parameterized(
    empty = { "" },
    unknown = { "done" },
    wrong_case = { "Completed" },
)]
fn rejects_invalid_state_tokens(token: &str) {
    assert!(SignalState::from_str(token).is_err());
}

#[test]
fn state_display_matches_wire_token() {
    for state in SignalState::ALL {
        assert_eq!(state.to_string(), state.as_wire_token());
    }
}
