// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn session_error_messages_name_the_id() {
    let err = SessionError::NotFound("fake-1".to_string());
    assert_eq!(err.to_string(), "session not found: fake-1");

    let err = SessionError::SpawnFailed("boom".to_string());
    assert_eq!(err.to_string(), "spawn failed: boom");

    let err = SessionError::CommandFailed("boom".to_string());
    assert_eq!(err.to_string(), "command failed: boom");
}
