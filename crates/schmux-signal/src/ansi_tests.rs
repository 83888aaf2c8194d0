// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn passes_plain_text_through_unchanged() {
    assert_eq!(strip_line(b"hello world"), b"hello world");
}

#[test]
fn strips_sgr_color_codes() {
    let input = b"\x1b[38;2;255;255;255mhello\x1b[39m";
    assert_eq!(strip_line(input), b"hello");
}

#[test]
fn cursor_forward_emits_spaces() {
    assert_eq!(strip_line(b"a\x1b[3Cb"), b"a   b");
}

#[test]
fn cursor_forward_defaults_to_one() {
    assert_eq!(strip_line(b"a\x1b[Cb"), b"a b");
}

#[test]
fn dec_private_prefix_forces_count_one() {
    assert_eq!(strip_line(b"a\x1b[?2026lb"), b"ab");
}

#[test]
fn cursor_down_emits_newlines() {
    assert_eq!(strip_line(b"a\x1b[2Bb"), b"a\n\nb");
}

#[test]
fn unknown_escape_consumes_only_esc_byte() {
    // ESC 'Z' is not [, ], P, or _: only ESC is consumed, 'Z' passes through.
    assert_eq!(strip_line(b"a\x1bZb"), b"aZb");
}

#[test]
fn osc_consumes_until_bel() {
    assert_eq!(strip_line(b"a\x1b]0;title\x07b"), b"ab");
}

#[test]
fn osc_consumes_until_st() {
    assert_eq!(strip_line(b"a\x1b]0;title\x1b\\b"), b"ab");
}

#[test]
fn dcs_consumes_until_st() {
    assert_eq!(strip_line(b"a\x1bPsome-dcs-data\x1b\\b"), b"ab");
}

#[test]
fn ansi_wrapped_marker_stays_matchable() {
    let input = b"\x1b[?2026l\x1b[?2026h\x1b[38;2;255;255;255m\xe2\x8f\xba\x1b[1C\x1b[39m--<[schmux:needs_input:How\x1b[1Ccan\x1b[1CI\x1b[1Chelp]>--\r\n";
    let stripped = strip_line(input);
    let text = String::from_utf8_lossy(&stripped);
    assert_eq!(text, "\u{23fa}--<[schmux:needs_input:How can I help]>--\r\n");
}
