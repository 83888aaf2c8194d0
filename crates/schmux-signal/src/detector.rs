// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The signal detector (C2): a pure byte-stream parser with no I/O of its
//! own. Never returns an error; invalid input either yields nothing or
//! drives the near-miss diagnostic.

use std::time::{Duration, Instant};

use schmux_core::Signal;

use crate::ansi;
use crate::marker::{self, NEAR_MISS_NEEDLE};

const MAX_BUFFER_BYTES: usize = 4096;
const FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

pub struct SignalDetector {
    buf: Vec<u8>,
    last_feed: Instant,
    suppressed: bool,
    last_signal: Option<Signal>,
    on_signal: Box<dyn FnMut(Signal) + Send>,
    on_near_miss: Option<Box<dyn FnMut(&str) + Send>>,
}

impl SignalDetector {
    pub fn new(on_signal: impl FnMut(Signal) + Send + 'static) -> Self {
        Self {
            buf: Vec::new(),
            last_feed: Instant::now(),
            suppressed: false,
            last_signal: None,
            on_signal: Box::new(on_signal),
            on_near_miss: None,
        }
    }

    pub fn set_near_miss_callback(&mut self, cb: impl FnMut(&str) + Send + 'static) {
        self.on_near_miss = Some(Box::new(cb));
    }

    pub fn suppress(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
    }

    pub fn last_signal(&self) -> Option<&Signal> {
        self.last_signal.as_ref()
    }

    /// True iff the buffer is non-empty and the elapsed time since the last
    /// `feed` is at least the flush timeout.
    pub fn should_flush(&self) -> bool {
        !self.buf.is_empty() && self.last_feed.elapsed() >= FLUSH_TIMEOUT
    }

    /// Accepts any chunking, including single bytes, mid-escape-sequence,
    /// or mid-marker splits.
    pub fn feed(&mut self, data: &[u8]) {
        self.last_feed = Instant::now();
        self.buf.extend_from_slice(data);

        if let Some(pos) = self.buf.iter().rposition(|&b| b == b'\n') {
            let complete: Vec<u8> = self.buf[..=pos].to_vec();
            self.buf = self.buf[pos + 1..].to_vec();
            self.process_chunk(&complete);
        }

        self.enforce_buffer_cap();
    }

    /// Forces parsing of any buffered trailing bytes.
    pub fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let chunk = std::mem::take(&mut self.buf);
        self.process_chunk(&chunk);
    }

    fn enforce_buffer_cap(&mut self) {
        if self.buf.len() <= MAX_BUFFER_BYTES {
            return;
        }
        let excess = self.buf.len() - MAX_BUFFER_BYTES;
        let discarded = &self.buf[..excess];
        if contains_subslice(discarded, NEAR_MISS_NEEDLE.as_bytes()) {
            self.report_near_miss("buffer truncation discarded signal-like data");
        }
        self.buf.drain(..excess);
    }

    fn process_chunk(&mut self, chunk: &[u8]) {
        let mut valid = Vec::new();
        let mut near_miss_lines: Vec<String> = Vec::new();

        for raw_line in split_on_byte(chunk, b'\n') {
            let stripped = ansi::strip_line(raw_line);
            for display_line in split_on_byte(&stripped, b'\n') {
                let text = String::from_utf8_lossy(display_line);
                if let Some((state, message)) = marker::match_marker(&text) {
                    valid.push(Signal::new(state, message, Instant::now()));
                } else if text.contains(NEAR_MISS_NEEDLE) {
                    near_miss_lines.push(text.into_owned());
                }
            }
        }

        let any_valid = !valid.is_empty();
        for signal in valid {
            self.last_signal = Some(signal.clone());
            if !self.suppressed {
                (self.on_signal)(signal);
            }
        }

        // Near-miss reporting is suppressed whenever the same batch
        // produced at least one valid signal.
        if !any_valid {
            for line in near_miss_lines {
                self.report_near_miss(&line);
            }
        }
    }

    fn report_near_miss(&mut self, text: &str) {
        if let Some(cb) = self.on_near_miss.as_mut() {
            cb(text);
        }
    }
}

fn split_on_byte(data: &[u8], sep: u8) -> impl Iterator<Item = &[u8]> {
    let mut pieces: Vec<&[u8]> = data.split(|&b| b == sep).collect();
    // A chunk we process always either came from a line ending in the
    // separator (feed's complete-lines path) or is the final flush of
    // whatever remained (no trailing separator). Drop the spurious empty
    // trailing piece that `slice::split` yields when the input ends with
    // the separator, since that piece represents "after the last line",
    // not a line of its own.
    if data.last() == Some(&sep) {
        pieces.pop();
    }
    pieces.into_iter()
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return needle.is_empty();
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;
