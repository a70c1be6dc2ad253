// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Captured log lines and the text handling that produces them.

use chrono::{DateTime, SecondsFormat, Utc};

/// Newline characters a captured chunk is split on.
///
/// Covers LF, VT, FF, CR, NEL and the Unicode line/paragraph separators, so
/// `\r\n` terminated output does not leave stray carriage returns behind.
const LINE_BREAKS: [char; 7] = [
    '\n', '\u{000B}', '\u{000C}', '\r', '\u{0085}', '\u{2028}', '\u{2029}',
];

/// One captured line waiting in the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedLogEntry {
    pub message: String,
    /// Entries from the error stream are always error level.
    pub is_error: bool,
    /// Capture time, not flush time.
    pub timestamp: DateTime<Utc>,
}

impl BufferedLogEntry {
    #[must_use]
    pub fn new(message: impl Into<String>, is_error: bool) -> Self {
        Self {
            message: message.into(),
            is_error,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn level(&self) -> &'static str {
        if self.is_error {
            "error"
        } else {
            "info"
        }
    }

    /// ISO-8601 capture time with millisecond precision, e.g.
    /// `2024-05-01T12:00:00.123Z`.
    #[must_use]
    pub fn iso8601_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Decodes one chunk read from the pipe.
///
/// A chunk that is not valid UTF-8 is dropped as a whole.
#[must_use]
pub fn decode_chunk(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

/// Splits decoded output into lines, discarding empty ones.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(LINE_BREAKS).filter(|line| !line.is_empty())
}
