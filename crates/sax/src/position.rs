//! Source position tracking

use serde::Serialize;
use std::fmt;

/// A location in the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Line number (1-indexed)
    pub line: u32,
    /// Characters consumed on the current line (0 right after a newline)
    pub column: u32,
    /// Bytes consumed from the start of the stream (UTF-8)
    pub byte_offset: u64,
}

impl Position {
    pub fn new(line: u32, column: u32, byte_offset: u64) -> Self {
        Self { line, column, byte_offset }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Advances a [`Position`] one character at a time.
///
/// A `\r\n` pair ends a single line even when the two characters arrive in
/// different chunks, because the pending carriage return is kept here.
#[derive(Debug, Clone)]
pub(crate) struct PositionTracker {
    position: Position,
    after_cr: bool,
    enabled: bool,
    unicode_separators: bool,
}

impl PositionTracker {
    pub fn new(enabled: bool, unicode_separators: bool) -> Self {
        Self {
            position: Position::default(),
            after_cr: false,
            enabled,
            unicode_separators,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn advance(&mut self, c: char) {
        if !self.enabled {
            return;
        }
        self.position.byte_offset += c.len_utf8() as u64;

        match c {
            '\n' if self.after_cr => {
                // Second half of \r\n, the line was already counted.
                self.after_cr = false;
            }
            '\n' => self.newline(),
            '\r' => {
                self.newline();
                self.after_cr = true;
            }
            '\u{85}' | '\u{2028}' | '\u{2029}' if self.unicode_separators => self.newline(),
            _ => {
                self.after_cr = false;
                self.position.column += 1;
            }
        }
    }

    fn newline(&mut self) {
        self.after_cr = false;
        self.position.line += 1;
        self.position.column = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(input: &str, unicode: bool) -> Position {
        let mut tracker = PositionTracker::new(true, unicode);
        for c in input.chars() {
            tracker.advance(c);
        }
        tracker.position()
    }

    #[test]
    fn test_columns_and_lines() {
        assert_eq!(track("abc", false), Position::new(1, 3, 3));
        assert_eq!(track("ab\ncd", false), Position::new(2, 2, 5));
    }

    #[test]
    fn test_newline_sequences() {
        assert_eq!(track("a\r\nb", false), Position::new(2, 1, 4));
        assert_eq!(track("a\rb", false), Position::new(2, 1, 3));
        assert_eq!(track("\r\r\n\n", false).line, 4);
    }

    #[test]
    fn test_crlf_split_across_calls() {
        let mut tracker = PositionTracker::new(true, false);
        tracker.advance('\r');
        let mid = tracker.position();
        tracker.advance('\n');
        assert_eq!(mid.line, tracker.position().line);
        assert_eq!(tracker.position().column, 0);
    }

    #[test]
    fn test_unicode_separators() {
        assert_eq!(track("a\u{2028}b", false).line, 1);
        assert_eq!(track("a\u{2028}b", true), Position::new(2, 1, 5));
    }

    #[test]
    fn test_disabled_tracking() {
        let mut tracker = PositionTracker::new(false, false);
        tracker.advance('x');
        assert_eq!(tracker.position(), Position::default());
    }

    #[test]
    fn test_display() {
        assert_eq!(Position::new(10, 5, 100).to_string(), "10:5");
    }
}
