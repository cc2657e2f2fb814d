//! Bounded history buffer for late-joiner catch-up
//!
//! When an observer attaches to a key that already has traffic, it first
//! receives the most recent lines for that key, then follows the live stream.
//! The buffer keeps at most `max_lines` entries and drops the oldest on
//! overflow. Lines are never reordered.

use std::collections::VecDeque;

use super::key::LogLine;

/// Default number of lines kept per key
pub const DEFAULT_MAX_LINES: usize = 1024;

/// History buffer for one routing key
#[derive(Debug)]
pub struct HistoryBuffer {
    /// Maximum number of buffered lines
    max_lines: usize,
    /// Buffered lines, oldest first
    lines: VecDeque<LogLine>,
    /// Lines ever appended
    total_appended: u64,
}

impl HistoryBuffer {
    /// Create a new history buffer with default capacity (1024 lines)
    pub fn new() -> Self {
        Self::with_max_lines(DEFAULT_MAX_LINES)
    }

    /// Create a new history buffer holding at most `max_lines` lines
    ///
    /// A capacity of zero is raised to one.
    pub fn with_max_lines(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(DEFAULT_MAX_LINES)),
            total_appended: 0,
        }
    }

    /// Append a line, dropping the oldest if the buffer is full
    pub fn append(&mut self, line: LogLine) {
        self.lines.push_back(line);
        if self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
        self.total_appended += 1;
    }

    /// Copy of all buffered lines in arrival order
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }

    /// Buffered lines joined with `\n`, or `None` if empty
    pub fn join_lines(&self) -> Option<String> {
        join_lines(self.lines.iter())
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of buffered lines
    pub fn capacity(&self) -> usize {
        self.max_lines
    }

    /// Total lines ever appended, including evicted ones
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Join lines into one newline-separated catch-up frame
pub(crate) fn join_lines<'a, I>(lines: I) -> Option<String>
where
    I: IntoIterator<Item = &'a LogLine>,
{
    let mut frame: Option<String> = None;
    for line in lines {
        match frame {
            Some(ref mut f) => {
                f.push('\n');
                f.push_str(line);
            }
            None => frame = Some(line.to_string()),
        }
    }
    frame
}
