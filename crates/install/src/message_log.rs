//! Bounded message log
//!
//! Keeps the start and the end of a long run. Once more than `capacity`
//! entries have been appended, the log holds the first `prefix` entries,
//! one truncation marker and the most recent `suffix` entries, with
//! `prefix + 1 + suffix == capacity`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use lunaris_config::constants::{MIN_LOG_CAPACITY, TRUNCATION_MARKER};
use lunaris_types::LogKind;

const MARKER_SOURCE: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub source: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    #[must_use]
    pub fn new(kind: LogKind, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_marker(&self) -> bool {
        self.source == MARKER_SOURCE && self.text == TRUNCATION_MARKER
    }
}

#[derive(Debug, Clone)]
pub struct MessageLog {
    capacity: usize,
    prefix: usize,
    head: Vec<LogEntry>,
    marker: Option<LogEntry>,
    tail: VecDeque<LogEntry>,
    appended: u64,
}

impl MessageLog {
    /// Capacities below the minimum are raised to it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_LOG_CAPACITY);
        let prefix = (capacity / 4).max(1);
        Self {
            capacity,
            prefix,
            head: Vec::with_capacity(capacity),
            marker: None,
            tail: VecDeque::new(),
            appended: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn suffix(&self) -> usize {
        self.capacity - 1 - self.prefix
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.appended += 1;

        if self.marker.is_none() {
            if self.head.len() < self.capacity {
                self.head.push(entry);
                return;
            }
            self.tail.extend(self.head.drain(self.prefix..));
            self.marker = Some(LogEntry::new(
                LogKind::Info,
                MARKER_SOURCE,
                TRUNCATION_MARKER,
            ));
        }

        self.tail.push_back(entry);
        while self.tail.len() > self.suffix() {
            self.tail.pop_front();
        }
    }

    pub fn push(&mut self, kind: LogKind, source: impl Into<String>, text: impl Into<String>) {
        self.append(LogEntry::new(kind, source, text));
    }

    /// Entries in display order, truncation marker included.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.head
            .iter()
            .chain(self.marker.iter())
            .chain(self.tail.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.head.len() + usize::from(self.marker.is_some()) + self.tail.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.marker.is_some()
    }

    /// Total number of entries ever appended.
    #[must_use]
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// The last `n` entries in display order.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<&LogEntry> {
        let skip = self.len().saturating_sub(n);
        self.entries().skip(skip).collect()
    }

    /// Text of the last `n` entries, for error reports.
    #[must_use]
    pub fn tail_text(&self, n: usize) -> Vec<String> {
        self.tail(n).into_iter().map(|e| e.text.clone()).collect()
    }

    #[must_use]
    pub fn filter_by_kind(&self, kind: LogKind) -> Vec<&LogEntry> {
        self.entries().filter(|e| e.kind == kind).collect()
    }

    #[must_use]
    pub fn filter_by_source(&self, source: &str) -> Vec<&LogEntry> {
        self.entries().filter(|e| e.source == source).collect()
    }

    pub fn clear(&mut self) {
        self.head.clear();
        self.marker = None;
        self.tail.clear();
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(lunaris_config::constants::DEFAULT_LOG_CAPACITY)
    }
}
