//! Rolling event log.
//!
//! Keeps the most recent session messages for display. Purely observational;
//! the only invariant is the capacity bound.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Maximum number of entries retained by an [`EventLog`].
pub const MAX_ENTRIES: usize = 20;

/// A single timestamped log entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogEntry {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// The message text.
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Bounded FIFO of the most recent session messages.
///
/// Holds at most [`MAX_ENTRIES`] entries; pushing beyond the bound evicts
/// the oldest entry first.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
}

impl EventLog {
    /// Create a new empty EventLog.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(MAX_ENTRIES),
        }
    }

    /// Append a message, evicting the oldest entry if at capacity.
    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() == MAX_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Get the number of entries in the log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Get the most recent entry.
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_log_new() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(log.latest().is_none());
    }

    #[test]
    fn test_event_log_push() {
        let mut log = EventLog::new();
        log.push("Bluetooth ON.");
        log.push("Found: LNS-Peripheral");

        assert_eq!(log.len(), 2);
        assert_eq!(log.latest().unwrap().message, "Found: LNS-Peripheral");

        let messages: Vec<_> = log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["Bluetooth ON.", "Found: LNS-Peripheral"]);
    }

    #[test]
    fn test_event_log_capacity_bound() {
        let mut log = EventLog::new();
        for i in 0..MAX_ENTRIES {
            log.push(format!("message {}", i));
        }
        assert_eq!(log.len(), MAX_ENTRIES);

        // The 21st push evicts the oldest entry
        log.push("one more");
        assert_eq!(log.len(), MAX_ENTRIES);
        assert_eq!(log.iter().next().unwrap().message, "message 1");
        assert_eq!(log.latest().unwrap().message, "one more");
    }

    #[test]
    fn test_event_log_never_exceeds_capacity() {
        let mut log = EventLog::new();
        for i in 0..100 {
            log.push(format!("message {}", i));
            assert!(log.len() <= MAX_ENTRIES);
        }
        assert_eq!(log.iter().next().unwrap().message, "message 80");
    }

    #[test]
    fn test_event_log_clear() {
        let mut log = EventLog::new();
        log.push("something");
        log.clear();
        assert!(log.is_empty());
    }
}
