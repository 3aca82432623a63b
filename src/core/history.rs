//! Bounded traffic history
//!
//! Keeps the most recent lines sent to and received from a device, each
//! stamped with local time, for diagnostics and the `history` command.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Line direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Written to the device
    Sent,
    /// Read from the device
    Received,
}

/// A single history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEntry {
    /// When the line was sent or received
    pub timestamp: DateTime<Local>,
    /// Line direction
    pub direction: Direction,
    /// Line text without framing
    pub line: String,
}

impl TrafficEntry {
    /// Create an entry stamped now
    pub fn new(direction: Direction, line: &str) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            line: line.to_string(),
        }
    }

    /// Format as text
    pub fn to_text(&self, show_timestamp: bool) -> String {
        let dir = match self.direction {
            Direction::Sent => "TX",
            Direction::Received => "RX",
        };

        if show_timestamp {
            format!(
                "[{}] {} {}",
                self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                dir,
                self.line
            )
        } else {
            format!("{} {}", dir, self.line)
        }
    }
}

/// Ring buffer of recent traffic
#[derive(Debug)]
pub struct TrafficLog {
    entries: Mutex<VecDeque<TrafficEntry>>,
    capacity: usize,
}

impl TrafficLog {
    /// Create a log holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn push(&self, entry: TrafficEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Record an outbound command
    pub fn record_sent(&self, line: &str) {
        self.push(TrafficEntry::new(Direction::Sent, line));
    }

    /// Record an inbound line
    pub fn record_received(&self, line: &str) {
        self.push(TrafficEntry::new(Direction::Received, line));
    }

    /// Copy of the current entries, oldest first
    pub fn snapshot(&self) -> Vec<TrafficEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for TrafficLog {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let log = TrafficLog::new(2);
        log.record_sent("I");
        log.record_received("V8X4 A8X4");
        log.record_sent("1%");

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].line, "V8X4 A8X4");
        assert_eq!(entries[1].direction, Direction::Sent);
    }

    #[test]
    fn test_to_text() {
        let entry = TrafficEntry::new(Direction::Received, "C3");
        assert_eq!(entry.to_text(false), "RX C3");
        assert!(entry.to_text(true).ends_with("] RX C3"));
    }
}
