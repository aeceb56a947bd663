//! Human-readable session log.
//!
//! Separate from `tracing`: this is the operator-facing trail of protocol
//! milestones ("<HELLO> received from …", "Valid client: …") that the
//! platform persists or displays. Validation rejections carry a `(VAL)`
//! prefix.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Local;

/// Entries kept by [`RecentLog`].
pub const RECENT_LOG_CAPACITY: usize = 300;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

pub trait SessionLog: Send + Sync {
    fn append(&self, timestamp: &str, text: &str);
    /// Called once at session start, before "Session starts".
    fn reset(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub text: String,
}

/// In-memory ring of the most recent entries.
#[derive(Debug)]
pub struct RecentLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl RecentLog {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Number of entries whose text contains `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lock().iter().filter(|e| e.text.contains(needle)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RecentLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLog for RecentLog {
    fn append(&self, timestamp: &str, text: &str) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry { timestamp: timestamp.to_owned(), text: text.to_owned() });
    }

    fn reset(&self) {
        self.lock().clear();
    }
}

/// Timestamps entries and forwards them to the configured [`SessionLog`].
#[derive(Clone)]
pub(crate) struct Journal {
    log: Arc<dyn SessionLog>,
}

impl Journal {
    pub(crate) fn new(log: Arc<dyn SessionLog>) -> Self {
        Self { log }
    }

    pub(crate) fn reset(&self) {
        self.log.reset();
    }

    pub(crate) fn record(&self, text: impl AsRef<str>) {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.log.append(&timestamp, text.as_ref());
    }

    pub(crate) fn validation(&self, text: impl std::fmt::Display) {
        self.record(format!("(VAL) {text}"));
    }
}
