// Time-boxed FIFO between the playlist poller and the fetcher.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// A segment waiting to be fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub uri: String,
    /// Expected duration in seconds, as announced by the playlist
    pub duration: f64,
    pub enqueued_at: Instant,
}

impl QueueEntry {
    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.enqueued_at) > timeout
    }
}

#[derive(Debug)]
pub struct SegmentQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    entry_timeout: Duration,
}

impl SegmentQueue {
    pub fn new(entry_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            entry_timeout,
        }
    }

    pub fn add(&self, uri: impl Into<String>, duration: f64) {
        self.entries.lock().push_back(QueueEntry {
            uri: uri.into(),
            duration,
            enqueued_at: Instant::now(),
        });
    }

    /// Pops the oldest live entry without blocking. Expired entries met on the
    /// way are discarded.
    pub fn take(&self) -> Option<QueueEntry> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        while let Some(entry) = entries.pop_front() {
            if !entry.is_expired(now, self.entry_timeout) {
                return Some(entry);
            }
        }
        None
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn upkeep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| !entry.is_expired(now, self.entry_timeout));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn entry_timeout(&self) -> Duration {
        self.entry_timeout
    }
}
