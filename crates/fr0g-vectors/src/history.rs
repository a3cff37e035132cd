//! Bounded ring of recently processed messages, per processor.

use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub event_id: String,
    pub source: String,
    pub content_len: usize,
    pub threat: bool,
    pub at: DateTime<Utc>,
}

/// Fixed-capacity ring; the oldest record drops when full.
pub struct MessageRing {
    capacity: usize,
    records: RwLock<VecDeque<HistoryRecord>>,
}

impl MessageRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn push(&self, record: HistoryRecord) {
        let mut records = self.records.write().unwrap();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Messages from `source` within the trailing window. Drives the
    /// burst-activity bot signal.
    pub fn count_from(&self, source: &str, within: Duration) -> usize {
        let cutoff = Utc::now() - within;
        self.records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.source == source && r.at >= cutoff)
            .count()
    }
}
