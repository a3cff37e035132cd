//! Sender/user reputation tracking with periodic eviction.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

/// Reputation entries unseen for this long are evicted by the sweep.
const EVICTION_HORIZON_HOURS: i64 = 24;
/// Reputation delta applied per clean message.
const CLEAN_STEP: f64 = 0.01;
/// Reputation delta applied per threat.
const THREAT_STEP: f64 = 0.1;

#[derive(Debug, Clone, Serialize)]
pub struct SenderReputation {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub message_count: u64,
    pub threat_count: u64,
    /// 0.0–1.0, starts at 0.5.
    pub reputation: f64,
    pub blacklisted: bool,
    pub whitelisted: bool,
}

impl SenderReputation {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            message_count: 0,
            threat_count: 0,
            reputation: 0.5,
            blacklisted: false,
            whitelisted: false,
        }
    }
}

/// Concurrent reputation table keyed by sender identity.
pub struct ReputationTable {
    entries: DashMap<String, SenderReputation>,
}

impl ReputationTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record one message from a sender. `threat` marks whether this message
    /// classified at medium or above.
    pub fn record(&self, sender: &str, threat: bool) {
        let now = Utc::now();
        let mut entry = self
            .entries
            .entry(sender.to_string())
            .or_insert_with(|| SenderReputation::new(now));
        entry.last_seen = now;
        entry.message_count += 1;
        if threat {
            entry.threat_count += 1;
            entry.reputation = (entry.reputation - THREAT_STEP).max(0.0);
        } else {
            entry.reputation = (entry.reputation + CLEAN_STEP).min(1.0);
        }
    }

    pub fn get(&self, sender: &str) -> Option<SenderReputation> {
        self.entries.get(sender).map(|e| e.clone())
    }

    pub fn set_blacklisted(&self, sender: &str, value: bool) {
        let now = Utc::now();
        let mut entry = self
            .entries
            .entry(sender.to_string())
            .or_insert_with(|| SenderReputation::new(now));
        entry.blacklisted = value;
    }

    pub fn set_whitelisted(&self, sender: &str, value: bool) {
        let now = Utc::now();
        let mut entry = self
            .entries
            .entry(sender.to_string())
            .or_insert_with(|| SenderReputation::new(now));
        entry.whitelisted = value;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict entries unseen for more than 24 h. Returns the eviction count.
    pub fn sweep(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(EVICTION_HORIZON_HOURS);
        let before = self.entries.len();
        self.entries.retain(|_, e| e.last_seen >= cutoff);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, "reputation sweep evicted stale senders");
        }
        evicted
    }
}

impl Default for ReputationTable {
    fn default() -> Self {
        Self::new()
    }
}
