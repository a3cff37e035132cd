//! Outbound message delivery tracking.
//!
//! One record per command id; state transitions follow the partial order
//! sending → sent → {delivered | failed | timeout}, with sending → failed as
//! the only permitted shortcut. A watchdog enforces the delivery timeout in
//! parallel with the 5-second polling sweep: whichever fires first wins.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Seconds between watchdog sweeps.
const POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sending,
    Sent,
    Delivered,
    Failed,
    Timeout,
}

impl DeliveryState {
    /// The monotonic transition relation.
    pub fn can_transition(self, to: DeliveryState) -> bool {
        use DeliveryState::*;
        matches!(
            (self, to),
            (Sending, Sent) | (Sending, Failed) | (Sent, Delivered) | (Sent, Failed) | (Sent, Timeout)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryState::Delivered | DeliveryState::Failed | DeliveryState::Timeout
        )
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Lifecycle record for one outbound command.
#[derive(Debug, Clone, Serialize)]
pub struct MessageStatus {
    pub id: String,
    pub status: DeliveryState,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

/// Concurrent map from command id to [`MessageStatus`] with narrow mutation
/// primitives.
pub struct DeliveryTracker {
    /// Arc so per-message watchdog tasks can share the live map.
    entries: std::sync::Arc<DashMap<String, MessageStatus>>,
    timeout: Duration,
}

impl DeliveryTracker {
    pub fn new(delivery_timeout_ms: u64) -> Self {
        Self {
            entries: std::sync::Arc::new(DashMap::new()),
            timeout: Duration::milliseconds(delivery_timeout_ms as i64),
        }
    }

    /// Begin tracking a command in the `sending` state. A second `track` for
    /// the same id is rejected: at most one record per command.
    pub fn track(&self, command_id: &str) -> Result<()> {
        let status = MessageStatus {
            id: command_id.to_string(),
            status: DeliveryState::Sending,
            sent_at: Utc::now(),
            delivered_at: None,
            attempt_count: 0,
            last_error: None,
        };
        match self.entries.entry(command_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ClientError::InvalidRequest(
                format!("command {command_id} is already tracked"),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(status);
                debug!(command_id, "tracking outbound command");
                Ok(())
            }
        }
    }

    /// Transition a record, enforcing the monotonic order.
    pub fn update(
        &self,
        command_id: &str,
        to: DeliveryState,
        error: Option<String>,
    ) -> Result<()> {
        let mut entry = self
            .entries
            .get_mut(command_id)
            .ok_or_else(|| ClientError::UnknownMessage {
                id: command_id.to_string(),
            })?;

        if !entry.status.can_transition(to) {
            return Err(ClientError::InvalidTransition {
                from: entry.status.to_string(),
                to: to.to_string(),
            });
        }

        entry.status = to;
        if to == DeliveryState::Delivered {
            entry.delivered_at = Some(Utc::now());
        }
        if let Some(e) = error {
            entry.last_error = Some(e);
        }
        debug!(command_id, status = %to, "delivery state advanced");
        Ok(())
    }

    pub fn record_attempt(&self, command_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(command_id) {
            entry.attempt_count += 1;
        }
    }

    pub fn get(&self, command_id: &str) -> Option<MessageStatus> {
        self.entries.get(command_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delivered / total × 100. Zero when nothing was tracked.
    pub fn delivery_rate(&self) -> f64 {
        let total = self.entries.len();
        if total == 0 {
            return 0.0;
        }
        let delivered = self
            .entries
            .iter()
            .filter(|e| e.status == DeliveryState::Delivered)
            .count();
        delivered as f64 / total as f64 * 100.0
    }

    /// Expire every non-terminal record older than the delivery timeout.
    /// `sent` times out; a record still `sending` can only fail.
    pub fn expire_overdue(&self) -> usize {
        let cutoff = Utc::now() - self.timeout;
        let mut expired = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.status.is_terminal() || entry.sent_at > cutoff {
                continue;
            }
            match entry.status {
                DeliveryState::Sent => {
                    entry.status = DeliveryState::Timeout;
                    expired += 1;
                }
                DeliveryState::Sending => {
                    entry.status = DeliveryState::Failed;
                    entry.last_error = Some("timed out before send completed".to_string());
                    expired += 1;
                }
                _ => {}
            }
        }
        if expired > 0 {
            warn!(expired, "delivery watchdog expired overdue messages");
        }
        expired
    }

    /// Watchdog: arm a per-message timer alongside the 5-second poll so a
    /// record expires as soon as either fires.
    pub fn watch(&self, command_id: &str, cancel: &CancellationToken) {
        let id = command_id.to_string();
        let timeout =
            std::time::Duration::from_millis(self.timeout.num_milliseconds().max(0) as u64);
        let cancel = cancel.clone();
        let entries = self.entries.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    if let Some(mut entry) = entries.get_mut(&id) {
                        match entry.status {
                            DeliveryState::Sent => {
                                entry.status = DeliveryState::Timeout;
                                warn!(command_id = %id, "delivery timed out");
                            }
                            DeliveryState::Sending => {
                                entry.status = DeliveryState::Failed;
                                entry.last_error =
                                    Some("timed out before send completed".to_string());
                            }
                            _ => {}
                        }
                    }
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Polling loop, parallel to the per-message timers.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("delivery tracker watchdog started");
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(POLL_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.expire_overdue();
                }
                _ = cancel.cancelled() => {
                    info!("delivery tracker watchdog stopped");
                    break;
                }
            }
        }
    }
}
