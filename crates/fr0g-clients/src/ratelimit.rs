//! Request throttling: a per-key sliding window and a refillable token pool.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Per-key sliding window: at most `limit` admissions in any trailing
/// `window`. Expired timestamps are dropped on each call, so the cost per
/// `allow` is amortised O(1).
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Per-minute convenience constructor matching the config key.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit as usize, Duration::from_secs(60))
    }

    /// Admit iff fewer than `limit` requests were admitted for `key` within
    /// the trailing window. Admission records the current instant.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let stamps = entries.entry(key.to_string()).or_default();
        while stamps.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            stamps.pop_front();
        }
        if stamps.len() < self.limit {
            stamps.push_back(now);
            true
        } else {
            debug!(key, "request rejected by sliding window");
            false
        }
    }

    /// Current admission count for a key (after expiry pruning).
    pub fn current(&self, key: &str) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let Some(stamps) = entries.get_mut(key) else {
            return 0;
        };
        while stamps.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            stamps.pop_front();
        }
        stamps.len()
    }
}

/// Refillable token pool built on blocking channel semantics: the refill
/// task is the producer, `acquire` the consumer. The channel capacity bounds
/// the token count to [0, capacity] at every observable moment.
pub struct TokenBucket {
    /// tokio Mutex: the receiver is held across the `recv().await` point.
    tokens: tokio::sync::Mutex<mpsc::Receiver<()>>,
    capacity: u32,
}

impl TokenBucket {
    /// Create a bucket with `rate_limit` capacity and spawn the refill loop:
    /// one token every `1 s / rate_limit`, stopping on cancellation. The
    /// bucket starts full.
    pub fn start(rate_limit: u32, cancel: CancellationToken) -> Self {
        let capacity = rate_limit.max(1);
        let (tx, rx) = mpsc::channel::<()>(capacity as usize);
        for _ in 0..capacity {
            let _ = tx.try_send(());
        }

        let refill_every = Duration::from_secs(1) / capacity;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refill_every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // A full bucket simply drops the refill.
                        let _ = tx.try_send(());
                    }
                    _ = cancel.cancelled() => {
                        info!("token bucket refill stopped");
                        break;
                    }
                }
            }
        });

        Self {
            tokens: tokio::sync::Mutex::new(rx),
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Block until a token is available or the context is cancelled.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        // Holding the receiver across the await serialises acquirers, which
        // is exactly the bucket's admission order.
        let mut rx = self.tokens.lock().await;
        tokio::select! {
            token = rx.recv() => match token {
                Some(()) => Ok(()),
                None => Err(ClientError::Cancelled),
            },
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
        }
    }

    /// Non-blocking acquire, for callers that prefer 429 over waiting.
    pub fn try_acquire(&self) -> bool {
        match self.tokens.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_admits_at_most_limit() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        assert_eq!(limiter.current("k"), 3);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn expired_stamps_free_capacity() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(10));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.allow("k"));
    }

    #[tokio::test]
    async fn bucket_starts_full_and_drains_to_empty() {
        let cancel = CancellationToken::new();
        let bucket = TokenBucket::start(3, cancel.clone());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        cancel.cancel();
    }

    #[tokio::test]
    async fn bucket_refills_over_time() {
        let cancel = CancellationToken::new();
        let bucket = TokenBucket::start(10, cancel.clone());
        while bucket.try_acquire() {}
        // 10 tokens/s → one roughly every 100 ms.
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(bucket.try_acquire());
        cancel.cancel();
    }

    #[tokio::test]
    async fn acquire_respects_cancellation() {
        let refill_cancel = CancellationToken::new();
        let bucket = TokenBucket::start(1, refill_cancel.clone());
        while bucket.try_acquire() {}
        refill_cancel.cancel();

        let call_cancel = CancellationToken::new();
        call_cancel.cancel();
        let result = bucket.acquire(&call_cancel).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }
}
