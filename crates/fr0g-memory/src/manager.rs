use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MemoryError, Result};
use crate::types::{MemoryConfig, MemoryEntry, MemoryKind, MemoryStats};

/// Four bounded in-memory stores with TTL, promotion, and periodic cleanup.
///
/// Short-term and long-term are key→entry maps; episodic is an ordered
/// sequence; semantic is a concept→entry map. Each container sits behind one
/// RwLock and never exceeds its configured maximum after a store completes.
pub struct MemoryManager {
    config: MemoryConfig,
    short_term: RwLock<HashMap<String, MemoryEntry>>,
    long_term: RwLock<HashMap<String, MemoryEntry>>,
    episodic: RwLock<Vec<MemoryEntry>>,
    semantic: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            short_term: RwLock::new(HashMap::new()),
            long_term: RwLock::new(HashMap::new()),
            episodic: RwLock::new(Vec::new()),
            semantic: RwLock::new(HashMap::new()),
        }
    }

    /// Store into short-term with the configured TTL.
    pub fn store(&self, key: &str, value: Value) {
        self.store_with_type(key, value, MemoryKind::ShortTerm);
    }

    /// Store into the container selected by `kind`.
    pub fn store_with_type(&self, key: &str, value: Value, kind: MemoryKind) {
        let importance = self.importance(&value);
        let entry = self.build_entry(key, value, kind, importance);
        match kind {
            MemoryKind::ShortTerm => {
                let mut map = self.short_term.write().unwrap();
                map.insert(key.to_string(), entry);
                evict_least_important(&mut map, self.config.max_short_term_entries);
            }
            MemoryKind::LongTerm => {
                let mut map = self.long_term.write().unwrap();
                map.insert(key.to_string(), entry);
                evict_least_important(&mut map, self.config.max_long_term_entries);
            }
            MemoryKind::Episodic => self.store_episode_entry(entry),
            MemoryKind::Semantic => self.store_concept_entry(key, entry),
        }
    }

    /// Look up a key: short-term first, then long-term.
    ///
    /// Bumps `access_count` and `last_access`. An expired entry is removed on
    /// read and reported as not found.
    pub fn retrieve(&self, key: &str) -> Result<Value> {
        let now = Utc::now();
        for store in [&self.short_term, &self.long_term] {
            let mut map = store.write().unwrap();
            if let Some(entry) = map.get_mut(key) {
                if entry.is_expired(now) {
                    map.remove(key);
                    debug!(key, "expired entry removed on read");
                    return Err(MemoryError::Expired {
                        key: key.to_string(),
                    });
                }
                entry.access_count += 1;
                entry.last_access = now;
                return Ok(entry.value.clone());
            }
        }
        Err(MemoryError::NotFound {
            key: key.to_string(),
        })
    }

    /// Move a short-term entry into long-term.
    ///
    /// When `long_term_ttl` is configured the expiry is refreshed; otherwise
    /// the promoted entry never expires.
    pub fn promote_to_long_term(&self, key: &str) -> Result<()> {
        let mut entry = {
            let mut short = self.short_term.write().unwrap();
            short.remove(key).ok_or_else(|| MemoryError::NotFound {
                key: key.to_string(),
            })?
        };

        entry.kind = MemoryKind::LongTerm;
        entry.expires_at = if self.config.long_term_ttl > 0 {
            Some(Utc::now() + Duration::seconds(self.config.long_term_ttl as i64))
        } else {
            None
        };

        let mut long = self.long_term.write().unwrap();
        long.insert(key.to_string(), entry);
        evict_least_important(&mut long, self.config.max_long_term_entries);
        debug!(key, "promoted to long-term");
        Ok(())
    }

    /// Append an episode; the least-important entry is dropped on overflow.
    pub fn store_episode(&self, key: &str, value: Value) {
        let importance = self.importance(&value);
        let entry = self.build_entry(key, value, MemoryKind::Episodic, importance);
        self.store_episode_entry(entry);
    }

    /// Upsert a concept; the least-confident concept is evicted on overflow.
    pub fn store_concept(&self, concept: &str, value: Value) {
        let importance = self.importance(&value);
        let entry = self.build_entry(concept, value, MemoryKind::Semantic, importance);
        self.store_concept_entry(concept, entry);
    }

    pub fn get_concept(&self, concept: &str) -> Option<Value> {
        let map = self.semantic.read().unwrap();
        map.get(concept).map(|e| e.value.clone())
    }

    pub fn recent_episodes(&self, limit: usize) -> Vec<MemoryEntry> {
        let episodes = self.episodic.read().unwrap();
        episodes.iter().rev().take(limit).cloned().collect()
    }

    /// Drop every entry whose expiry has passed. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut removed = 0;

        for store in [&self.short_term, &self.long_term, &self.semantic] {
            let mut map = store.write().unwrap();
            let before = map.len();
            map.retain(|_, e| !e.is_expired(now));
            removed += before - map.len();
        }
        {
            let mut episodes = self.episodic.write().unwrap();
            let before = episodes.len();
            episodes.retain(|e| !e.is_expired(now));
            removed += before - episodes.len();
        }

        if removed > 0 {
            debug!(removed, "memory cleanup swept expired entries");
        }
        removed
    }

    /// Cleanup loop. Sweeps every `cleanup_interval` until `shutdown`
    /// broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.cleanup_interval,
            "memory cleanup loop started"
        );
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.cleanup_interval));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.cleanup();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("memory cleanup loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Default importance: proportional to serialized size, capped at 1.0.
    pub fn importance(&self, value: &Value) -> f64 {
        let len = serde_json::to_string(value).map(|s| s.len()).unwrap_or(0);
        (len as f64 / 1000.0).min(1.0)
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            short_term: self.short_term.read().unwrap().len(),
            long_term: self.long_term.read().unwrap().len(),
            episodic: self.episodic.read().unwrap().len(),
            semantic: self.semantic.read().unwrap().len(),
        }
    }

    // --- private helpers ---------------------------------------------------

    fn build_entry(
        &self,
        key: &str,
        value: Value,
        kind: MemoryKind,
        importance: f64,
    ) -> MemoryEntry {
        let now = Utc::now();
        let expires_at = self.ttl_for(kind, now);
        MemoryEntry {
            key: key.to_string(),
            value,
            kind,
            importance,
            access_count: 0,
            created_at: now,
            last_access: now,
            expires_at,
            metadata: serde_json::Map::new(),
        }
    }

    fn ttl_for(&self, kind: MemoryKind, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = match kind {
            MemoryKind::ShortTerm => self.config.short_term_ttl,
            MemoryKind::LongTerm => self.config.long_term_ttl,
            // Episodic and semantic entries live until evicted by capacity.
            MemoryKind::Episodic | MemoryKind::Semantic => 0,
        };
        (secs > 0).then(|| now + Duration::seconds(secs as i64))
    }

    fn store_episode_entry(&self, entry: MemoryEntry) {
        let mut episodes = self.episodic.write().unwrap();
        episodes.push(entry);
        while episodes.len() > self.config.max_episodic_memories {
            // Drop the least-important episode; ties fall to the oldest.
            let victim = episodes
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| {
                    a.importance
                        .partial_cmp(&b.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(ia.cmp(ib))
                })
                .map(|(i, _)| i);
            match victim {
                Some(i) => {
                    episodes.remove(i);
                }
                None => break,
            }
        }
    }

    fn store_concept_entry(&self, concept: &str, entry: MemoryEntry) {
        let mut map = self.semantic.write().unwrap();
        map.insert(concept.to_string(), entry);
        evict_least_important(&mut map, self.config.max_semantic_concepts);
    }
}

/// Shrink a map to `max` entries by removing the least-important ones.
fn evict_least_important(map: &mut HashMap<String, MemoryEntry>, max: usize) {
    while map.len() > max {
        let victim = map
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.created_at.cmp(&b.created_at))
            })
            .map(|(k, _)| k.clone());
        match victim {
            Some(k) => {
                map.remove(&k);
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> MemoryManager {
        MemoryManager::new(MemoryConfig::default())
    }

    #[test]
    fn store_then_retrieve_round_trips() {
        let m = manager();
        m.store("greeting", json!("hello"));
        assert_eq!(m.retrieve("greeting").unwrap(), json!("hello"));
    }

    #[test]
    fn retrieve_checks_long_term_after_short() {
        let m = manager();
        m.store_with_type("fact", json!(42), MemoryKind::LongTerm);
        assert_eq!(m.retrieve("fact").unwrap(), json!(42));
    }

    #[test]
    fn missing_key_is_not_found() {
        let m = manager();
        assert!(matches!(
            m.retrieve("nope"),
            Err(MemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let m = MemoryManager::new(MemoryConfig {
            short_term_ttl: 1,
            ..MemoryConfig::default()
        });
        m.store("ephemeral", json!(1));
        // Force the entry into the past instead of sleeping.
        {
            let mut map = m.short_term.write().unwrap();
            map.get_mut("ephemeral").unwrap().expires_at =
                Some(Utc::now() - Duration::seconds(1));
        }
        assert!(matches!(
            m.retrieve("ephemeral"),
            Err(MemoryError::Expired { .. })
        ));
        assert_eq!(m.stats().short_term, 0);
    }

    #[test]
    fn promotion_clears_expiry_when_long_ttl_is_zero() {
        let m = manager();
        m.store("keep", json!("v"));
        m.promote_to_long_term("keep").unwrap();
        let long = m.long_term.read().unwrap();
        let entry = long.get("keep").unwrap();
        assert_eq!(entry.kind, MemoryKind::LongTerm);
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn promotion_refreshes_expiry_when_long_ttl_set() {
        let m = MemoryManager::new(MemoryConfig {
            long_term_ttl: 60,
            ..MemoryConfig::default()
        });
        m.store("keep", json!("v"));
        m.promote_to_long_term("keep").unwrap();
        let long = m.long_term.read().unwrap();
        assert!(long.get("keep").unwrap().expires_at.is_some());
    }

    #[test]
    fn containers_never_exceed_their_maxima() {
        let m = MemoryManager::new(MemoryConfig {
            max_short_term_entries: 5,
            max_episodic_memories: 3,
            max_semantic_concepts: 2,
            ..MemoryConfig::default()
        });
        for i in 0..20 {
            m.store(&format!("k{i}"), json!(i));
            m.store_episode(&format!("e{i}"), json!(i));
            m.store_concept(&format!("c{i}"), json!(i));
            let stats = m.stats();
            assert!(stats.short_term <= 5);
            assert!(stats.episodic <= 3);
            assert!(stats.semantic <= 2);
        }
    }

    #[test]
    fn cleanup_drops_expired_entries() {
        let m = manager();
        m.store("a", json!(1));
        m.store("b", json!(2));
        {
            let mut map = m.short_term.write().unwrap();
            map.get_mut("a").unwrap().expires_at = Some(Utc::now() - Duration::seconds(5));
        }
        assert_eq!(m.cleanup(), 1);
        assert_eq!(m.stats().short_term, 1);
    }

    #[test]
    fn importance_scales_with_size() {
        let m = manager();
        let small = m.importance(&json!("x"));
        let large = m.importance(&json!("y".repeat(2000)));
        assert!(small < large);
        assert_eq!(large, 1.0);
    }

    #[test]
    fn access_count_increments_on_retrieve() {
        let m = manager();
        m.store("hot", json!(1));
        m.retrieve("hot").unwrap();
        m.retrieve("hot").unwrap();
        let map = m.short_term.read().unwrap();
        assert_eq!(map.get("hot").unwrap().access_count, 2);
    }
}
