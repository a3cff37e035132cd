use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which container an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
    Episodic,
    Semantic,
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortTerm => write!(f, "short_term"),
            Self::LongTerm => write!(f, "long_term"),
            Self::Episodic => write!(f, "episodic"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// Single stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: Value,
    pub kind: MemoryKind,
    /// 0.0–1.0, drives capacity eviction (least important goes first).
    pub importance: f64,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    /// Absent means the entry never expires.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl MemoryEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Capacity and TTL knobs for the four containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Seconds a short-term entry survives without promotion.
    pub short_term_ttl: u64,
    /// Seconds a long-term entry survives. Zero disables expiry.
    pub long_term_ttl: u64,
    pub max_short_term_entries: usize,
    pub max_long_term_entries: usize,
    pub max_episodic_memories: usize,
    pub max_semantic_concepts: usize,
    /// Seconds between expired-entry sweeps.
    pub cleanup_interval: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_ttl: 3_600,
            long_term_ttl: 0,
            max_short_term_entries: 1_000,
            max_long_term_entries: 10_000,
            max_episodic_memories: 500,
            max_semantic_concepts: 1_000,
            cleanup_interval: 900,
        }
    }
}

/// Read-only container sizes, reported by `/status` and used by tests.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStats {
    pub short_term: usize,
    pub long_term: usize,
    pub episodic: usize,
    pub semantic: usize,
}
