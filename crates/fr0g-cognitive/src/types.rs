use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tuple fed to adaptive learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub input: serde_json::Map<String, Value>,
    #[serde(default)]
    pub output: serde_json::Map<String, Value>,
    /// −1.0 … +1.0, clamped at construction.
    pub feedback: f64,
    /// 0.0 … 1.0, clamped at construction.
    pub importance: f64,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

impl Experience {
    pub fn new(kind: &str, feedback: f64, importance: f64, context: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            input: serde_json::Map::new(),
            output: serde_json::Map::new(),
            feedback: feedback.clamp(-1.0, 1.0),
            importance: importance.clamp(0.0, 1.0),
            context: context.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Shape of a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Frequency,
    Sequence,
    Anomaly,
    Trend,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frequency => write!(f, "frequency"),
            Self::Sequence => write!(f, "sequence"),
            Self::Anomaly => write!(f, "anomaly"),
            Self::Trend => write!(f, "trend"),
        }
    }
}

/// A recurring or statistically significant shape in a data stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable identity: same stream + kind + descriptor always yields the
    /// same id, so re-detection refreshes instead of duplicating.
    pub id: String,
    pub kind: PatternKind,
    pub description: String,
    /// Always ≥ the configured confidence threshold while public.
    pub confidence: f64,
    pub frequency_count: u64,
    pub context: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Impact band of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightImpact {
    Low,
    Medium,
    High,
}

/// A conclusion the engine derived from its own state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub confidence: f64,
    pub impact: InsightImpact,
    /// One of: system_health, resource_optimization, consciousness,
    /// emergent_behavior.
    pub category: String,
    pub actionable: bool,
    pub created_at: DateTime<Utc>,
}

/// A self-referential observation, with recursion depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of what the system knows about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAwareness {
    pub current_state: String,
    /// Ring of at most 100 previous states.
    pub state_history: Vec<String>,
    /// Component name → current condition.
    pub component_map: std::collections::HashMap<String, String>,
    /// Adjacency list of component interactions.
    pub interaction_graph: std::collections::HashMap<String, Vec<String>>,
    pub last_update: DateTime<Utc>,
    /// 0.0 … 1.0.
    pub awareness_level: f64,
}

impl Default for SystemAwareness {
    fn default() -> Self {
        Self {
            current_state: "initializing".to_string(),
            state_history: Vec::new(),
            component_map: std::collections::HashMap::new(),
            interaction_graph: std::collections::HashMap::new(),
            last_update: Utc::now(),
            awareness_level: 0.5,
        }
    }
}

/// Read-only intelligence snapshot exposed by `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceMetrics {
    /// 0.01 … 0.5.
    pub learning_rate: f64,
    pub pattern_count: usize,
    /// 0.0 … 1.0.
    pub adaptation_score: f64,
    /// 0.0 … 1.0.
    pub efficiency_index: f64,
    pub emergent_capabilities: u32,
}

/// Tuning for the recognizer and cognitive engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveConfig {
    /// Patterns below this confidence are never published.
    pub pattern_confidence_threshold: f64,
    pub max_patterns: usize,
    pub max_reflections: usize,
    pub max_insights: usize,
    /// Data points kept per stream for recognition.
    pub window_size: usize,
    pub awareness_interval_secs: u64,
    pub recognition_interval_secs: u64,
    pub insight_interval_secs: u64,
    pub learning_interval_secs: u64,
    pub metrics_interval_secs: u64,
}

impl Default for CognitiveConfig {
    fn default() -> Self {
        Self {
            pattern_confidence_threshold: 0.7,
            max_patterns: 100,
            max_reflections: 100,
            max_insights: 200,
            window_size: 100,
            awareness_interval_secs: 30,
            recognition_interval_secs: 30,
            insight_interval_secs: 60,
            learning_interval_secs: 15,
            metrics_interval_secs: 20,
        }
    }
}
