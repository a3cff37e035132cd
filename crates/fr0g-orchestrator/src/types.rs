use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Reactive,
    Adaptive,
    Predictive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Lt,
    Eq,
}

/// A single guard on a strategy. All of a strategy's conditions must pass
/// before its actions run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Compare current system load (0.0–1.0) against a bound.
    SystemLoad { op: Comparison, value: f64 },
    /// A public pattern whose kind label contains the needle.
    PatternDetected { contains: String },
    /// Fires on every evaluation tick.
    TimeBased,
}

/// What a strategy does once its conditions pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyAction {
    ScaleResources {
        target: String,
        cpu_boost: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<i32>,
    },
    TriggerWorkflow {
        target: String,
        #[serde(default)]
        immediate: bool,
    },
    AdjustPriority {
        target: String,
        delta: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub kind: StrategyKind,
    /// Higher runs first within one evaluation tick.
    pub priority: i32,
    pub conditions: Vec<Condition>,
    pub actions: Vec<StrategyAction>,
    pub status: StrategyStatus,
    pub execution_count: u64,
    pub last_executed: Option<DateTime<Utc>>,
}

impl Strategy {
    pub fn new(
        id: &str,
        kind: StrategyKind,
        priority: i32,
        conditions: Vec<Condition>,
        actions: Vec<StrategyAction>,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            priority,
            conditions,
            actions,
            status: StrategyStatus::Active,
            execution_count: 0,
            last_executed: None,
        }
    }
}

/// Request produced by a `TriggerWorkflow` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub target: String,
    pub immediate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Terminal non-success state used when a workflow is cancelled.
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowStep {
    pub fn pending(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            status: StepStatus::Pending,
            duration_ms: 0,
            output: serde_json::Value::Null,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Tuning for the orchestrator's three loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub strategy_interval_secs: u64,
    pub resource_interval_secs: u64,
    pub predictive_interval_secs: u64,
    pub predictive_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy_interval_secs: 30,
            resource_interval_secs: 120,
            predictive_interval_secs: 300,
            predictive_enabled: false,
        }
    }
}
