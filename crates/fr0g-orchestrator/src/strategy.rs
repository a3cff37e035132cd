//! Strategy orchestrator: condition/action strategies evaluated on a fixed
//! tick, plus the resource-optimisation and predictive loops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fr0g_cognitive::PatternRecognizer;

use crate::error::{OrchestratorError, Result};
use crate::resources::ResourcePool;
use crate::types::{
    Comparison, Condition, OrchestratorConfig, Strategy, StrategyAction, StrategyStatus,
    WorkflowTrigger,
};

/// Patterns required before the predictive loop pre-allocates.
const PREDICTIVE_PATTERN_THRESHOLD: usize = 3;

pub struct StrategyOrchestrator {
    config: OrchestratorConfig,
    strategies: RwLock<Vec<Strategy>>,
    pool: RwLock<ResourcePool>,
    recognizer: Arc<PatternRecognizer>,
    /// Current system load in [0, 1], stored as raw f64 bits.
    system_load: AtomicU64,
    /// TriggerWorkflow actions land here; the workflow engine drains it.
    trigger_tx: mpsc::Sender<WorkflowTrigger>,
}

impl StrategyOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        pool: ResourcePool,
        recognizer: Arc<PatternRecognizer>,
    ) -> (Self, mpsc::Receiver<WorkflowTrigger>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(64);
        (
            Self {
                config,
                strategies: RwLock::new(Vec::new()),
                pool: RwLock::new(pool),
                recognizer,
                system_load: AtomicU64::new(0.0f64.to_bits()),
                trigger_tx,
            },
            trigger_rx,
        )
    }

    pub fn add_strategy(&self, strategy: Strategy) {
        info!(strategy_id = %strategy.id, kind = ?strategy.kind, "strategy added");
        self.strategies.write().unwrap().push(strategy);
    }

    pub fn remove_strategy(&self, id: &str) -> Result<()> {
        let mut strategies = self.strategies.write().unwrap();
        let before = strategies.len();
        strategies.retain(|s| s.id != id);
        if strategies.len() == before {
            return Err(OrchestratorError::UnknownStrategy { id: id.to_string() });
        }
        Ok(())
    }

    pub fn strategies(&self) -> Vec<Strategy> {
        self.strategies.read().unwrap().clone()
    }

    pub fn pool_snapshot(&self) -> ResourcePool {
        self.pool.read().unwrap().clone()
    }

    pub fn set_system_load(&self, load: f64) {
        self.system_load
            .store(load.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn system_load(&self) -> f64 {
        f64::from_bits(self.system_load.load(Ordering::Relaxed))
    }

    fn condition_passes(&self, condition: &Condition) -> bool {
        match condition {
            Condition::SystemLoad { op, value } => {
                let load = self.system_load();
                match op {
                    Comparison::Gt => load > *value,
                    Comparison::Lt => load < *value,
                    Comparison::Eq => (load - *value).abs() < f64::EPSILON,
                }
            }
            Condition::PatternDetected { contains } => self
                .recognizer
                .patterns()
                .iter()
                .any(|p| p.kind.to_string().contains(contains.as_str())),
            Condition::TimeBased => true,
        }
    }

    fn execute_action(&self, strategy_id: &str, action: &StrategyAction) {
        match action {
            StrategyAction::ScaleResources { target, cpu_boost, .. } => {
                self.pool.write().unwrap().scale(target, *cpu_boost);
            }
            StrategyAction::TriggerWorkflow { target, immediate } => {
                let trigger = WorkflowTrigger {
                    target: target.clone(),
                    immediate: *immediate,
                };
                if self.trigger_tx.try_send(trigger).is_err() {
                    warn!(strategy_id, target = %target, "trigger queue full, workflow trigger dropped");
                }
            }
            StrategyAction::AdjustPriority { target, delta } => {
                let mut strategies = self.strategies.write().unwrap();
                if let Some(s) = strategies.iter_mut().find(|s| &s.id == target) {
                    s.priority += delta;
                    debug!(target = %target, priority = s.priority, "strategy priority adjusted");
                }
            }
        }
    }

    /// One evaluation pass: highest-priority active strategies first; a
    /// strategy executes only when every condition passes.
    pub fn evaluate(&self) -> usize {
        let mut executable: Vec<(String, Vec<StrategyAction>)> = {
            let strategies = self.strategies.read().unwrap();
            let mut candidates: Vec<&Strategy> = strategies
                .iter()
                .filter(|s| s.status == StrategyStatus::Active)
                .collect();
            candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
            candidates
                .into_iter()
                .filter(|s| s.conditions.iter().all(|c| self.condition_passes(c)))
                .map(|s| (s.id.clone(), s.actions.clone()))
                .collect()
        };

        let executed = executable.len();
        for (id, actions) in executable.drain(..) {
            debug!(strategy_id = %id, actions = actions.len(), "executing strategy");
            for action in &actions {
                self.execute_action(&id, action);
            }
            let mut strategies = self.strategies.write().unwrap();
            if let Some(s) = strategies.iter_mut().find(|s| s.id == id) {
                s.execution_count += 1;
                s.last_executed = Some(Utc::now());
            }
        }
        executed
    }

    /// Drive the evaluation, resource-optimisation, and predictive loops.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            predictive = self.config.predictive_enabled,
            "strategy orchestrator started"
        );
        let secs = std::time::Duration::from_secs;
        let mut evaluation = tokio::time::interval(secs(self.config.strategy_interval_secs));
        let mut optimisation = tokio::time::interval(secs(self.config.resource_interval_secs));
        let mut predictive = tokio::time::interval(secs(self.config.predictive_interval_secs));
        for interval in [&mut evaluation, &mut optimisation, &mut predictive] {
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        }

        loop {
            tokio::select! {
                _ = evaluation.tick() => {
                    self.evaluate();
                }
                _ = optimisation.tick() => {
                    self.pool.write().unwrap().rebalance();
                }
                _ = predictive.tick() => {
                    if self.config.predictive_enabled
                        && self.recognizer.pattern_count() > PREDICTIVE_PATTERN_THRESHOLD
                    {
                        info!("predictive loop pre-allocating for expected load");
                        self.pool.write().unwrap().preallocate_for_load();
                    }
                }
                _ = cancel.cancelled() => {
                    info!("strategy orchestrator stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Allocation;
    use crate::types::StrategyKind;
    use fr0g_cognitive::CognitiveConfig;

    fn orchestrator() -> (StrategyOrchestrator, mpsc::Receiver<WorkflowTrigger>) {
        let mut pool = ResourcePool::new(Allocation {
            cpu: 8.0,
            memory_bytes: 16 << 30,
            bandwidth_bps: 1_000_000_000,
        });
        pool.allocate(
            "cognitive",
            Allocation {
                cpu: 2.0,
                memory_bytes: 4 << 30,
                bandwidth_bps: 100_000_000,
            },
        );
        let recognizer = Arc::new(PatternRecognizer::new(CognitiveConfig::default()));
        StrategyOrchestrator::new(OrchestratorConfig::default(), pool, recognizer)
    }

    #[test]
    fn load_condition_compares_correctly() {
        let (orch, _rx) = orchestrator();
        orch.set_system_load(0.8);
        assert!(orch.condition_passes(&Condition::SystemLoad {
            op: Comparison::Gt,
            value: 0.5
        }));
        assert!(!orch.condition_passes(&Condition::SystemLoad {
            op: Comparison::Lt,
            value: 0.5
        }));
    }

    #[test]
    fn strategy_executes_when_all_conditions_pass() {
        let (orch, _rx) = orchestrator();
        orch.set_system_load(0.95);
        orch.add_strategy(Strategy::new(
            "shed-load",
            StrategyKind::Reactive,
            10,
            vec![
                Condition::SystemLoad {
                    op: Comparison::Gt,
                    value: 0.9,
                },
                Condition::TimeBased,
            ],
            vec![StrategyAction::ScaleResources {
                target: "cognitive".to_string(),
                cpu_boost: 1.5,
                priority: None,
            }],
        ));

        assert_eq!(orch.evaluate(), 1);
        let strategies = orch.strategies();
        assert_eq!(strategies[0].execution_count, 1);
        assert!(strategies[0].last_executed.is_some());
        assert_eq!(orch.pool_snapshot().get("cognitive").unwrap().cpu, 3.0);
    }

    #[test]
    fn failing_condition_blocks_execution() {
        let (orch, _rx) = orchestrator();
        orch.set_system_load(0.1);
        orch.add_strategy(Strategy::new(
            "shed-load",
            StrategyKind::Reactive,
            10,
            vec![Condition::SystemLoad {
                op: Comparison::Gt,
                value: 0.9,
            }],
            vec![],
        ));
        assert_eq!(orch.evaluate(), 0);
        assert_eq!(orch.strategies()[0].execution_count, 0);
    }

    #[test]
    fn trigger_workflow_lands_on_the_queue() {
        let (orch, mut rx) = orchestrator();
        orch.add_strategy(Strategy::new(
            "nightly",
            StrategyKind::Adaptive,
            1,
            vec![Condition::TimeBased],
            vec![StrategyAction::TriggerWorkflow {
                target: "pattern-audit".to_string(),
                immediate: true,
            }],
        ));
        orch.evaluate();
        let trigger = rx.try_recv().unwrap();
        assert_eq!(trigger.target, "pattern-audit");
        assert!(trigger.immediate);
    }

    #[test]
    fn adjust_priority_mutates_target_strategy() {
        let (orch, _rx) = orchestrator();
        orch.add_strategy(Strategy::new(
            "victim",
            StrategyKind::Adaptive,
            5,
            vec![],
            vec![],
        ));
        orch.add_strategy(Strategy::new(
            "adjuster",
            StrategyKind::Adaptive,
            1,
            vec![Condition::TimeBased],
            vec![StrategyAction::AdjustPriority {
                target: "victim".to_string(),
                delta: -3,
            }],
        ));
        orch.evaluate();
        let victim = orch
            .strategies()
            .into_iter()
            .find(|s| s.id == "victim")
            .unwrap();
        assert_eq!(victim.priority, 2);
    }

    #[test]
    fn removing_unknown_strategy_errors() {
        let (orch, _rx) = orchestrator();
        assert!(matches!(
            orch.remove_strategy("nope"),
            Err(OrchestratorError::UnknownStrategy { .. })
        ));
    }
}
