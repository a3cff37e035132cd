//! Bounded-concurrency workflow engine.
//!
//! Every input event gets one dedicated workflow with four standard steps:
//! content_analysis → threat_assessment → response_generation →
//! learning_integration. The community verdict is fused with the channel's
//! first-pass analysis by taking the maximum score.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::{mpsc, OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fr0g_cognitive::{AdaptiveLearner, Experience, PatternRecognizer};
use fr0g_community::CommunityClient;
use fr0g_core::types::{
    CommandKind, InputEvent, InputEventResponse, Metadata, OutputCommand, ThreatAnalysisResult,
    ThreatLevel,
};

use crate::error::{OrchestratorError, Result};
use crate::types::{
    StepStatus, Workflow, WorkflowStatus, WorkflowStep, WorkflowTrigger,
};

/// Fused score above which a critical alert is emitted.
const ALERT_THRESHOLD: f64 = 0.7;
/// Fused score above which the event is logged for follow-up.
const LOG_THRESHOLD: f64 = 0.3;
/// Personas invited into the standing review community.
const REVIEW_PANEL_SIZE: usize = 5;

const STEP_CONTENT_ANALYSIS: &str = "content_analysis";
const STEP_THREAT_ASSESSMENT: &str = "threat_assessment";
const STEP_RESPONSE_GENERATION: &str = "response_generation";
const STEP_LEARNING_INTEGRATION: &str = "learning_integration";

/// Where finished analyses and commands go. The gateway implements this over
/// the duplex stream's server side; tests use [`NullDispatcher`].
#[async_trait]
pub trait OutboundDispatcher: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn dispatch_analysis(&self, analysis: &ThreatAnalysisResult);
    async fn dispatch_command(&self, command: &OutputCommand);
}

/// Dispatcher for disconnected operation: drops everything.
pub struct NullDispatcher;

#[async_trait]
impl OutboundDispatcher for NullDispatcher {
    fn is_connected(&self) -> bool {
        false
    }
    async fn dispatch_analysis(&self, _analysis: &ThreatAnalysisResult) {}
    async fn dispatch_command(&self, _command: &OutputCommand) {}
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub max_concurrent: usize,
    pub timeout: Duration,
    /// Target of critical alert commands.
    pub security_sink: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            timeout: Duration::from_secs(30 * 60),
            security_sink: "security".to_string(),
        }
    }
}

pub struct WorkflowEngine {
    config: WorkflowConfig,
    permits: Arc<Semaphore>,
    active: Arc<DashMap<String, Workflow>>,
    completed: AtomicU64,
    community: Arc<dyn CommunityClient>,
    community_id: OnceCell<String>,
    learner: Arc<AdaptiveLearner>,
    recognizer: Arc<PatternRecognizer>,
    dispatcher: Arc<dyn OutboundDispatcher>,
}

impl WorkflowEngine {
    pub fn new(
        config: WorkflowConfig,
        community: Arc<dyn CommunityClient>,
        learner: Arc<AdaptiveLearner>,
        recognizer: Arc<PatternRecognizer>,
        dispatcher: Arc<dyn OutboundDispatcher>,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            active: Arc::new(DashMap::new()),
            completed: AtomicU64::new(0),
            community,
            community_id: OnceCell::new(),
            learner,
            recognizer,
            dispatcher,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn get(&self, workflow_id: &str) -> Option<Workflow> {
        self.active.get(workflow_id).map(|w| w.clone())
    }

    /// Process one input event end to end.
    ///
    /// Blocks while the engine is at `max_concurrent` (that pause is the
    /// backpressure the stream layer surfaces to the I/O tier). Returns a
    /// cancellation error, without dispatching, when `cancel` fires first.
    pub async fn process_input_event(
        &self,
        event: &InputEvent,
        channel_analysis: Option<&ThreatAnalysisResult>,
        cancel: &CancellationToken,
    ) -> Result<InputEventResponse> {
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| OrchestratorError::Cancelled)?
            }
        };

        let mut workflow = Workflow {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("event:{}", event.kind),
            steps: vec![
                WorkflowStep::pending(STEP_CONTENT_ANALYSIS),
                WorkflowStep::pending(STEP_THREAT_ASSESSMENT),
                WorkflowStep::pending(STEP_RESPONSE_GENERATION),
                WorkflowStep::pending(STEP_LEARNING_INTEGRATION),
            ],
            status: WorkflowStatus::Running,
            created_at: Utc::now(),
            event_id: Some(event.id.clone()),
        };
        self.active.insert(workflow.id.clone(), workflow.clone());
        debug!(workflow_id = %workflow.id, event_id = %event.id, "workflow started");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                fail_open_steps(&mut workflow, StepStatus::Cancelled, "cancelled");
                workflow.status = WorkflowStatus::Cancelled;
                self.finish(workflow);
                drop(permit);
                return Err(OrchestratorError::Cancelled);
            }
            result = tokio::time::timeout(
                self.config.timeout,
                self.run_steps(&mut workflow, event, channel_analysis),
            ) => result,
        };

        let response = match outcome {
            Ok(response) => response,
            Err(_elapsed) => {
                fail_open_steps(&mut workflow, StepStatus::Failed, "timeout");
                workflow.status = WorkflowStatus::Failed;
                warn!(workflow_id = %workflow.id, "workflow timed out");
                let mut metadata = Metadata::new();
                metadata.insert("error".to_string(), json!("timeout"));
                InputEventResponse {
                    event_id: event.id.clone(),
                    processed: false,
                    actions: Vec::new(),
                    analysis: None,
                    metadata,
                    processed_at: Utc::now(),
                }
            }
        };

        self.finish(workflow);
        drop(permit);
        Ok(response)
    }

    /// Drain strategy-originated workflow triggers until cancelled.
    pub async fn run_triggers(
        &self,
        mut triggers: mpsc::Receiver<WorkflowTrigger>,
        cancel: CancellationToken,
    ) {
        info!("workflow trigger loop started");
        loop {
            tokio::select! {
                trigger = triggers.recv() => {
                    let Some(trigger) = trigger else { break };
                    self.run_triggered(&trigger).await;
                }
                _ = cancel.cancelled() => {
                    info!("workflow trigger loop stopped");
                    break;
                }
            }
        }
    }

    /// Run a named maintenance workflow requested by a strategy. Skipped
    /// (with a log line) when the engine is at capacity and the trigger is
    /// not immediate.
    async fn run_triggered(&self, trigger: &WorkflowTrigger) {
        let permit = if trigger.immediate {
            match self.permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            }
        } else {
            match self.permits.clone().try_acquire_owned() {
                Ok(p) => p,
                Err(_) => {
                    warn!(target = %trigger.target, "engine at capacity, trigger skipped");
                    return;
                }
            }
        };

        let started = std::time::Instant::now();
        let mut workflow = Workflow {
            id: uuid::Uuid::new_v4().to_string(),
            name: trigger.target.clone(),
            steps: vec![WorkflowStep::pending(&trigger.target)],
            status: WorkflowStatus::Running,
            created_at: Utc::now(),
            event_id: None,
        };
        self.active.insert(workflow.id.clone(), workflow.clone());

        // Named workflows fold current recognizer state back into the
        // learning loop; they carry no event payload.
        let patterns = self.recognizer.pattern_count();
        self.learner.add_experience(Experience::new(
            &trigger.target,
            0.0,
            (patterns as f64 / 10.0).min(1.0),
            "strategy-triggered workflow",
        ));

        workflow.steps[0].status = StepStatus::Completed;
        workflow.steps[0].duration_ms = started.elapsed().as_millis() as u64;
        workflow.steps[0].output = json!({ "patterns": patterns });
        workflow.status = WorkflowStatus::Completed;
        info!(workflow = %trigger.target, "triggered workflow completed");
        self.finish(workflow);
        drop(permit);
    }

    async fn run_steps(
        &self,
        workflow: &mut Workflow,
        event: &InputEvent,
        channel_analysis: Option<&ThreatAnalysisResult>,
    ) -> InputEventResponse {
        // Step 1: content analysis: feed the recognizer's event streams.
        let step_started = std::time::Instant::now();
        workflow.steps[0].status = StepStatus::Running;
        let stream = format!("events.{}", event.kind);
        self.recognizer.add_data_point(
            &stream,
            &event.kind.to_string(),
            json!(event.content.len() as f64),
            &event.metadata,
        );
        self.recognizer.add_data_point(
            "channel_activity",
            &event.kind.to_string(),
            json!(event.kind.to_string()),
            &event.metadata,
        );
        workflow.steps[0].status = StepStatus::Completed;
        workflow.steps[0].duration_ms = step_started.elapsed().as_millis() as u64;
        workflow.steps[0].output = json!({ "content_chars": event.content.len() });
        self.active.insert(workflow.id.clone(), workflow.clone());

        // Step 2: community threat assessment.
        let step_started = std::time::Instant::now();
        workflow.steps[1].status = StepStatus::Running;
        let community_verdict = self.review_content(&event.content).await;
        let community_score = match &community_verdict {
            Ok(review) => {
                workflow.steps[1].status = StepStatus::Completed;
                workflow.steps[1].output = json!({
                    "overall_score": review.consensus.overall_score,
                    "agreement": review.consensus.agreement,
                    "recommendation": review.consensus.recommendation,
                });
                Some(review.consensus.overall_score)
            }
            Err(e) => {
                // Degrade to the channel-local verdict; the step records the
                // failure and the workflow terminates as Failed.
                warn!(workflow_id = %workflow.id, error = %e, "community review failed");
                workflow.steps[1].status = StepStatus::Failed;
                workflow.steps[1].error = Some(e.to_string());
                None
            }
        };
        workflow.steps[1].duration_ms = step_started.elapsed().as_millis() as u64;
        self.active.insert(workflow.id.clone(), workflow.clone());

        let channel_score = channel_analysis.map(|a| a.threat_score).unwrap_or(0.0);
        let fused_score = community_score.unwrap_or(0.0).max(channel_score);

        // Step 3: response generation.
        let step_started = std::time::Instant::now();
        workflow.steps[2].status = StepStatus::Running;
        let mut actions = Vec::new();
        if fused_score > ALERT_THRESHOLD {
            actions.push(
                OutputCommand::for_event(
                    &event.id,
                    CommandKind::Alert,
                    self.config.security_sink.clone(),
                    format!(
                        "critical threat from {} on {} (score {fused_score:.2})",
                        event.source, event.kind
                    ),
                )
                .with_priority(10),
            );
        }
        if fused_score > LOG_THRESHOLD {
            actions.push(OutputCommand::for_event(
                &event.id,
                CommandKind::Log,
                "mcp-audit".to_string(),
                format!("event {} scored {fused_score:.2}", event.id),
            ));
        }
        // Acknowledgement always goes back to the source on its own channel.
        actions.push(OutputCommand::for_event(
            &event.id,
            CommandKind::from(event.kind),
            event.source.clone(),
            format!("event {} processed", event.id),
        ));
        workflow.steps[2].status = StepStatus::Completed;
        workflow.steps[2].duration_ms = step_started.elapsed().as_millis() as u64;
        workflow.steps[2].output = json!({ "actions": actions.len() });

        // Step 4: learning integration: agreement between the channel's
        // first pass and the community verdict is the feedback signal.
        let step_started = std::time::Instant::now();
        workflow.steps[3].status = StepStatus::Running;
        let feedback = match community_score {
            Some(community) => 1.0 - 2.0 * (community - channel_score).abs(),
            None => 0.0,
        };
        let mut experience = Experience::new(
            "event_review",
            feedback,
            fused_score,
            &format!("workflow for {} event", event.kind),
        );
        experience
            .input
            .insert("channel_score".to_string(), json!(channel_score));
        experience
            .input
            .insert("community_score".to_string(), json!(community_score));
        experience
            .output
            .insert("actions".to_string(), json!(actions.len()));
        self.learner.add_experience(experience);
        workflow.steps[3].status = StepStatus::Completed;
        workflow.steps[3].duration_ms = step_started.elapsed().as_millis() as u64;

        workflow.status = if workflow.steps.iter().any(|s| s.status == StepStatus::Failed) {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };

        let analysis = fuse_analysis(event, channel_analysis, fused_score, &community_verdict);

        // Dispatch back to the I/O tier; commands go out asynchronously.
        if self.dispatcher.is_connected() {
            self.dispatcher.dispatch_analysis(&analysis).await;
            for action in &actions {
                let dispatcher = self.dispatcher.clone();
                let command = action.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch_command(&command).await;
                });
            }
        }

        let mut metadata = Metadata::new();
        if let Ok(value) = serde_json::to_value(&analysis) {
            metadata.insert("threat_analysis".to_string(), value);
        }
        metadata.insert("workflow_id".to_string(), json!(workflow.id));

        InputEventResponse {
            event_id: event.id.clone(),
            processed: true,
            actions,
            analysis: Some(analysis),
            metadata,
            processed_at: Utc::now(),
        }
    }

    /// Lazily create the standing review community, then submit.
    async fn review_content(
        &self,
        content: &str,
    ) -> std::result::Result<fr0g_community::CommunityReview, fr0g_community::CommunityError> {
        let community_id = self
            .community_id
            .get_or_try_init(|| async {
                self.community
                    .create_community("inbound threat review", REVIEW_PANEL_SIZE)
                    .await
                    .map(|c| c.id)
            })
            .await?;
        self.community.submit_for_review(community_id, content).await
    }

    fn finish(&self, workflow: Workflow) {
        debug!(workflow_id = %workflow.id, status = ?workflow.status, "workflow finished");
        self.active.remove(&workflow.id);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Mark all non-terminal steps with the given terminal status.
fn fail_open_steps(workflow: &mut Workflow, status: StepStatus, error: &str) {
    for step in &mut workflow.steps {
        if !step.status.is_terminal() {
            step.status = status;
            step.error = Some(error.to_string());
        }
    }
}

/// Combine the channel's first pass with the fused score into one result.
fn fuse_analysis(
    event: &InputEvent,
    channel_analysis: Option<&ThreatAnalysisResult>,
    fused_score: f64,
    community_verdict: &std::result::Result<
        fr0g_community::CommunityReview,
        fr0g_community::CommunityError,
    >,
) -> ThreatAnalysisResult {
    let mut analysis = channel_analysis
        .cloned()
        .unwrap_or_else(|| ThreatAnalysisResult::clean(&event.id));
    analysis.event_id = event.id.clone();
    analysis.threat_score = fused_score;
    analysis.confidence = analysis.confidence.max(fused_score);
    analysis.threat_level = analysis.threat_level.max(level_for(fused_score));
    if let Ok(review) = community_verdict {
        analysis
            .recommended_actions
            .push(review.consensus.recommendation.clone());
    }
    analysis
}

fn level_for(score: f64) -> ThreatLevel {
    if score >= 0.8 {
        ThreatLevel::Critical
    } else if score >= 0.6 {
        ThreatLevel::High
    } else if score >= 0.4 {
        ThreatLevel::Medium
    } else if score >= 0.2 {
        ThreatLevel::Low
    } else {
        ThreatLevel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fr0g_cognitive::CognitiveConfig;
    use fr0g_community::MockCommunityClient;
    use fr0g_core::types::ChannelKind;

    fn engine_with(config: WorkflowConfig, community: Arc<dyn CommunityClient>) -> WorkflowEngine {
        WorkflowEngine::new(
            config,
            community,
            Arc::new(AdaptiveLearner::new(0.1)),
            Arc::new(PatternRecognizer::new(CognitiveConfig::default())),
            Arc::new(NullDispatcher),
        )
    }

    fn engine() -> WorkflowEngine {
        engine_with(WorkflowConfig::default(), Arc::new(MockCommunityClient::new()))
    }

    #[tokio::test]
    async fn hostile_event_yields_alert_log_and_ack() {
        let engine = engine();
        let event = InputEvent::new(
            ChannelKind::Sms,
            "+1555",
            "URGENT winner! click to verify your free prize",
        );
        let response = engine
            .process_input_event(&event, None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.processed);
        assert_eq!(response.event_id, event.id);
        let kinds: Vec<CommandKind> = response.actions.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&CommandKind::Alert));
        assert!(kinds.contains(&CommandKind::Log));
        assert!(kinds.contains(&CommandKind::Sms));
        for action in &response.actions {
            assert_eq!(
                action.metadata.get("event_id").and_then(|v| v.as_str()),
                Some(event.id.as_str())
            );
        }
    }

    #[tokio::test]
    async fn benign_event_gets_only_the_ack() {
        let engine = engine();
        let event = InputEvent::new(ChannelKind::Irc, "alice", "lunch at noon?");
        let response = engine
            .process_input_event(&event, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.actions.len(), 1);
        assert_eq!(response.actions[0].kind, CommandKind::Irc);
        assert_eq!(response.actions[0].target, "alice");
    }

    #[tokio::test]
    async fn fused_score_takes_the_maximum() {
        let engine = engine();
        // Benign content for the community, hostile channel verdict.
        let event = InputEvent::new(ChannelKind::Email, "x@example.org", "hello there");
        let mut channel = ThreatAnalysisResult::clean(&event.id);
        channel.threat_score = 0.9;
        channel.threat_level = ThreatLevel::Critical;

        let response = engine
            .process_input_event(&event, Some(&channel), &CancellationToken::new())
            .await
            .unwrap();
        let analysis = response.analysis.unwrap();
        assert!(analysis.threat_score >= 0.9);
        assert_eq!(analysis.threat_level, ThreatLevel::Critical);
        assert!(response
            .actions
            .iter()
            .any(|a| a.kind == CommandKind::Alert));
    }

    #[tokio::test]
    async fn workflow_completes_all_four_steps() {
        let engine = engine();
        let event = InputEvent::new(ChannelKind::Discord, "user", "hello");
        let response = engine
            .process_input_event(&event, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.metadata.contains_key("workflow_id"));
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.completed_count(), 1);
        assert_eq!(engine.learner.experience_count(), 1);
    }

    /// Community client that parks until told to finish.
    struct SlowCommunity {
        inner: MockCommunityClient,
        delay: Duration,
    }

    #[async_trait]
    impl CommunityClient for SlowCommunity {
        async fn create_community(
            &self,
            topic: &str,
            persona_count: usize,
        ) -> std::result::Result<fr0g_community::Community, fr0g_community::CommunityError>
        {
            self.inner.create_community(topic, persona_count).await
        }

        async fn submit_for_review(
            &self,
            community_id: &str,
            content: &str,
        ) -> std::result::Result<fr0g_community::CommunityReview, fr0g_community::CommunityError>
        {
            tokio::time::sleep(self.delay).await;
            self.inner.submit_for_review(community_id, content).await
        }

        async fn get_review_status(
            &self,
            review_id: &str,
        ) -> std::result::Result<fr0g_community::ReviewStatus, fr0g_community::CommunityError>
        {
            self.inner.get_review_status(review_id).await
        }

        async fn get_community_members(
            &self,
            community_id: &str,
        ) -> std::result::Result<
            Vec<fr0g_community::types::PersonaSummary>,
            fr0g_community::CommunityError,
        > {
            self.inner.get_community_members(community_id).await
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_cap() {
        let config = WorkflowConfig {
            max_concurrent: 2,
            ..WorkflowConfig::default()
        };
        let engine = Arc::new(engine_with(
            config,
            Arc::new(SlowCommunity {
                inner: MockCommunityClient::new(),
                delay: Duration::from_millis(100),
            }),
        ));

        let mut handles = Vec::new();
        for i in 0..6 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let event =
                    InputEvent::new(ChannelKind::Sms, format!("+155{i}"), "hello".to_string());
                engine
                    .process_input_event(&event, None, &CancellationToken::new())
                    .await
                    .unwrap();
            }));
        }

        // Sample the active count while the batch runs.
        for _ in 0..20 {
            assert!(engine.active_count() <= 2);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(engine.completed_count(), 6);
    }

    #[tokio::test]
    async fn timeout_marks_open_steps() {
        let config = WorkflowConfig {
            timeout: Duration::from_millis(20),
            ..WorkflowConfig::default()
        };
        let engine = engine_with(
            config,
            Arc::new(SlowCommunity {
                inner: MockCommunityClient::new(),
                delay: Duration::from_secs(5),
            }),
        );
        let event = InputEvent::new(ChannelKind::Sms, "+1555", "hello");
        let response = engine
            .process_input_event(&event, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!response.processed);
        assert_eq!(
            response.metadata.get("error").and_then(|v| v.as_str()),
            Some("timeout")
        );
        assert_eq!(engine.active_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_returns_an_error_without_dispatch() {
        let engine = engine();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let event = InputEvent::new(ChannelKind::Sms, "+1555", "hello");
        let result = engine.process_input_event(&event, None, &cancel).await;
        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    }

    #[tokio::test]
    async fn triggered_workflows_complete_and_feed_the_learner() {
        let engine = engine();
        engine
            .run_triggered(&WorkflowTrigger {
                target: "pattern-audit".to_string(),
                immediate: true,
            })
            .await;
        assert_eq!(engine.completed_count(), 1);
        assert_eq!(engine.learner.experience_count(), 1);
    }
}
