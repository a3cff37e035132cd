//! The channel-processor contract and the shared machinery every channel
//! builds on: lifecycle, tracking state, and output synthesis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fr0g_core::types::{
    ChannelKind, CommandKind, InputEvent, InputEventResponse, OutputCommand, ThreatAnalysisResult,
    ThreatIndicator, ThreatLevel,
};

use crate::error::{Result, VectorError};
use crate::history::{HistoryRecord, MessageRing};
use crate::patterns::ThreatPatterns;
use crate::reputation::ReputationTable;
use crate::score::{Ladder, ScoreCard};

/// Contract implemented by every channel processor.
///
/// Implementations must be `Send + Sync`; they are stored in a
/// [`ProcessorRegistry`] and driven concurrently from webhook handlers.
pub trait ThreatProcessor: Send + Sync {
    /// The channel tag this processor owns.
    fn kind(&self) -> ChannelKind;

    /// Whether the processor is switched on in configuration.
    fn enabled(&self) -> bool;

    /// Start background maintenance. Fails if already running.
    fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Stop background maintenance. Fails if not running.
    fn stop(&self) -> Result<()>;

    /// Classify one event. Never fails: internal errors degrade to
    /// `processed = false` with `metadata.error` set.
    fn process(&self, event: &InputEvent) -> InputEventResponse;
}

/// State and behaviour shared by all channel processors.
pub struct ProcessorCore {
    channel: ChannelKind,
    enabled: bool,
    ladder: Ladder,
    /// E-mail quarantines on critical; other channels do not.
    quarantine_on_critical: bool,
    pub patterns: ThreatPatterns,
    pub history: MessageRing,
    pub reputation: Arc<ReputationTable>,
    running: AtomicBool,
    sweep_interval_secs: u64,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ProcessorCore {
    pub fn new(
        channel: ChannelKind,
        enabled: bool,
        ladder: Ladder,
        quarantine_on_critical: bool,
        history_size: usize,
        sweep_interval_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            channel,
            enabled,
            ladder,
            quarantine_on_critical,
            patterns: ThreatPatterns::compile()?,
            history: MessageRing::new(history_size),
            reputation: Arc::new(ReputationTable::new()),
            running: AtomicBool::new(false),
            sweep_interval_secs,
            cancel: Mutex::new(None),
        })
    }

    pub fn kind(&self) -> ChannelKind {
        self.channel
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn ladder(&self) -> Ladder {
        self.ladder
    }

    /// Start the reputation maintenance sweep. A second start while running
    /// is an error; the first start after `stop` succeeds again.
    pub fn start(&self, cancel: CancellationToken) -> Result<()> {
        if !self.enabled {
            return Err(VectorError::Disabled {
                channel: self.channel.to_string(),
            });
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(VectorError::AlreadyRunning {
                channel: self.channel.to_string(),
            });
        }

        let reputation = self.reputation.clone();
        let interval_secs = self.sweep_interval_secs;
        let channel = self.channel;
        let task_token = cancel.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        reputation.sweep();
                    }
                    _ = task_token.cancelled() => {
                        info!(channel = %channel, "processor maintenance stopped");
                        break;
                    }
                }
            }
        });

        *self.cancel.lock().unwrap() = Some(cancel);
        info!(channel = %self.channel, "processor started");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(VectorError::NotRunning {
                channel: self.channel.to_string(),
            });
        }
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
        info!(channel = %self.channel, "processor stopped");
        Ok(())
    }

    /// Security sink this channel's alerts are addressed to.
    pub fn security_sink(&self) -> String {
        format!("{}-security", self.channel)
    }

    /// Record the event into the history ring and reputation table.
    /// `threat` marks a classification of medium or above.
    pub fn track(&self, event: &InputEvent, threat: bool) {
        self.history.push(HistoryRecord {
            event_id: event.id.clone(),
            source: event.source.clone(),
            content_len: event.content.len(),
            threat,
            at: Utc::now(),
        });
        self.reputation.record(&event.source, threat);
    }

    /// Fold a score card into the response the processor returns.
    ///
    /// Decision table: level ≥ high adds an alert addressed at the channel's
    /// security sink; critical additionally quarantines on channels that opt
    /// in; every level records the analysis under `metadata.threat_analysis`.
    pub fn synthesize(
        &self,
        event: &InputEvent,
        card: &ScoreCard,
        indicators: Vec<ThreatIndicator>,
        mitigation: Vec<String>,
        recommended_actions: Vec<String>,
    ) -> InputEventResponse {
        let confidence = card.confidence();
        let level = self.ladder.level(confidence);

        let analysis = ThreatAnalysisResult {
            event_id: event.id.clone(),
            threat_level: level,
            threat_score: confidence,
            threat_types: card.threat_types(),
            indicators,
            mitigation,
            confidence,
            recommended_actions,
        };

        self.track(event, level >= ThreatLevel::Medium);

        let mut actions = Vec::new();
        if level >= ThreatLevel::High {
            let summary = format!(
                "{} threat on {} from {}: {} (score {:.2})",
                level,
                self.channel,
                event.source,
                analysis.threat_types.join(", "),
                confidence,
            );
            actions.push(
                OutputCommand::for_event(&event.id, CommandKind::Alert, self.security_sink(), summary)
                    .with_priority(if level == ThreatLevel::Critical { 10 } else { 8 }),
            );
        }
        if level == ThreatLevel::Critical && self.quarantine_on_critical {
            actions.push(
                OutputCommand::for_event(
                    &event.id,
                    CommandKind::Quarantine,
                    event.source.clone(),
                    format!("quarantined message {}", event.id),
                )
                .with_priority(10),
            );
        }

        let mut metadata = fr0g_core::types::Metadata::new();
        match serde_json::to_value(&analysis) {
            Ok(value) => {
                metadata.insert("threat_analysis".to_string(), value);
            }
            Err(e) => {
                // Never fail the event over a serialization hiccup.
                warn!(event_id = %event.id, error = %e, "could not attach threat analysis");
            }
        }

        InputEventResponse {
            event_id: event.id.clone(),
            processed: true,
            actions,
            analysis: Some(analysis),
            metadata,
            processed_at: Utc::now(),
        }
    }

    /// Degrade an internal failure to a `processed = false` response.
    pub fn error_response(event: &InputEvent, reason: &str) -> InputEventResponse {
        warn!(event_id = %event.id, reason, "processor degraded event");
        let mut metadata = fr0g_core::types::Metadata::new();
        metadata.insert("error".to_string(), Value::String(reason.to_string()));
        InputEventResponse {
            event_id: event.id.clone(),
            processed: false,
            actions: Vec::new(),
            analysis: None,
            metadata,
            processed_at: Utc::now(),
        }
    }
}

/// Tag → processor lookup. Adding a channel is a registration at start-up.
pub struct ProcessorRegistry {
    processors: HashMap<ChannelKind, Arc<dyn ThreatProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Register a processor under its own tag, replacing any previous one.
    pub fn register(&mut self, processor: Arc<dyn ThreatProcessor>) {
        let kind = processor.kind();
        info!(channel = %kind, "registering threat processor");
        self.processors.insert(kind, processor);
    }

    pub fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn ThreatProcessor>> {
        self.processors.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.processors.keys().copied().collect()
    }

    /// Start every enabled processor with a child of the given token.
    pub fn start_all(&self, cancel: &CancellationToken) {
        for processor in self.processors.values() {
            if !processor.enabled() {
                continue;
            }
            if let Err(e) = processor.start(cancel.child_token()) {
                warn!(channel = %processor.kind(), error = %e, "processor failed to start");
            }
        }
    }

    pub fn stop_all(&self) {
        for processor in self.processors.values() {
            if let Err(e) = processor.stop() {
                warn!(channel = %processor.kind(), error = %e, "processor failed to stop");
            }
        }
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{SubScore, STANDARD_LADDER};

    fn core() -> ProcessorCore {
        ProcessorCore::new(ChannelKind::Sms, true, STANDARD_LADDER, false, 100, 30).unwrap()
    }

    #[tokio::test]
    async fn start_twice_fails_then_stop_restores() {
        let core = core();
        let token = CancellationToken::new();
        core.start(token.child_token()).unwrap();
        assert!(matches!(
            core.start(token.child_token()),
            Err(VectorError::AlreadyRunning { .. })
        ));
        core.stop().unwrap();
        assert!(matches!(core.stop(), Err(VectorError::NotRunning { .. })));
        core.start(token.child_token()).unwrap();
        core.stop().unwrap();
    }

    #[tokio::test]
    async fn disabled_processor_refuses_start() {
        let core =
            ProcessorCore::new(ChannelKind::Irc, false, STANDARD_LADDER, false, 100, 30).unwrap();
        assert!(matches!(
            core.start(CancellationToken::new()),
            Err(VectorError::Disabled { .. })
        ));
    }

    #[test]
    fn synthesize_attaches_analysis_and_correlates_actions() {
        let core = core();
        let event = InputEvent::new(ChannelKind::Sms, "+1555", "URGENT!!! click bit.ly/x");
        let mut card = ScoreCard::new();
        card.add(SubScore::Spam, 0.9);
        card.add(SubScore::Phishing, 0.7);

        let response = core.synthesize(&event, &card, Vec::new(), Vec::new(), Vec::new());
        assert_eq!(response.event_id, event.id);
        assert!(response.processed);
        assert!(response.metadata.contains_key("threat_analysis"));

        let analysis = response.analysis.as_ref().unwrap();
        assert_eq!(analysis.threat_level, ThreatLevel::Critical);
        assert!(!response.actions.is_empty());
        for action in &response.actions {
            assert_eq!(
                action.metadata.get("event_id").and_then(|v| v.as_str()),
                Some(event.id.as_str())
            );
        }
    }

    #[test]
    fn low_score_emits_no_actions() {
        let core = core();
        let event = InputEvent::new(ChannelKind::Sms, "+1555", "see you at noon");
        let card = ScoreCard::new();
        let response = core.synthesize(&event, &card, Vec::new(), Vec::new(), Vec::new());
        assert!(response.actions.is_empty());
        assert_eq!(
            response.analysis.as_ref().unwrap().threat_level,
            ThreatLevel::None
        );
    }

    #[test]
    fn quarantine_added_only_when_opted_in() {
        let quarantining =
            ProcessorCore::new(ChannelKind::Email, true, crate::score::GENTLE_LADDER, true, 100, 30)
                .unwrap();
        let event = InputEvent::new(ChannelKind::Email, "security@bank-fake.com", "verify now");
        let mut card = ScoreCard::new();
        card.add(SubScore::Phishing, 0.9);

        let response = quarantining.synthesize(&event, &card, Vec::new(), Vec::new(), Vec::new());
        assert!(response
            .actions
            .iter()
            .any(|a| a.kind == CommandKind::Quarantine));
        assert!(response.actions.iter().any(|a| a.kind == CommandKind::Alert));
    }

    #[test]
    fn error_response_degrades_without_failing() {
        let event = InputEvent::new(ChannelKind::Voice, "+1555", "");
        let response = ProcessorCore::error_response(&event, "transcript decoder failed");
        assert!(!response.processed);
        assert_eq!(
            response.metadata.get("error").and_then(|v| v.as_str()),
            Some("transcript decoder failed")
        );
    }
}
