//! Cognitive engine: awareness, reflections, insights, and emergent
//! capability detection, driven by five fixed-interval loops.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::learning::AdaptiveLearner;
use crate::recognizer::PatternRecognizer;
use crate::types::{
    CognitiveConfig, Experience, Insight, InsightImpact, IntelligenceMetrics, Reflection,
    SystemAwareness,
};

/// States kept in the awareness history ring.
const STATE_HISTORY_CAP: usize = 100;
/// Emergent-capability gate thresholds.
const EMERGENT_MIN_AWARENESS: f64 = 0.6;
const EMERGENT_MIN_PATTERNS: usize = 3;
const EMERGENT_MIN_ADAPTATION: f64 = 0.5;
const EMERGENT_MIN_RECENT_INSIGHTS: usize = 2;
/// Window for "recent" insights in the emergent gate.
const EMERGENT_INSIGHT_WINDOW_MINS: i64 = 5;

struct EngineState {
    awareness: SystemAwareness,
    insights: VecDeque<Insight>,
    reflections: VecDeque<Reflection>,
    capabilities: HashSet<String>,
    efficiency_index: f64,
}

/// The MCP's adaptive core. Shares the learner and recognizer with the
/// workflow engine through `Arc` capability handles, which keeps the
/// cognitive → memory → learning → cognitive dependency cycle out of the
/// ownership graph.
pub struct CognitiveEngine {
    config: CognitiveConfig,
    learner: Arc<AdaptiveLearner>,
    recognizer: Arc<PatternRecognizer>,
    state: RwLock<EngineState>,
}

impl CognitiveEngine {
    pub fn new(
        config: CognitiveConfig,
        learner: Arc<AdaptiveLearner>,
        recognizer: Arc<PatternRecognizer>,
    ) -> Self {
        Self {
            config,
            learner,
            recognizer,
            state: RwLock::new(EngineState {
                awareness: SystemAwareness::default(),
                insights: VecDeque::new(),
                reflections: VecDeque::new(),
                capabilities: HashSet::new(),
                efficiency_index: 0.5,
            }),
        }
    }

    pub fn learner(&self) -> &Arc<AdaptiveLearner> {
        &self.learner
    }

    pub fn recognizer(&self) -> &Arc<PatternRecognizer> {
        &self.recognizer
    }

    /// Snapshot current state into the history ring and recompute the
    /// awareness level from pattern/insight/reflection volume.
    pub fn update_awareness(&self, current_state: &str) {
        let patterns = self.recognizer.pattern_count();
        let mut state = self.state.write().unwrap();

        let previous = std::mem::replace(
            &mut state.awareness.current_state,
            current_state.to_string(),
        );
        state.awareness.state_history.push(previous);
        while state.awareness.state_history.len() > STATE_HISTORY_CAP {
            state.awareness.state_history.remove(0);
        }

        let insights = state.insights.len();
        let reflections = state.reflections.len();
        state.awareness.awareness_level =
            (0.5 + 0.01 * patterns as f64 + 0.02 * insights as f64 + 0.005 * reflections as f64)
                .min(1.0);
        state.awareness.last_update = Utc::now();
    }

    /// Record which components are live and how they feed each other.
    pub fn observe_component(&self, component: &str, condition: &str, feeds: &[&str]) {
        let mut state = self.state.write().unwrap();
        state
            .awareness
            .component_map
            .insert(component.to_string(), condition.to_string());
        state.awareness.interaction_graph.insert(
            component.to_string(),
            feeds.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Derive insights from the current pattern volume, metric movement, and
    /// reflection depth. Returns how many insights were produced.
    pub fn generate_insights(&self) -> usize {
        let patterns = self.recognizer.pattern_count();
        let adaptation = self.learner.adaptation_score();
        let learning_rate = self.learner.learning_rate();

        let mut produced = Vec::new();

        if patterns >= EMERGENT_MIN_PATTERNS {
            produced.push(build_insight(
                "pattern_density",
                format!("{patterns} concurrent patterns suggest correlated activity across streams"),
                (0.5 + patterns as f64 * 0.05).min(1.0),
                InsightImpact::Medium,
                "system_health",
                true,
            ));
        }
        if adaptation >= 0.7 {
            produced.push(build_insight(
                "adaptation_quality",
                format!("adaptation score {adaptation:.2} indicates the learning loop is converging"),
                adaptation,
                InsightImpact::High,
                "consciousness",
                false,
            ));
        } else if adaptation > 0.0 && adaptation < 0.3 {
            produced.push(build_insight(
                "adaptation_quality",
                format!("adaptation score {adaptation:.2} is regressing; recent feedback is mostly negative"),
                1.0 - adaptation,
                InsightImpact::High,
                "resource_optimization",
                true,
            ));
        }
        if learning_rate >= 0.4 {
            produced.push(build_insight(
                "learning_rate",
                format!("learning rate {learning_rate:.2} is near its ceiling; new experiences dominate"),
                0.8,
                InsightImpact::Low,
                "emergent_behavior",
                false,
            ));
        }

        let count = produced.len();
        if count > 0 {
            let mut state = self.state.write().unwrap();
            for insight in produced {
                state.insights.push_back(insight);
            }
            while state.insights.len() > self.config.max_insights {
                state.insights.pop_front();
            }
        }
        count
    }

    /// Append a reflection. Oldest entries drop when the ring is full.
    pub fn reflect(&self, content: &str, kind: &str, depth: u32) {
        let mut state = self.state.write().unwrap();
        state.reflections.push_back(Reflection {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            kind: kind.to_string(),
            depth,
            created_at: Utc::now(),
        });
        while state.reflections.len() > self.config.max_reflections {
            state.reflections.pop_front();
        }
    }

    /// One learning tick: fold the current intelligence posture into a
    /// synthetic experience and feed the adaptive learner.
    pub fn learning_tick(&self) {
        let pattern_score = (self.recognizer.pattern_count() as f64
            / self.config.max_patterns as f64)
            .min(1.0);
        let learning_rate_score = (self.learner.learning_rate() - 0.01) / (0.5 - 0.01);
        let feedback = (pattern_score + learning_rate_score) / 2.0 * 2.0 - 1.0;

        let mut experience = Experience::new(
            "cognitive_self_assessment",
            feedback,
            0.5,
            "intelligence metric fold-back",
        );
        experience.input.insert(
            "pattern_score".to_string(),
            serde_json::json!(pattern_score),
        );
        experience.input.insert(
            "learning_rate_score".to_string(),
            serde_json::json!(learning_rate_score),
        );
        self.learner.add_experience(experience);
    }

    /// Count one new emergent capability when awareness, pattern volume,
    /// adaptation, and recent insight rate all clear their gates at once.
    /// Capabilities are idempotent by slug; re-detection is a no-op.
    pub fn detect_emergent_capabilities(&self) -> Option<String> {
        let patterns = self.recognizer.pattern_count();
        let adaptation = self.learner.adaptation_score();
        let cutoff = Utc::now() - Duration::minutes(EMERGENT_INSIGHT_WINDOW_MINS);

        let mut state = self.state.write().unwrap();
        let awareness = state.awareness.awareness_level;
        let recent_insights = state
            .insights
            .iter()
            .filter(|i| i.created_at >= cutoff)
            .count();

        if awareness < EMERGENT_MIN_AWARENESS
            || patterns < EMERGENT_MIN_PATTERNS
            || adaptation < EMERGENT_MIN_ADAPTATION
            || recent_insights < EMERGENT_MIN_RECENT_INSIGHTS
        {
            return None;
        }

        // Slug names the dominant recent insight category, so distinct
        // capability shapes are counted separately but only once each.
        let dominant = dominant_category(state.insights.iter());
        let slug = format!("emergent:{dominant}");
        if state.capabilities.insert(slug.clone()) {
            info!(%slug, awareness, patterns, adaptation, "emergent capability detected");
            Some(slug)
        } else {
            None
        }
    }

    /// Read-only intelligence snapshot.
    pub fn metrics(&self) -> IntelligenceMetrics {
        let state = self.state.read().unwrap();
        IntelligenceMetrics {
            learning_rate: self.learner.learning_rate(),
            pattern_count: self.recognizer.pattern_count(),
            adaptation_score: self.learner.adaptation_score(),
            efficiency_index: state.efficiency_index,
            emergent_capabilities: state.capabilities.len() as u32,
        }
    }

    pub fn awareness(&self) -> SystemAwareness {
        self.state.read().unwrap().awareness.clone()
    }

    pub fn insights(&self) -> Vec<Insight> {
        self.state.read().unwrap().insights.iter().cloned().collect()
    }

    pub fn reflections(&self) -> Vec<Reflection> {
        self.state.read().unwrap().reflections.iter().cloned().collect()
    }

    /// Recompute the efficiency index from adaptation, pattern saturation,
    /// and awareness.
    fn publish_metrics(&self) {
        let adaptation = self.learner.adaptation_score();
        let saturation =
            (self.recognizer.pattern_count() as f64 / self.config.max_patterns as f64).min(1.0);
        let mut state = self.state.write().unwrap();
        let awareness = state.awareness.awareness_level;
        state.efficiency_index =
            (0.5 * adaptation + 0.3 * saturation + 0.2 * awareness).clamp(0.0, 1.0);
        debug!(
            efficiency = state.efficiency_index,
            capabilities = state.capabilities.len(),
            "intelligence metrics published"
        );
    }

    /// Drive the five cognitive loops until `shutdown` broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("cognitive engine started");
        let secs = std::time::Duration::from_secs;
        let mut awareness = tokio::time::interval(secs(self.config.awareness_interval_secs));
        let mut recognition = tokio::time::interval(secs(self.config.recognition_interval_secs));
        let mut insight = tokio::time::interval(secs(self.config.insight_interval_secs));
        let mut learning = tokio::time::interval(secs(self.config.learning_interval_secs));
        let mut metrics = tokio::time::interval(secs(self.config.metrics_interval_secs));
        for interval in [
            &mut awareness,
            &mut recognition,
            &mut insight,
            &mut learning,
            &mut metrics,
        ] {
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        }

        loop {
            tokio::select! {
                _ = awareness.tick() => {
                    self.update_awareness("operational");
                }
                _ = recognition.tick() => {
                    // Feed the engine's own metric stream back into the
                    // recognizer so self-trends become visible.
                    let snapshot = self.metrics();
                    self.recognizer.add_data_point(
                        "intelligence.adaptation",
                        "tick",
                        serde_json::json!(snapshot.adaptation_score),
                        &serde_json::Map::new(),
                    );
                }
                _ = insight.tick() => {
                    let produced = self.generate_insights();
                    if produced > 0 {
                        self.reflect(
                            &format!("generated {produced} insights from current posture"),
                            "insight_review",
                            0,
                        );
                    }
                    self.detect_emergent_capabilities();
                }
                _ = learning.tick() => {
                    self.learning_tick();
                }
                _ = metrics.tick() => {
                    self.publish_metrics();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("cognitive engine shutting down");
                        break;
                    }
                }
            }
        }
    }
}

fn build_insight(
    kind: &str,
    content: String,
    confidence: f64,
    impact: InsightImpact,
    category: &str,
    actionable: bool,
) -> Insight {
    Insight {
        id: uuid::Uuid::new_v4().to_string(),
        kind: kind.to_string(),
        content,
        confidence,
        impact,
        category: category.to_string(),
        actionable,
        created_at: Utc::now(),
    }
}

fn dominant_category<'a>(insights: impl Iterator<Item = &'a Insight>) -> String {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for insight in insights {
        *counts.entry(insight.category.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)))
        .map(|(category, _)| category.to_string())
        .unwrap_or_else(|| "general".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PatternKind;
    use serde_json::json;

    fn engine() -> CognitiveEngine {
        let learner = Arc::new(AdaptiveLearner::new(0.1));
        let recognizer = Arc::new(PatternRecognizer::new(CognitiveConfig::default()));
        CognitiveEngine::new(CognitiveConfig::default(), learner, recognizer)
    }

    fn seed_patterns(engine: &CognitiveEngine, streams: usize) {
        for s in 0..streams {
            let stream = format!("seed{s}");
            for _ in 0..8 {
                engine.recognizer.add_data_point(
                    &stream,
                    "event",
                    json!("repeated"),
                    &serde_json::Map::new(),
                );
            }
        }
    }

    #[test]
    fn awareness_history_is_a_bounded_ring() {
        let e = engine();
        for i in 0..150 {
            e.update_awareness(&format!("state-{i}"));
        }
        let awareness = e.awareness();
        assert_eq!(awareness.state_history.len(), STATE_HISTORY_CAP);
        assert_eq!(awareness.current_state, "state-149");
    }

    #[test]
    fn awareness_level_grows_with_activity() {
        let e = engine();
        e.update_awareness("idle");
        let baseline = e.awareness().awareness_level;

        seed_patterns(&e, 5);
        e.reflect("observing load", "self", 0);
        e.reflect("observing load again", "self", 1);
        e.update_awareness("busy");
        assert!(e.awareness().awareness_level > baseline);
    }

    #[test]
    fn reflections_cap_at_configured_maximum() {
        let e = engine();
        for i in 0..250 {
            e.reflect(&format!("thought {i}"), "self", 0);
        }
        assert_eq!(e.reflections().len(), CognitiveConfig::default().max_reflections);
    }

    #[test]
    fn learning_tick_feeds_the_learner() {
        let e = engine();
        assert_eq!(e.learner.experience_count(), 0);
        e.learning_tick();
        assert_eq!(e.learner.experience_count(), 1);
    }

    #[test]
    fn emergent_gate_requires_all_conditions() {
        let e = engine();
        // No patterns, no insights: gate must hold.
        assert!(e.detect_emergent_capabilities().is_none());
        assert_eq!(e.metrics().emergent_capabilities, 0);
    }

    #[test]
    fn emergent_capability_is_idempotent_by_slug() {
        let e = engine();
        seed_patterns(&e, 5);
        assert!(e.recognizer.has_kind(PatternKind::Frequency));
        for _ in 0..30 {
            e.learner
                .add_experience(Experience::new("seed", 1.0, 0.5, "test"));
        }
        e.generate_insights();
        e.generate_insights();
        e.update_awareness("active");
        // Boost awareness by accumulating insights/reflections.
        for i in 0..20 {
            e.reflect(&format!("r{i}"), "self", 0);
        }
        e.update_awareness("active");
        assert!(e.awareness().awareness_level >= EMERGENT_MIN_AWARENESS);

        let first = e.detect_emergent_capabilities();
        assert!(first.is_some());
        let again = e.detect_emergent_capabilities();
        assert!(again.is_none(), "same slug must not count twice");
        assert_eq!(e.metrics().emergent_capabilities, 1);
    }

    #[test]
    fn metrics_snapshot_reports_live_values() {
        let e = engine();
        seed_patterns(&e, 2);
        let m = e.metrics();
        assert!(m.pattern_count > 0);
        assert!((0.01..=0.5).contains(&m.learning_rate));
        assert!((0.0..=1.0).contains(&m.adaptation_score));
    }
}
