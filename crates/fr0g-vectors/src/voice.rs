//! Voice-call threat processor. Works off the call transcript plus call
//! timing carried in event metadata (`transcript`, `duration_ms`).

use tokio_util::sync::CancellationToken;

use fr0g_core::types::{ChannelKind, InputEvent, InputEventResponse, ThreatIndicator};

use crate::error::Result;
use crate::patterns::ROBOCALL_PHRASES;
use crate::processor::{ProcessorCore, ThreatProcessor};
use crate::score::{ScoreCard, SubScore, STANDARD_LADDER};
use crate::text;

/// Calls shorter than this contribute to the robocall axis.
const SHORT_CALL_MS: u64 = 30_000;
const SOCIAL_ENG_KEYWORDS: &[&str] = &[
    "irs",
    "arrest",
    "warrant",
    "social security",
    "lawsuit",
    "legal action",
    "suspended",
];
const SCAM_KEYWORDS: &[&str] = &["gift card", "wire transfer", "bitcoin", "western union"];

pub struct VoiceProcessor {
    core: ProcessorCore,
}

impl VoiceProcessor {
    pub fn new(enabled: bool, history_size: usize, sweep_interval_secs: u64) -> Result<Self> {
        Ok(Self {
            core: ProcessorCore::new(
                ChannelKind::Voice,
                enabled,
                STANDARD_LADDER,
                false,
                history_size,
                sweep_interval_secs,
            )?,
        })
    }

    fn transcript<'a>(&self, event: &'a InputEvent) -> &'a str {
        if !event.content.is_empty() {
            return &event.content;
        }
        event
            .metadata
            .get("transcript")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    fn duration_ms(&self, event: &InputEvent) -> Option<u64> {
        event.metadata.get("duration_ms").and_then(|v| v.as_u64())
    }

    fn analyze(&self, event: &InputEvent) -> (ScoreCard, Vec<ThreatIndicator>) {
        let mut card = ScoreCard::new();
        let mut indicators = Vec::new();
        let transcript = self.transcript(event);

        let automated = text::keyword_hits(transcript, ROBOCALL_PHRASES);
        if automated > 0 {
            card.add(SubScore::Robocall, 0.4);
            indicators.push(ThreatIndicator {
                kind: "robocall".to_string(),
                value: format!("{automated} automated phrase(s)"),
                confidence: 0.85,
                description: "scripted call phrasing in transcript".to_string(),
            });
        }
        if let Some(duration) = self.duration_ms(event) {
            if duration < SHORT_CALL_MS {
                card.add(SubScore::Robocall, 0.3);
            }
        }

        let pressure = text::keyword_hits(transcript, SOCIAL_ENG_KEYWORDS);
        if pressure > 0 {
            card.add(SubScore::SocialEng, pressure as f64 * 0.3);
        }
        let scam = text::keyword_hits(transcript, SCAM_KEYWORDS);
        if scam > 0 {
            card.add(SubScore::Scam, scam as f64 * 0.3);
            card.add(SubScore::EmotionalManip, 0.3);
        }

        let recent = self
            .core
            .history
            .count_from(&event.source, chrono::Duration::hours(1));
        if recent > 50 {
            card.add(SubScore::Bot, 0.3);
        }

        (card, indicators)
    }
}

impl ThreatProcessor for VoiceProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Voice
    }

    fn enabled(&self) -> bool {
        self.core.enabled()
    }

    fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.core.start(cancel)
    }

    fn stop(&self) -> Result<()> {
        self.core.stop()
    }

    fn process(&self, event: &InputEvent) -> InputEventResponse {
        let (card, indicators) = self.analyze(event);
        let threatening = !card.is_empty();
        let mitigation = if threatening {
            vec!["block caller id".to_string()]
        } else {
            Vec::new()
        };
        let recommended = if threatening {
            vec![
                "hang up immediately".to_string(),
                "do not press any buttons".to_string(),
                "never share personal data on inbound calls".to_string(),
            ]
        } else {
            Vec::new()
        };
        self.core.synthesize(event, &card, indicators, mitigation, recommended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fr0g_core::types::ThreatLevel;
    use serde_json::json;

    fn processor() -> VoiceProcessor {
        VoiceProcessor::new(true, 1000, 30).unwrap()
    }

    fn call(transcript: &str, duration_ms: u64) -> InputEvent {
        InputEvent::new(ChannelKind::Voice, "+1555", "")
            .with_metadata("transcript", json!(transcript))
            .with_metadata("duration_ms", json!(duration_ms))
    }

    #[test]
    fn irs_robocall_scores_medium_or_above() {
        let p = processor();
        let event = call("This is the IRS. Press 1 to avoid arrest.", 15_000);
        let (card, _) = p.analyze(&event);
        assert!(card.get(SubScore::Robocall) > 0.0);
        assert!(card.get(SubScore::SocialEng) > 0.0);

        let response = p.process(&event);
        let analysis = response.analysis.as_ref().unwrap();
        assert!(analysis.threat_level >= ThreatLevel::Medium);
        assert!(analysis
            .recommended_actions
            .iter()
            .any(|r| r.contains("hang up")));
    }

    #[test]
    fn short_call_alone_is_only_a_weak_signal() {
        let p = processor();
        let response = p.process(&call("hi, it's mom, call me back", 10_000));
        let analysis = response.analysis.as_ref().unwrap();
        // Only the robocall axis is touched, and only by the duration rule.
        assert!(analysis.threat_score <= 0.3 + f64::EPSILON);
        assert!(analysis.threat_level <= ThreatLevel::Low);
    }

    #[test]
    fn transcript_read_from_metadata_when_content_empty() {
        let p = processor();
        let event = call("recorded message about your gift card", 45_000);
        let (card, indicators) = p.analyze(&event);
        assert!(card.get(SubScore::Robocall) > 0.0);
        assert!(card.get(SubScore::Scam) > 0.0);
        assert!(indicators.iter().any(|i| i.kind == "robocall"));
    }

    #[test]
    fn normal_long_call_is_clean() {
        let p = processor();
        let response = p.process(&call("hey, are we still on for lunch tomorrow", 120_000));
        assert_eq!(
            response.analysis.as_ref().unwrap().threat_level,
            ThreatLevel::None
        );
    }
}
