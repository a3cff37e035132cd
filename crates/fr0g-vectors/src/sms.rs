//! SMS threat processor.

use tokio_util::sync::CancellationToken;

use fr0g_core::types::{ChannelKind, InputEvent, InputEventResponse, ThreatIndicator};

use crate::error::Result;
use crate::processor::{ProcessorCore, ThreatProcessor};
use crate::score::{ScoreCard, SubScore, STANDARD_LADDER};
use crate::text;

/// Each hit adds this much spam weight.
const SPAM_KEYWORD_STEP: f64 = 0.2;
const SPAM_KEYWORDS: &[&str] = &[
    "free", "winner", "won", "prize", "urgent", "claim", "congratulations", "cash reward",
];
const PHISHING_KEYWORD_STEP: f64 = 0.2;
const PHISHING_KEYWORDS: &[&str] = &["verify", "account", "suspended", "click", "confirm"];
const SCAM_KEYWORDS: &[&str] = &["wire transfer", "gift card", "crypto wallet"];
/// Messages from one sender within an hour before the bot axis engages.
const BOT_BURST_THRESHOLD: usize = 50;

pub struct SmsProcessor {
    core: ProcessorCore,
}

impl SmsProcessor {
    pub fn new(enabled: bool, history_size: usize, sweep_interval_secs: u64) -> Result<Self> {
        Ok(Self {
            core: ProcessorCore::new(
                ChannelKind::Sms,
                enabled,
                STANDARD_LADDER,
                false,
                history_size,
                sweep_interval_secs,
            )?,
        })
    }

    fn analyze(&self, event: &InputEvent) -> (ScoreCard, Vec<ThreatIndicator>) {
        let mut card = ScoreCard::new();
        let mut indicators = Vec::new();
        let content = &event.content;

        let spam_hits = text::keyword_hits(content, SPAM_KEYWORDS);
        if spam_hits > 0 {
            card.add(SubScore::Spam, spam_hits as f64 * SPAM_KEYWORD_STEP);
        }
        let phishing_hits = text::keyword_hits(content, PHISHING_KEYWORDS);
        if phishing_hits > 0 {
            card.add(SubScore::Phishing, phishing_hits as f64 * PHISHING_KEYWORD_STEP);
        }
        let scam_hits = text::keyword_hits(content, SCAM_KEYWORDS);
        if scam_hits > 0 {
            card.add(SubScore::Scam, scam_hits as f64 * 0.3);
        }

        if let Some(m) = self.core.patterns.phishing_url.find(content) {
            card.add(SubScore::Phishing, 0.6);
            card.add(SubScore::Spam, 0.5);
            indicators.push(ThreatIndicator {
                kind: "phishing_url".to_string(),
                value: m.as_str().to_string(),
                confidence: 0.9,
                description: "shortened URL hides the destination".to_string(),
            });
        }
        if let Some(m) = self.core.patterns.credit_card.find(content) {
            card.add(SubScore::Phishing, 0.5);
            indicators.push(ThreatIndicator {
                kind: "credit_card".to_string(),
                value: m.as_str().to_string(),
                confidence: 0.8,
                description: "card-number-shaped digit groups in message body".to_string(),
            });
        }

        if text::uppercase_ratio(content) > 0.3 {
            card.add(SubScore::Spam, 0.4);
        }
        if text::exclamation_count(content) > 1 {
            card.add(SubScore::Spam, 0.4);
        }

        let recent = self
            .core
            .history
            .count_from(&event.source, chrono::Duration::hours(1));
        if recent > BOT_BURST_THRESHOLD {
            card.add(SubScore::Bot, 0.3);
        }

        (card, indicators)
    }
}

impl ThreatProcessor for SmsProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
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
            vec!["block sender".to_string(), "report number to carrier".to_string()]
        } else {
            Vec::new()
        };
        let recommended = if threatening {
            vec![
                "do not click links".to_string(),
                "do not reply with personal data".to_string(),
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
    use fr0g_core::types::{CommandKind, ThreatLevel};

    fn processor() -> SmsProcessor {
        SmsProcessor::new(true, 1000, 30).unwrap()
    }

    fn event(body: &str) -> InputEvent {
        InputEvent::new(ChannelKind::Sms, "+1555", body)
    }

    #[test]
    fn scam_blast_classifies_high_or_critical() {
        let p = processor();
        let response = p.process(&event("URGENT! You've won a FREE prize! Click bit.ly/x"));
        assert!(response.processed);

        let analysis = response.analysis.as_ref().unwrap();
        assert!(analysis.threat_level >= ThreatLevel::High);
        assert!(analysis
            .threat_types
            .iter()
            .any(|t| t == "spam"));
        // The spam axis must carry real weight for this message.
        let (card, _) = p.analyze(&event("URGENT! You've won a FREE prize! Click bit.ly/x"));
        assert!(card.get(SubScore::Spam) >= 0.6);
        assert!(response
            .actions
            .iter()
            .any(|a| a.kind == CommandKind::Alert));
    }

    #[test]
    fn benign_message_passes_clean() {
        let p = processor();
        let response = p.process(&event("running late, see you at 7"));
        assert!(response.processed);
        assert_eq!(
            response.analysis.as_ref().unwrap().threat_level,
            ThreatLevel::None
        );
        assert!(response.actions.is_empty());
    }

    #[test]
    fn card_number_produces_indicator() {
        let p = processor();
        let response = p.process(&event("send to 4111 1111 1111 1111 to verify"));
        let analysis = response.analysis.as_ref().unwrap();
        assert!(analysis.indicators.iter().any(|i| i.kind == "credit_card"));
    }

    #[test]
    fn burst_activity_raises_bot_score() {
        let p = processor();
        for _ in 0..60 {
            p.process(&event("hello"));
        }
        let (card, _) = p.analyze(&event("hello"));
        assert!(card.get(SubScore::Bot) > 0.0);
    }

    #[test]
    fn responses_correlate_to_their_event() {
        let p = processor();
        let e = event("URGENT! verify your account at bit.ly/x now!!");
        let response = p.process(&e);
        assert_eq!(response.event_id, e.id);
        for action in &response.actions {
            assert_eq!(
                action.metadata.get("event_id").and_then(|v| v.as_str()),
                Some(e.id.as_str())
            );
        }
    }
}
