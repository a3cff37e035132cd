//! E-mail threat processor. Subject rides in metadata; the body is the
//! event content. Uses the gentler ladder and quarantines on critical.

use tokio_util::sync::CancellationToken;

use fr0g_core::types::{ChannelKind, InputEvent, InputEventResponse, ThreatIndicator};

use crate::error::Result;
use crate::processor::{ProcessorCore, ThreatProcessor};
use crate::score::{ScoreCard, SubScore, GENTLE_LADDER};
use crate::text;

const PHISHING_KEYWORD_STEP: f64 = 0.3;
const PHISHING_KEYWORDS: &[&str] = &[
    "verify",
    "credentials",
    "security alert",
    "suspended",
    "confirm your",
    "update your payment",
];
const EMOTIONAL_KEYWORDS: &[&str] = &["urgent", "immediately", "act now", "within 24 hours"];
const CRYPTO_STEP: f64 = 0.3;

pub struct EmailProcessor {
    core: ProcessorCore,
}

impl EmailProcessor {
    pub fn new(enabled: bool, history_size: usize, sweep_interval_secs: u64) -> Result<Self> {
        Ok(Self {
            core: ProcessorCore::new(
                ChannelKind::Email,
                enabled,
                GENTLE_LADDER,
                true,
                history_size,
                sweep_interval_secs,
            )?,
        })
    }

    /// Subject + body, the text both detectors scan.
    fn full_text(&self, event: &InputEvent) -> String {
        let subject = event
            .metadata
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if subject.is_empty() {
            event.content.clone()
        } else {
            format!("{subject}\n{}", event.content)
        }
    }

    fn analyze(&self, event: &InputEvent) -> (ScoreCard, Vec<ThreatIndicator>) {
        let mut card = ScoreCard::new();
        let mut indicators = Vec::new();
        let full_text = self.full_text(event);

        let phishing_hits = text::keyword_hits(&full_text, PHISHING_KEYWORDS);
        if phishing_hits > 0 {
            card.add(SubScore::Phishing, phishing_hits as f64 * PHISHING_KEYWORD_STEP);
        }
        if self.core.patterns.has_shortened_url(&full_text) {
            card.add(SubScore::Phishing, 0.6);
            card.add(SubScore::Spam, 0.5);
        }
        if let Some(m) = self.core.patterns.credit_card.find(&full_text) {
            card.add(SubScore::Phishing, 0.5);
            indicators.push(ThreatIndicator {
                kind: "credit_card".to_string(),
                value: m.as_str().to_string(),
                confidence: 0.8,
                description: "card-number-shaped digit groups in mail body".to_string(),
            });
        }
        // A link in a mail that already smells of phishing is corroborating.
        if card.get(SubScore::Phishing) > 0.0 && self.core.patterns.any_url.is_match(&full_text) {
            card.add(SubScore::Phishing, 0.3);
        }

        if self.core.patterns.has_spoofed_localpart(&event.source) {
            card.add(SubScore::Spoofing, 0.8);
            indicators.push(ThreatIndicator {
                kind: "spoofed_sender".to_string(),
                value: event.source.clone(),
                confidence: 0.7,
                description: "role-account localpart commonly forged in phishing".to_string(),
            });
        }

        let pressure = text::keyword_hits(&full_text, EMOTIONAL_KEYWORDS);
        if pressure > 0 {
            card.add(SubScore::EmotionalManip, 0.4);
        }

        let crypto = text::keyword_hits(&full_text, crate::patterns::CRYPTO_KEYWORDS);
        if crypto > 0 {
            card.add(SubScore::Scam, crypto as f64 * CRYPTO_STEP);
        }

        if text::uppercase_ratio(&full_text) > 0.2 {
            card.add(SubScore::Spam, 0.4);
        }

        (card, indicators)
    }
}

impl ThreatProcessor for EmailProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
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
            vec![
                "quarantine message".to_string(),
                "blocklist sending domain".to_string(),
            ]
        } else {
            Vec::new()
        };
        let recommended = if threatening {
            vec![
                "do not click links".to_string(),
                "verify the sender through a known address".to_string(),
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
    use serde_json::json;

    fn processor() -> EmailProcessor {
        EmailProcessor::new(true, 1000, 30).unwrap()
    }

    fn mail(from: &str, subject: &str, body: &str) -> InputEvent {
        InputEvent::new(ChannelKind::Email, from, body).with_metadata("subject", json!(subject))
    }

    #[test]
    fn credential_phish_is_critical_with_quarantine() {
        let p = processor();
        let event = mail(
            "security@bank-fake.com",
            "URGENT: Account Security Alert",
            "verify your credentials at http://fake-bank-security.com/login",
        );
        let (card, indicators) = p.analyze(&event);
        assert!(card.get(SubScore::Phishing) >= 0.5);
        assert!(indicators.iter().any(|i| i.kind == "spoofed_sender"));

        let response = p.process(&event);
        let analysis = response.analysis.as_ref().unwrap();
        assert_eq!(analysis.threat_level, ThreatLevel::Critical);
        assert!(response.actions.iter().any(|a| a.kind == CommandKind::Alert));
        assert!(response
            .actions
            .iter()
            .any(|a| a.kind == CommandKind::Quarantine));
    }

    #[test]
    fn newsletter_from_normal_sender_is_clean() {
        let p = processor();
        let response = p.process(&mail(
            "alice@example.org",
            "Weekly digest",
            "here is what happened this week in the project",
        ));
        assert_eq!(
            response.analysis.as_ref().unwrap().threat_level,
            ThreatLevel::None
        );
        assert!(response.actions.is_empty());
    }

    #[test]
    fn subject_text_feeds_detection() {
        let p = processor();
        // The trigger phrase appears only in the subject.
        let event = mail("bob@example.org", "please verify your credentials", "see attached");
        let (card, _) = p.analyze(&event);
        assert!(card.get(SubScore::Phishing) > 0.0);
    }

    #[test]
    fn crypto_pitch_touches_scam_axis() {
        let p = processor();
        let event = mail(
            "promo@coins.example",
            "exclusive airdrop",
            "claim your bitcoin giveaway today",
        );
        let (card, _) = p.analyze(&event);
        assert!(card.get(SubScore::Scam) >= 0.6);
    }
}
