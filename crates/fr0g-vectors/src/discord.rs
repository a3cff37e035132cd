//! Discord threat processor.

use tokio_util::sync::CancellationToken;

use fr0g_core::types::{ChannelKind, InputEvent, InputEventResponse, ThreatIndicator};

use crate::error::Result;
use crate::patterns::CRYPTO_KEYWORDS;
use crate::processor::{ProcessorCore, ThreatProcessor};
use crate::score::{ScoreCard, SubScore, STANDARD_LADDER};
use crate::text;

/// More than this many @-mentions reads as mention spam.
const MENTION_SPAM_THRESHOLD: usize = 2;
/// More than this many emojis reads as flood noise.
const EMOJI_SPAM_THRESHOLD: usize = 8;

pub struct DiscordProcessor {
    core: ProcessorCore,
}

impl DiscordProcessor {
    pub fn new(enabled: bool, history_size: usize, sweep_interval_secs: u64) -> Result<Self> {
        Ok(Self {
            core: ProcessorCore::new(
                ChannelKind::Discord,
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

        // The nitro scam is the combination: the phrase plus an invite link.
        let nitro = self.core.patterns.nitro_phrase.is_match(content)
            && self.core.patterns.discord_invite.is_match(content);
        if nitro {
            card.add(SubScore::Scam, 0.8);
            card.add(SubScore::Phishing, 0.5);
            indicators.push(ThreatIndicator {
                kind: "nitro_scam".to_string(),
                value: content.chars().take(80).collect(),
                confidence: 0.9,
                description: "nitro bait combined with an invite link".to_string(),
            });
        }

        let crypto = text::keyword_hits(content, CRYPTO_KEYWORDS);
        if crypto > 0 {
            card.add(SubScore::Scam, crypto as f64 * 0.3);
        }

        if self.core.patterns.has_shortened_url(content) {
            card.add(SubScore::Phishing, 0.5);
            indicators.push(ThreatIndicator {
                kind: "phishing_url".to_string(),
                value: "shortened link".to_string(),
                confidence: 0.8,
                description: "shortened URL hides the destination".to_string(),
            });
        }

        if text::mention_count(content) > MENTION_SPAM_THRESHOLD {
            card.add(SubScore::Spam, 0.4);
        }
        if text::emoji_count(content) > EMOJI_SPAM_THRESHOLD {
            card.add(SubScore::Spam, 0.3);
        }
        if text::uppercase_ratio(content) > 0.3 {
            card.add(SubScore::Spam, 0.4);
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

impl ThreatProcessor for DiscordProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
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
            vec!["report user to moderators".to_string()]
        } else {
            Vec::new()
        };
        let recommended = if threatening {
            vec![
                "do not redeem unsolicited offers".to_string(),
                "do not join unknown servers".to_string(),
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

    fn processor() -> DiscordProcessor {
        DiscordProcessor::new(true, 1000, 30).unwrap()
    }

    fn message(content: &str) -> InputEvent {
        InputEvent::new(ChannelKind::Discord, "scammer", content)
    }

    #[test]
    fn nitro_scam_is_high_threat() {
        let p = processor();
        let event = message("free nitro discord.gg/x");
        let (card, indicators) = p.analyze(&event);
        assert!(indicators.iter().any(|i| i.kind == "nitro_scam"));
        assert!(card.get(SubScore::Scam) >= 0.5);

        let response = p.process(&event);
        assert!(response.analysis.as_ref().unwrap().threat_level >= ThreatLevel::High);
    }

    #[test]
    fn nitro_phrase_without_invite_is_not_the_scam() {
        let p = processor();
        let (_, indicators) = p.analyze(&message("is nitro gift subscriptions worth it?"));
        assert!(!indicators.iter().any(|i| i.kind == "nitro_scam"));
    }

    #[test]
    fn mention_flood_touches_spam() {
        let p = processor();
        let (card, _) = p.analyze(&message("@everyone @here @admin look at this"));
        assert!(card.get(SubScore::Spam) > 0.0);
    }

    #[test]
    fn casual_chat_is_clean() {
        let p = processor();
        let response = p.process(&message("anyone up for a match tonight?"));
        assert_eq!(
            response.analysis.as_ref().unwrap().threat_level,
            ThreatLevel::None
        );
    }
}
