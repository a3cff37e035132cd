//! IRC threat processor. Uses the gentler ladder: IRC noise is constant and
//! the channel carries less monetisable payload than mail or SMS.

use tokio_util::sync::CancellationToken;

use fr0g_core::types::{ChannelKind, InputEvent, InputEventResponse, ThreatIndicator};

use crate::error::Result;
use crate::processor::{ProcessorCore, ThreatProcessor};
use crate::score::{ScoreCard, SubScore, GENTLE_LADDER};
use crate::text;

const MALWARE_EXTENSIONS: &[&str] = &[".exe", ".scr", ".bat", ".vbs"];
const SPAM_KEYWORDS: &[&str] = &["free download", "cheap", "promo", "xdcc send"];

pub struct IrcProcessor {
    core: ProcessorCore,
}

impl IrcProcessor {
    pub fn new(enabled: bool, history_size: usize, sweep_interval_secs: u64) -> Result<Self> {
        Ok(Self {
            core: ProcessorCore::new(
                ChannelKind::Irc,
                enabled,
                GENTLE_LADDER,
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
        let lowered = content.to_lowercase();

        if self.core.patterns.has_shortened_url(content) {
            card.add(SubScore::Phishing, 0.5);
            indicators.push(ThreatIndicator {
                kind: "phishing_url".to_string(),
                value: "shortened link".to_string(),
                confidence: 0.8,
                description: "shortened URL hides the destination".to_string(),
            });
        }

        let binaries = MALWARE_EXTENSIONS
            .iter()
            .filter(|ext| lowered.contains(*ext))
            .count();
        if binaries > 0 && self.core.patterns.any_url.is_match(content) {
            card.add(SubScore::Malware, 0.6);
            indicators.push(ThreatIndicator {
                kind: "malware_link".to_string(),
                value: format!("{binaries} executable reference(s)"),
                confidence: 0.75,
                description: "link to an executable payload".to_string(),
            });
        }

        let spam_hits = text::keyword_hits(content, SPAM_KEYWORDS);
        if spam_hits > 0 {
            card.add(SubScore::Spam, spam_hits as f64 * 0.3);
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
        if recent > 50 {
            card.add(SubScore::Bot, 0.3);
        }

        (card, indicators)
    }
}

impl ThreatProcessor for IrcProcessor {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Irc
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
            vec!["ignore nick".to_string(), "notify channel operators".to_string()]
        } else {
            Vec::new()
        };
        let recommended = if threatening {
            vec!["do not download offered files".to_string()]
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

    fn processor() -> IrcProcessor {
        IrcProcessor::new(true, 1000, 30).unwrap()
    }

    fn message(content: &str) -> InputEvent {
        InputEvent::new(ChannelKind::Irc, "spambot", content)
    }

    #[test]
    fn executable_link_touches_malware() {
        let p = processor();
        let (card, indicators) =
            p.analyze(&message("grab http://warez.example/setup.exe before it's gone"));
        assert!(card.get(SubScore::Malware) > 0.0);
        assert!(indicators.iter().any(|i| i.kind == "malware_link"));
    }

    #[test]
    fn extension_mention_without_link_is_not_malware() {
        let p = processor();
        let (card, _) = p.analyze(&message("the installer crashed, setup.exe kept hanging"));
        assert_eq!(card.get(SubScore::Malware), 0.0);
    }

    #[test]
    fn shouted_promo_accumulates_spam() {
        let p = processor();
        let event = message("FREE DOWNLOAD!! CHEAP PROMO!! bit.ly/deal");
        let response = p.process(&event);
        let analysis = response.analysis.as_ref().unwrap();
        assert!(analysis.threat_level >= ThreatLevel::Medium);
        assert!(analysis.threat_types.iter().any(|t| t == "spam"));
    }

    #[test]
    fn ordinary_chat_is_clean() {
        let p = processor();
        let response = p.process(&message("the patch for the parser just landed"));
        assert_eq!(
            response.analysis.as_ref().unwrap().threat_level,
            ThreatLevel::None
        );
    }
}
