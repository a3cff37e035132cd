//! Sub-score accumulation and the confidence → threat-level ladders.

use std::collections::BTreeMap;

use fr0g_core::types::ThreatLevel;

/// The sub-score axes a channel may populate. Channels omit axes that are
/// irrelevant to them; only populated axes enter the confidence mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubScore {
    Spam,
    Phishing,
    Malware,
    Spoofing,
    Bot,
    Scam,
    SocialEng,
    Robocall,
    EmotionalManip,
}

impl SubScore {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Phishing => "phishing",
            Self::Malware => "malware",
            Self::Spoofing => "spoofing",
            Self::Bot => "bot",
            Self::Scam => "scam",
            Self::SocialEng => "social_engineering",
            Self::Robocall => "robocall",
            Self::EmotionalManip => "emotional_manipulation",
        }
    }
}

/// Descending confidence cut-offs for critical / high / medium / low.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ladder(pub [f64; 4]);

/// Ladder used by SMS, voice, and Discord.
pub const STANDARD_LADDER: Ladder = Ladder([0.8, 0.6, 0.4, 0.2]);
/// Gentler ladder used by e-mail and IRC.
pub const GENTLE_LADDER: Ladder = Ladder([0.7, 0.5, 0.3, 0.15]);

impl Ladder {
    /// Map a confidence to a level. Monotone: a higher confidence never
    /// yields a lower level.
    pub fn level(&self, confidence: f64) -> ThreatLevel {
        let [critical, high, medium, low] = self.0;
        if confidence >= critical {
            ThreatLevel::Critical
        } else if confidence >= high {
            ThreatLevel::High
        } else if confidence >= medium {
            ThreatLevel::Medium
        } else if confidence >= low {
            ThreatLevel::Low
        } else {
            ThreatLevel::None
        }
    }
}

/// Accumulates sub-scores for one event. Every axis clamps at 1.0.
#[derive(Debug, Clone, Default)]
pub struct ScoreCard {
    scores: BTreeMap<SubScore, f64>,
}

impl ScoreCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an increment to one axis, clamping the axis at 1.0. An axis
    /// becomes "applicable" on its first touch, even with a zero increment.
    pub fn add(&mut self, axis: SubScore, increment: f64) {
        let slot = self.scores.entry(axis).or_insert(0.0);
        *slot = (*slot + increment).min(1.0);
    }

    pub fn get(&self, axis: SubScore) -> f64 {
        self.scores.get(&axis).copied().unwrap_or(0.0)
    }

    /// Arithmetic mean of the applicable axes, capped at 1.0. Zero when no
    /// axis was touched.
    pub fn confidence(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.scores.values().sum();
        (sum / self.scores.len() as f64).min(1.0)
    }

    /// Axes scoring above zero, as wire labels.
    pub fn threat_types(&self) -> Vec<String> {
        self.scores
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(k, _)| k.label().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_clamp_at_one() {
        let mut card = ScoreCard::new();
        card.add(SubScore::Spam, 0.7);
        card.add(SubScore::Spam, 0.7);
        assert_eq!(card.get(SubScore::Spam), 1.0);
    }

    #[test]
    fn confidence_is_mean_of_touched_axes() {
        let mut card = ScoreCard::new();
        card.add(SubScore::Spam, 0.8);
        card.add(SubScore::Phishing, 0.4);
        assert!((card.confidence() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn untouched_card_has_zero_confidence() {
        assert_eq!(ScoreCard::new().confidence(), 0.0);
    }

    #[test]
    fn standard_ladder_boundaries() {
        assert_eq!(STANDARD_LADDER.level(0.8), ThreatLevel::Critical);
        assert_eq!(STANDARD_LADDER.level(0.79), ThreatLevel::High);
        assert_eq!(STANDARD_LADDER.level(0.6), ThreatLevel::High);
        assert_eq!(STANDARD_LADDER.level(0.4), ThreatLevel::Medium);
        assert_eq!(STANDARD_LADDER.level(0.2), ThreatLevel::Low);
        assert_eq!(STANDARD_LADDER.level(0.19), ThreatLevel::None);
    }

    #[test]
    fn gentle_ladder_boundaries() {
        assert_eq!(GENTLE_LADDER.level(0.7), ThreatLevel::Critical);
        assert_eq!(GENTLE_LADDER.level(0.5), ThreatLevel::High);
        assert_eq!(GENTLE_LADDER.level(0.3), ThreatLevel::Medium);
        assert_eq!(GENTLE_LADDER.level(0.15), ThreatLevel::Low);
        assert_eq!(GENTLE_LADDER.level(0.1), ThreatLevel::None);
    }

    #[test]
    fn ladders_are_monotone_in_confidence() {
        for ladder in [STANDARD_LADDER, GENTLE_LADDER] {
            let mut previous = ThreatLevel::None;
            for step in 0..=100 {
                let confidence = step as f64 / 100.0;
                let level = ladder.level(confidence);
                assert!(level >= previous, "ladder regressed at {confidence}");
                previous = level;
            }
        }
    }
}
