use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata carried by events, commands, and analyses.
pub type Metadata = serde_json::Map<String, Value>;

/// The channel an event arrived on (or a command is destined for).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Sms,
    Voice,
    Irc,
    Discord,
    Email,
    Generic,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sms => write!(f, "sms"),
            Self::Voice => write!(f, "voice"),
            Self::Irc => write!(f, "irc"),
            Self::Discord => write!(f, "discord"),
            Self::Email => write!(f, "email"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Self::Sms),
            "voice" => Ok(Self::Voice),
            "irc" => Ok(Self::Irc),
            "discord" => Ok(Self::Discord),
            "email" => Ok(Self::Email),
            "generic" => Ok(Self::Generic),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// A normalized inbound item from any threat vector.
///
/// Immutable once built: processors construct one per webhook payload and
/// everything downstream shares it read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEvent {
    /// Unique per process lifetime (UUID v4).
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Free-form origin identifier (phone number, nick, e-mail address, …).
    pub source: String,
    /// UTF-8 text content. Empty is allowed for voice (transcript rides in
    /// metadata alongside call timing).
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
    /// Higher is more urgent.
    #[serde(default)]
    pub priority: i32,
}

impl InputEvent {
    /// Build a new event with a fresh id and the current acquisition time.
    pub fn new(kind: ChannelKind, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            source: source.into(),
            content: content.into(),
            metadata: Metadata::new(),
            timestamp: Utc::now(),
            priority: 0,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Result of processing one [`InputEvent`]. Exactly one response exists per
/// event; failures are folded into `processed = false` + `metadata.error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEventResponse {
    pub event_id: String,
    pub processed: bool,
    #[serde(default)]
    pub actions: Vec<OutputCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ThreatAnalysisResult>,
    #[serde(default)]
    pub metadata: Metadata,
    pub processed_at: DateTime<Utc>,
}

/// What an output command asks the I/O tier to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Alert,
    Quarantine,
    Reply,
    Log,
    Sms,
    Voice,
    Irc,
    Discord,
    Email,
}

impl From<ChannelKind> for CommandKind {
    /// The acknowledgement command mirrors the originating channel.
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Sms => CommandKind::Sms,
            ChannelKind::Voice => CommandKind::Voice,
            ChannelKind::Irc => CommandKind::Irc,
            ChannelKind::Discord => CommandKind::Discord,
            ChannelKind::Email => CommandKind::Email,
            ChannelKind::Generic => CommandKind::Log,
        }
    }
}

/// Outbound action emitted back through the I/O tier (alert, quarantine,
/// reply, …). `metadata.event_id` always names the originating event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub target: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub priority: i32,
}

impl OutputCommand {
    /// Build a command correlated to the event it answers.
    pub fn for_event(
        event_id: &str,
        kind: CommandKind,
        target: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("event_id".to_string(), Value::String(event_id.to_string()));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            target: target.into(),
            content: content.into(),
            metadata,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Severity ladder for a threat classification. Ordered so a higher
/// confidence can never map to a lower level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One concrete signal contributing to a classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIndicator {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    /// 0.0–1.0.
    pub confidence: f64,
    pub description: String,
}

/// First-pass (or fused) threat classification for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAnalysisResult {
    pub event_id: String,
    pub threat_level: ThreatLevel,
    /// 0.0–1.0.
    pub threat_score: f64,
    #[serde(default)]
    pub threat_types: Vec<String>,
    #[serde(default)]
    pub indicators: Vec<ThreatIndicator>,
    #[serde(default)]
    pub mitigation: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
}

impl ThreatAnalysisResult {
    pub fn clean(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            threat_level: ThreatLevel::None,
            threat_score: 0.0,
            threat_types: Vec::new(),
            indicators: Vec::new(),
            mitigation: Vec::new(),
            confidence: 0.0,
            recommended_actions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_ordering_is_monotone() {
        assert!(ThreatLevel::None < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn command_for_event_carries_correlation() {
        let cmd = OutputCommand::for_event("ev-1", CommandKind::Alert, "security", "summary");
        assert_eq!(
            cmd.metadata.get("event_id").and_then(|v| v.as_str()),
            Some("ev-1")
        );
    }

    #[test]
    fn channel_kind_round_trips_through_str() {
        for kind in ["sms", "voice", "irc", "discord", "email", "generic"] {
            let parsed: ChannelKind = kind.parse().unwrap();
            assert_eq!(parsed.to_string(), kind);
        }
    }
}
