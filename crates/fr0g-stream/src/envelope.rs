//! Wire envelopes for the MCP ↔ I/O duplex stream.
//!
//! Wire: `{ "envelope_id": "...", "timestamp": "...", "payload_kind":
//! "input_event", "payload": {...} }`. Heartbeats are envelopes with a null
//! payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fr0g_core::types::{InputEvent, OutputCommand, ThreatAnalysisResult};

use crate::error::{Result, StreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    InputEvent,
    OutputCommand,
    ThreatAnalysis,
    Heartbeat,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputEvent => write!(f, "input_event"),
            Self::OutputCommand => write!(f, "output_command"),
            Self::ThreatAnalysis => write!(f, "threat_analysis"),
            Self::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub envelope_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload_kind: PayloadKind,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    fn new(payload_kind: PayloadKind, payload: Value) -> Self {
        Self {
            envelope_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            payload_kind,
            payload,
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(PayloadKind::Heartbeat, Value::Null)
    }

    pub fn input_event(event: &InputEvent) -> Result<Self> {
        Ok(Self::new(
            PayloadKind::InputEvent,
            serde_json::to_value(event)?,
        ))
    }

    pub fn output_command(command: &OutputCommand) -> Result<Self> {
        Ok(Self::new(
            PayloadKind::OutputCommand,
            serde_json::to_value(command)?,
        ))
    }

    pub fn threat_analysis(analysis: &ThreatAnalysisResult) -> Result<Self> {
        Ok(Self::new(
            PayloadKind::ThreatAnalysis,
            serde_json::to_value(analysis)?,
        ))
    }

    pub fn is_heartbeat(&self) -> bool {
        self.payload_kind == PayloadKind::Heartbeat
    }

    pub fn as_input_event(&self) -> Result<InputEvent> {
        if self.payload_kind != PayloadKind::InputEvent {
            return Err(StreamError::UnexpectedPayload(self.payload_kind.to_string()));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn as_output_command(&self) -> Result<OutputCommand> {
        if self.payload_kind != PayloadKind::OutputCommand {
            return Err(StreamError::UnexpectedPayload(self.payload_kind.to_string()));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fr0g_core::types::{ChannelKind, CommandKind};

    #[test]
    fn event_envelope_round_trips() {
        let event = InputEvent::new(ChannelKind::Sms, "+1555", "hello");
        let envelope = Envelope::input_event(&event).unwrap();
        let wire = envelope.encode().unwrap();
        let decoded = Envelope::decode(&wire).unwrap();
        assert_eq!(decoded.payload_kind, PayloadKind::InputEvent);
        let recovered = decoded.as_input_event().unwrap();
        assert_eq!(recovered.id, event.id);
        assert_eq!(recovered.content, "hello");
    }

    #[test]
    fn command_envelope_keeps_correlation() {
        let command = OutputCommand::for_event("ev-9", CommandKind::Alert, "sink", "text");
        let envelope = Envelope::output_command(&command).unwrap();
        let recovered = envelope.as_output_command().unwrap();
        assert_eq!(
            recovered.metadata.get("event_id").and_then(|v| v.as_str()),
            Some("ev-9")
        );
    }

    #[test]
    fn heartbeat_has_null_payload() {
        let hb = Envelope::heartbeat();
        assert!(hb.is_heartbeat());
        assert!(hb.payload.is_null());
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let hb = Envelope::heartbeat();
        assert!(matches!(
            hb.as_input_event(),
            Err(StreamError::UnexpectedPayload(_))
        ));
    }
}
