//! Channel webhook ingress: POST /webhook/{channel}.
//!
//! Each channel posts its native envelope; the handler normalises it into an
//! [`InputEvent`], runs the channel's first-pass threat classification, then
//! hands the event to the workflow engine for community review and response
//! synthesis.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use fr0g_core::types::{ChannelKind, InputEvent};

use crate::app::AppState;
use crate::http::{api_error, check_api_key, ApiError, ApiResponse};

// ── Channel envelopes ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SmsEnvelope {
    id: String,
    from: String,
    to: String,
    body: String,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct VoiceEnvelope {
    id: String,
    caller_id: String,
    recipient_id: String,
    start_time: String,
    end_time: String,
    duration_ms: u64,
    transcript: String,
    #[serde(default)]
    audio_file: Option<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct IrcEnvelope {
    id: String,
    server: String,
    channel: String,
    nick: String,
    message: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct DiscordEnvelope {
    id: String,
    guild_id: String,
    channel_id: String,
    user_id: String,
    username: String,
    content: String,
    message_type: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct EmailEnvelope {
    id: String,
    from: String,
    to: Vec<String>,
    subject: String,
    body: String,
    #[serde(default)]
    headers: serde_json::Map<String, Value>,
    timestamp: String,
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// POST /webhook/{channel}
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<ApiResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();

    check_api_key(&state, &headers, &request_id)?;

    let kind: ChannelKind = channel.parse().map_err(|_| {
        warn!(%channel, "webhook for unknown channel");
        api_error(StatusCode::NOT_FOUND, &request_id, "unknown channel")
    })?;

    if !state.limiter.allow(&channel) {
        return Err(api_error(
            StatusCode::TOO_MANY_REQUESTS,
            &request_id,
            "rate limit exceeded",
        ));
    }

    let event = normalize(kind, &body).map_err(|e| {
        warn!(%channel, error = %e, "malformed webhook envelope");
        api_error(StatusCode::BAD_REQUEST, &request_id, &e)
    })?;

    let processor = state
        .processors
        .get(kind)
        .filter(|p| p.enabled())
        .ok_or_else(|| {
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                &request_id,
                "channel processor is disabled",
            )
        })?;

    info!(%channel, event_id = %event.id, source = %event.source, "webhook event accepted");

    // First pass: channel-local classification. Never fails the event.
    let first_pass = processor.process(&event);

    // Second pass: community review + response synthesis.
    let mut response = state
        .workflows
        .process_input_event(&event, first_pass.analysis.as_ref(), &state.cancel)
        .await
        .map_err(|e| {
            warn!(event_id = %event.id, error = %e, "workflow failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, &request_id, "internal error")
        })?;

    // The channel's own actions (alerts, quarantines) ride alongside the
    // workflow's synthesized ones.
    let mut actions = first_pass.actions;
    actions.append(&mut response.actions);
    response.actions = actions;

    let data = serde_json::to_value(&response)
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, &request_id, "internal error"))?;
    Ok(Json(ApiResponse::ok(&request_id, data)))
}

/// Decode a channel-native envelope into the common event model.
fn normalize(kind: ChannelKind, body: &[u8]) -> Result<InputEvent, String> {
    match kind {
        ChannelKind::Sms => {
            let envelope: SmsEnvelope =
                serde_json::from_slice(body).map_err(|e| e.to_string())?;
            let mut event = InputEvent::new(kind, envelope.from, envelope.body)
                .with_metadata("webhook_id", json!(envelope.id))
                .with_metadata("to", json!(envelope.to));
            event.metadata.extend(envelope.metadata);
            Ok(event)
        }
        ChannelKind::Voice => {
            let envelope: VoiceEnvelope =
                serde_json::from_slice(body).map_err(|e| e.to_string())?;
            // Voice events carry an empty content body; the transcript and
            // call timing ride in metadata.
            let mut event = InputEvent::new(kind, envelope.caller_id, "")
                .with_metadata("webhook_id", json!(envelope.id))
                .with_metadata("recipient_id", json!(envelope.recipient_id))
                .with_metadata("start_time", json!(envelope.start_time))
                .with_metadata("end_time", json!(envelope.end_time))
                .with_metadata("duration_ms", json!(envelope.duration_ms))
                .with_metadata("transcript", json!(envelope.transcript));
            if let Some(audio) = envelope.audio_file {
                event = event.with_metadata("audio_file", json!(audio));
            }
            event.metadata.extend(envelope.metadata);
            Ok(event)
        }
        ChannelKind::Irc => {
            let envelope: IrcEnvelope =
                serde_json::from_slice(body).map_err(|e| e.to_string())?;
            Ok(InputEvent::new(kind, envelope.nick, envelope.message)
                .with_metadata("webhook_id", json!(envelope.id))
                .with_metadata("server", json!(envelope.server))
                .with_metadata("channel", json!(envelope.channel))
                .with_metadata("received_at", json!(envelope.timestamp)))
        }
        ChannelKind::Discord => {
            let envelope: DiscordEnvelope =
                serde_json::from_slice(body).map_err(|e| e.to_string())?;
            Ok(InputEvent::new(kind, envelope.username, envelope.content)
                .with_metadata("webhook_id", json!(envelope.id))
                .with_metadata("guild_id", json!(envelope.guild_id))
                .with_metadata("channel_id", json!(envelope.channel_id))
                .with_metadata("user_id", json!(envelope.user_id))
                .with_metadata("message_type", json!(envelope.message_type))
                .with_metadata("received_at", json!(envelope.timestamp)))
        }
        ChannelKind::Email => {
            let envelope: EmailEnvelope =
                serde_json::from_slice(body).map_err(|e| e.to_string())?;
            Ok(InputEvent::new(kind, envelope.from, envelope.body)
                .with_metadata("webhook_id", json!(envelope.id))
                .with_metadata("to", json!(envelope.to))
                .with_metadata("subject", json!(envelope.subject))
                .with_metadata("headers", json!(envelope.headers))
                .with_metadata("received_at", json!(envelope.timestamp)))
        }
        ChannelKind::Generic => {
            let payload: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
            Ok(
                InputEvent::new(kind, "generic", payload.to_string())
                    .with_metadata("payload", payload),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sms_envelope_normalises_to_event() {
        let body = serde_json::to_vec(&json!({
            "id": "wh-1",
            "from": "+1555",
            "to": "+1666",
            "body": "hello",
        }))
        .unwrap();
        let event = normalize(ChannelKind::Sms, &body).unwrap();
        assert_eq!(event.kind, ChannelKind::Sms);
        assert_eq!(event.source, "+1555");
        assert_eq!(event.content, "hello");
        assert_eq!(
            event.metadata.get("webhook_id").and_then(|v| v.as_str()),
            Some("wh-1")
        );
    }

    #[test]
    fn voice_envelope_keeps_transcript_in_metadata() {
        let body = serde_json::to_vec(&json!({
            "id": "wh-2",
            "caller_id": "+1555",
            "recipient_id": "+1666",
            "start_time": "2026-08-01T10:00:00Z",
            "end_time": "2026-08-01T10:00:15Z",
            "duration_ms": 15_000,
            "transcript": "press 1 now",
        }))
        .unwrap();
        let event = normalize(ChannelKind::Voice, &body).unwrap();
        assert!(event.content.is_empty());
        assert_eq!(
            event.metadata.get("transcript").and_then(|v| v.as_str()),
            Some("press 1 now")
        );
        assert_eq!(
            event.metadata.get("duration_ms").and_then(|v| v.as_u64()),
            Some(15_000)
        );
    }

    #[test]
    fn email_envelope_collects_recipients_and_subject() {
        let body = serde_json::to_vec(&json!({
            "id": "wh-3",
            "from": "security@bank-fake.com",
            "to": ["victim@example.org"],
            "subject": "URGENT",
            "body": "verify your credentials",
            "headers": {},
            "timestamp": "2026-08-01T10:00:00Z",
        }))
        .unwrap();
        let event = normalize(ChannelKind::Email, &body).unwrap();
        assert_eq!(event.source, "security@bank-fake.com");
        assert_eq!(
            event.metadata.get("subject").and_then(|v| v.as_str()),
            Some("URGENT")
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let body = serde_json::to_vec(&json!({ "id": "wh-4", "from": "+1555" })).unwrap();
        assert!(normalize(ChannelKind::Sms, &body).is_err());
    }

    #[test]
    fn unknown_channel_does_not_parse() {
        assert!("carrier-pigeon".parse::<ChannelKind>().is_err());
    }
}
