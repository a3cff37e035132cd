pub mod chat;
pub mod health;
pub mod webhooks;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::app::AppState;

/// Uniform webhook/API response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<Utc>,
}

impl ApiResponse {
    pub fn ok(request_id: &str, data: Value) -> Self {
        Self {
            success: true,
            request_id: request_id.to_string(),
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn err(request_id: &str, error: &str) -> Self {
        Self {
            success: false,
            request_id: request_id.to_string(),
            data: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiResponse>);

pub fn api_error(status: StatusCode, request_id: &str, message: &str) -> ApiError {
    (status, Json(ApiResponse::err(request_id, message)))
}

/// Bearer API-key gate, applied when `security.require_api_key` is set.
pub fn check_api_key(state: &AppState, headers: &HeaderMap, request_id: &str) -> Result<(), ApiError> {
    if !state.config.security.require_api_key {
        return Ok(());
    }
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(key) if state.config.security.allowed_api_keys.iter().any(|k| k == key) => Ok(()),
        _ => Err(api_error(
            StatusCode::UNAUTHORIZED,
            request_id,
            "missing or unknown API key",
        )),
    }
}
