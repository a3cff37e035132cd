//! OpenWebUI-compatible chat proxy: POST /api/chat/completions.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::warn;

use fr0g_clients::chat::ChatCompletionRequest;
use fr0g_clients::ClientError;

use crate::app::AppState;
use crate::http::{api_error, check_api_key, ApiError, ApiResponse};

/// Validates the request, folds the persona prompt into the message list,
/// and forwards upstream.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    check_api_key(&state, &headers, &request_id)?;

    match state.chat.completion(request).await {
        Ok(response) => Ok(Json(serde_json::to_value(response).map_err(|_| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, &request_id, "internal error")
        })?)),
        Err(ClientError::InvalidRequest(reason)) => {
            Err(api_error(StatusCode::BAD_REQUEST, &request_id, &reason))
        }
        Err(ClientError::RateLimited) => Err(api_error(
            StatusCode::TOO_MANY_REQUESTS,
            &request_id,
            "upstream rate limit",
        )),
        Err(ClientError::Transport(e)) => {
            warn!(error = %e, "chat upstream unreachable");
            Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                &request_id,
                "chat upstream unavailable",
            ))
        }
        Err(e) => {
            warn!(error = %e, "chat completion failed");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &request_id,
                "chat completion failed",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use fr0g_clients::chat::{ChatCompletionRequest, ChatMessage};

    /// The proxy contract: a persona prompt with no existing system message
    /// becomes messages[0] and the field itself is stripped.
    #[test]
    fn persona_prompt_insertion_contract() {
        let mut request = ChatCompletionRequest {
            model: "gpt-local".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: None,
            max_tokens: None,
            persona_prompt: Some("You are a helpful assistant.".to_string()),
        };
        request.apply_persona_prompt();
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, "You are a helpful assistant.");
        let wire = serde_json::to_value(&request).unwrap();
        assert!(wire.get("persona_prompt").is_none());
    }
}
