//! End-to-end webhook flow against the assembled router: normalisation,
//! first-pass classification, community review, and response synthesis.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use fr0g_core::config::Fr0gConfig;
use fr0g_gateway::app::{build_router, AppState};

async fn router_with(config: Fr0gConfig) -> axum::Router {
    let (state, _triggers) = AppState::build(config).expect("state builds");
    build_router(state)
}

async fn router() -> axum::Router {
    router_with(Fr0gConfig::default()).await
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn sms_scam_webhook_produces_alert_and_ack() {
    let app = router().await;
    let response = app
        .oneshot(post_json(
            "/webhook/sms",
            json!({
                "id": "wh-1",
                "from": "+1555",
                "to": "+1666",
                "body": "URGENT! You've won a FREE prize! Click bit.ly/x",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    let data = &body["data"];
    assert_eq!(data["processed"], json!(true));

    let level = data["analysis"]["threat_level"].as_str().unwrap();
    assert!(level == "high" || level == "critical", "got {level}");

    let kinds: Vec<&str> = data["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"alert"));
    assert!(kinds.contains(&"sms"), "acknowledgement missing: {kinds:?}");
}

#[tokio::test]
async fn phishing_email_webhook_reaches_critical_with_quarantine() {
    let app = router().await;
    let response = app
        .oneshot(post_json(
            "/webhook/email",
            json!({
                "id": "wh-2",
                "from": "security@bank-fake.com",
                "to": ["victim@example.org"],
                "subject": "URGENT: Account Security Alert",
                "body": "verify your credentials at http://fake-bank-security.com/login",
                "headers": {},
                "timestamp": "2026-08-01T10:00:00Z",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let data = &body["data"];
    assert_eq!(data["analysis"]["threat_level"], json!("critical"));

    let kinds: Vec<&str> = data["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"alert"));
    assert!(kinds.contains(&"quarantine"));
}

#[tokio::test]
async fn unknown_channel_is_404() {
    let app = router().await;
    let response = app
        .oneshot(post_json("/webhook/fax", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn malformed_envelope_is_400() {
    let app = router().await;
    let response = app
        .oneshot(post_json("/webhook/sms", json!({"id": "wh-3"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limit_surfaces_as_429() {
    let mut config = Fr0gConfig::default();
    config.security.rate_limit_requests_per_minute = 1;
    let app = router_with(config).await;

    let envelope = json!({
        "id": "wh-4",
        "from": "+1555",
        "to": "+1666",
        "body": "hello",
    });
    let first = app
        .clone()
        .oneshot(post_json("/webhook/sms", envelope.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json("/webhook/sms", envelope))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn api_key_gate_rejects_unknown_keys() {
    let mut config = Fr0gConfig::default();
    config.security.require_api_key = true;
    config.security.allowed_api_keys = vec!["secret-key".to_string()];
    let app = router_with(config).await;

    let envelope = json!({
        "id": "wh-5",
        "from": "+1555",
        "to": "+1666",
        "body": "hello",
    });

    let denied = app
        .clone()
        .oneshot(post_json("/webhook/sms", envelope.clone()))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json("/webhook/sms", envelope);
    request
        .headers_mut()
        .insert("authorization", "Bearer secret-key".parse().unwrap());
    let allowed = app.oneshot(request).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reports_service_identity() {
    let app = router().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["service"], json!("fr0g-ai-mcp"));
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn status_exposes_intelligence_snapshot() {
    let app = router().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["intelligence"]["learning_rate"].is_number());
    assert_eq!(body["system"]["active_workflows"], json!(0));
}
