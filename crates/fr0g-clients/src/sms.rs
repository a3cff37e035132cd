//! Outbound SMS gateway client with exponential-backoff retry and delivery
//! tracking.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fr0g_core::config::SmsClientConfig;

use crate::delivery::{DeliveryState, DeliveryTracker};
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize)]
pub struct SmsSendRequest {
    pub to: String,
    pub from: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsSendResponse {
    pub message_id: String,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsDeliveryStatus {
    pub message_id: String,
    /// One of `sent`, `delivered`, `failed`.
    pub status: String,
    #[serde(default)]
    pub delivered_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub attempt_count: u32,
}

/// Wire transport behind the client, so gateway behaviour can be exercised
/// without a network.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, request: &SmsSendRequest) -> Result<SmsSendResponse>;
    async fn status(&self, message_id: &str) -> Result<SmsDeliveryStatus>;
}

/// reqwest-backed transport speaking the gateway's JSON contract.
pub struct HttpSmsTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpSmsTransport {
    pub fn new(config: &SmsClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                fr0g_core::config::OUTBOUND_HTTP_TIMEOUT_SECS,
            ))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SmsTransport for HttpSmsTransport {
    async fn send(&self, request: &SmsSendRequest) -> Result<SmsSendResponse> {
        let url = format!("{}/sms/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, message });
        }
        response
            .json::<SmsSendResponse>()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn status(&self, message_id: &str) -> Result<SmsDeliveryStatus> {
        let url = format!("{}/sms/status/{}", self.base_url, message_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, message });
        }
        response
            .json::<SmsDeliveryStatus>()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

/// Retrying SMS client. Server-side errors and transport failures retry with
/// exponential backoff; 4xx responses fail immediately.
pub struct SmsClient {
    transport: Arc<dyn SmsTransport>,
    policy: RetryPolicy,
    tracker: Arc<DeliveryTracker>,
}

impl SmsClient {
    pub fn new(config: &SmsClientConfig, tracker: Arc<DeliveryTracker>) -> Result<Self> {
        Ok(Self {
            transport: Arc::new(HttpSmsTransport::new(config)?),
            policy: RetryPolicy::new(&config.retry),
            tracker,
        })
    }

    pub fn with_transport(
        transport: Arc<dyn SmsTransport>,
        policy: RetryPolicy,
        tracker: Arc<DeliveryTracker>,
    ) -> Self {
        Self {
            transport,
            policy,
            tracker,
        }
    }

    /// Send one message, tracked under `command_id`. Returns the gateway's
    /// message id along with how many retries were needed.
    pub async fn send(
        &self,
        command_id: &str,
        request: SmsSendRequest,
        cancel: &CancellationToken,
    ) -> Result<SmsSendResponse> {
        self.tracker.track(command_id)?;

        let mut attempt: u32 = 0;
        loop {
            self.tracker.record_attempt(command_id);
            match self.transport.send(&request).await {
                Ok(response) => {
                    info!(command_id, message_id = %response.message_id, retries = attempt, "sms accepted by gateway");
                    self.tracker
                        .update(command_id, DeliveryState::Sent, None)?;
                    return Ok(response);
                }
                Err(e) if !is_retryable(&e) || attempt >= self.policy.max_retries() => {
                    warn!(command_id, attempts = attempt + 1, error = %e, "sms send failed");
                    self.tracker
                        .update(command_id, DeliveryState::Failed, Some(e.to_string()))?;
                    return Err(ClientError::Exhausted {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay(attempt);
                    debug!(command_id, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying sms send");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            self.tracker.update(
                                command_id,
                                DeliveryState::Failed,
                                Some("cancelled".to_string()),
                            )?;
                            return Err(ClientError::Cancelled);
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Poll the gateway for delivery status and fold the answer into the
    /// tracker.
    pub async fn refresh_status(&self, command_id: &str, message_id: &str) -> Result<DeliveryState> {
        let status = self.transport.status(message_id).await?;
        let state = match status.status.as_str() {
            "delivered" => DeliveryState::Delivered,
            "failed" => DeliveryState::Failed,
            "sent" => DeliveryState::Sent,
            other => {
                return Err(ClientError::Parse(format!(
                    "unknown delivery status '{other}'"
                )))
            }
        };
        if state != DeliveryState::Sent {
            self.tracker
                .update(command_id, state, status.error_message.clone())?;
        }
        Ok(state)
    }

    pub fn tracker(&self) -> &Arc<DeliveryTracker> {
        &self.tracker
    }
}

/// 5xx and transport-level failures retry; everything else is permanent.
fn is_retryable(error: &ClientError) -> bool {
    match error {
        ClientError::Api { status, .. } => *status >= 500,
        ClientError::Transport(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with 500 a configurable number of times, then succeeds.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SmsTransport for FlakyTransport {
        async fn send(&self, _request: &SmsSendRequest) -> Result<SmsSendResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ClientError::Api {
                    status: 500,
                    message: "upstream blew up".to_string(),
                })
            } else {
                Ok(SmsSendResponse {
                    message_id: "m1".to_string(),
                    status: "sent".to_string(),
                    error: None,
                })
            }
        }

        async fn status(&self, message_id: &str) -> Result<SmsDeliveryStatus> {
            Ok(SmsDeliveryStatus {
                message_id: message_id.to_string(),
                status: "delivered".to_string(),
                delivered_at: Some(chrono::Utc::now().to_rfc3339()),
                error_message: None,
                attempt_count: 1,
            })
        }
    }

    fn request() -> SmsSendRequest {
        SmsSendRequest {
            to: "+15550001".to_string(),
            from: "+15550002".to_string(),
            message: "hello".to_string(),
        }
    }

    fn client(failures: u32, max_retries: u32) -> SmsClient {
        let policy = RetryPolicy::new(&fr0g_core::config::RetryConfig {
            factor: 2.0,
            initial_delay_ms: 100,
            max_delay_ms: 400,
            max_retries,
        });
        SmsClient::with_transport(
            Arc::new(FlakyTransport {
                failures,
                calls: AtomicU32::new(0),
            }),
            policy,
            Arc::new(DeliveryTracker::new(60_000)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_then_success_retries_twice() {
        let client = client(2, 3);
        let cancel = CancellationToken::new();
        let response = client.send("cmd-1", request(), &cancel).await.unwrap();
        assert_eq!(response.message_id, "m1");

        let status = client.tracker().get("cmd-1").unwrap();
        assert_eq!(status.status, DeliveryState::Sent);
        // Initial attempt + 2 retries.
        assert_eq!(status.attempt_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_mark_failed() {
        let client = client(10, 2);
        let cancel = CancellationToken::new();
        let result = client.send("cmd-1", request(), &cancel).await;
        assert!(matches!(
            result,
            Err(ClientError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(
            client.tracker().get("cmd-1").unwrap().status,
            DeliveryState::Failed
        );
    }

    #[tokio::test]
    async fn client_errors_do_not_retry() {
        struct Rejecting;
        #[async_trait]
        impl SmsTransport for Rejecting {
            async fn send(&self, _request: &SmsSendRequest) -> Result<SmsSendResponse> {
                Err(ClientError::Api {
                    status: 400,
                    message: "bad number".to_string(),
                })
            }
            async fn status(&self, _message_id: &str) -> Result<SmsDeliveryStatus> {
                unreachable!()
            }
        }
        let client = SmsClient::with_transport(
            Arc::new(Rejecting),
            RetryPolicy::default(),
            Arc::new(DeliveryTracker::new(60_000)),
        );
        let result = client
            .send("cmd-1", request(), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Exhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn refresh_status_advances_tracker() {
        let client = client(0, 3);
        let cancel = CancellationToken::new();
        client.send("cmd-1", request(), &cancel).await.unwrap();
        let state = client.refresh_status("cmd-1", "m1").await.unwrap();
        assert_eq!(state, DeliveryState::Delivered);
        assert_eq!(
            client.tracker().get("cmd-1").unwrap().status,
            DeliveryState::Delivered
        );
    }
}
