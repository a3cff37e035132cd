//! AI community client contract plus the AIP-backed HTTP implementation.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use fr0g_core::config::OUTBOUND_HTTP_TIMEOUT_SECS;

use crate::error::{CommunityError, Result};
use crate::types::{Community, CommunityReview, PersonaSummary, ReviewStatus};

/// Black-box contract the workflow engine programs against. Implementations
/// range from the deterministic mock to real model-backed reviewers.
#[async_trait]
pub trait CommunityClient: Send + Sync {
    async fn create_community(&self, topic: &str, persona_count: usize) -> Result<Community>;

    async fn submit_for_review(
        &self,
        community_id: &str,
        content: &str,
    ) -> Result<CommunityReview>;

    async fn get_review_status(&self, review_id: &str) -> Result<ReviewStatus>;

    async fn get_community_members(&self, community_id: &str) -> Result<Vec<PersonaSummary>>;
}

/// HTTP client for the persona CRUD service (AIP).
pub struct HttpCommunityClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCommunityClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(OUTBOUND_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CommunityError::Api { status, message });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CommunityError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CommunityClient for HttpCommunityClient {
    async fn create_community(&self, topic: &str, persona_count: usize) -> Result<Community> {
        debug!(topic, persona_count, "creating persona community");
        let url = format!("{}/communities", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "topic": topic, "persona_count": persona_count }))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn submit_for_review(
        &self,
        community_id: &str,
        content: &str,
    ) -> Result<CommunityReview> {
        let url = format!("{}/communities/{community_id}/reviews", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "content": content }))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn get_review_status(&self, review_id: &str) -> Result<ReviewStatus> {
        let url = format!("{}/reviews/{review_id}/status", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }

    async fn get_community_members(&self, community_id: &str) -> Result<Vec<PersonaSummary>> {
        let url = format!("{}/communities/{community_id}/members", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::parse(response).await
    }
}
