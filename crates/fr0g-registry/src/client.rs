//! Service registry HTTP client: register/deregister, health queries, and
//! round-robin endpoint resolution over the healthy instance set.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use fr0g_core::config::{ServiceRegistryConfig, REGISTRY_HTTP_TIMEOUT_SECS};
use fr0g_core::validation::validate_health_response;

use crate::error::{RegistryError, Result};
use crate::types::{HealthServiceEntry, ServiceInfo};

/// Anything able to turn a service name into an endpoint URL. The discovery
/// cache depends on this seam rather than on the HTTP client directly.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<String>;
}

pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    /// Round-robin cursor over healthy instances.
    cursor: AtomicUsize,
}

impl RegistryClient {
    pub fn new(config: &ServiceRegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REGISTRY_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// `PUT /v1/agent/service/register` with the instance description.
    pub async fn register(&self, info: &ServiceInfo) -> Result<()> {
        let url = format!("{}/v1/agent/service/register", self.base_url);
        let response = self.client.put(&url).json(info).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api { status, message });
        }
        info!(service_id = %info.id, service = %info.name, "registered with service registry");
        Ok(())
    }

    /// `PUT /v1/agent/service/deregister/{id}`.
    pub async fn deregister(&self, id: &str) -> Result<()> {
        let url = format!("{}/v1/agent/service/deregister/{id}", self.base_url);
        let response = self.client.put(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api { status, message });
        }
        info!(service_id = %id, "deregistered from service registry");
        Ok(())
    }

    /// `GET /v1/health/service/{name}?passing=true`: instances whose latest
    /// check passed. Entries with a contradictory health payload (healthy
    /// status plus a non-empty error) are dropped.
    pub async fn get_healthy_services(&self, name: &str) -> Result<Vec<ServiceInfo>> {
        let url = format!("{}/v1/health/service/{name}?passing=true", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RegistryError::Api { status, message });
        }
        let entries: Vec<HealthServiceEntry> = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))?;

        let healthy = entries
            .into_iter()
            .filter(|entry| {
                entry.checks.iter().all(|check| {
                    match validate_health_response(&check.status, check.error.as_deref()) {
                        Ok(()) => check.status == "healthy" || check.status == "ok",
                        Err(e) => {
                            warn!(service = %name, error = %e, "dropping instance with contradictory health payload");
                            false
                        }
                    }
                })
            })
            .map(|entry| entry.service)
            .collect();
        Ok(healthy)
    }

    /// Resolve a service name to one healthy endpoint, rotating through the
    /// instance list for simple load balancing.
    pub async fn get_service_endpoint(&self, name: &str) -> Result<String> {
        let healthy = self.get_healthy_services(name).await?;
        if healthy.is_empty() {
            return Err(RegistryError::NoHealthyInstances {
                name: name.to_string(),
            });
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        let endpoint = healthy[index].endpoint();
        debug!(service = %name, %endpoint, "resolved service endpoint");
        Ok(endpoint)
    }
}

#[async_trait]
impl EndpointSource for RegistryClient {
    async fn resolve(&self, name: &str) -> Result<String> {
        self.get_service_endpoint(name).await
    }
}
