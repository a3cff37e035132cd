//! TTL cache of service → endpoint with a background refresh loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::EndpointSource;
use crate::error::Result;

/// How long a cached endpoint stays authoritative.
const CACHE_EXPIRY: Duration = Duration::from_secs(60);
/// Cadence of the background re-query over all cached names.
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CachedEndpoint {
    url: String,
    last_update: Instant,
}

/// Endpoint cache in front of the registry.
///
/// Lookups serve the cached value while fresh; misses and stale entries go
/// back to the registry. The refresh loop re-queries every cached name; a
/// refresh failure logs and keeps the stale entry until the next miss.
pub struct DiscoveryCache {
    source: Arc<dyn EndpointSource>,
    entries: DashMap<String, CachedEndpoint>,
    expiry: Duration,
}

impl DiscoveryCache {
    pub fn new(source: Arc<dyn EndpointSource>) -> Self {
        Self::with_expiry(source, CACHE_EXPIRY)
    }

    pub fn with_expiry(source: Arc<dyn EndpointSource>, expiry: Duration) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            expiry,
        }
    }

    /// Resolve a service name, consulting the cache first.
    pub async fn get_service_endpoint(&self, name: &str) -> Result<String> {
        if let Some(entry) = self.entries.get(name) {
            if entry.last_update.elapsed() < self.expiry {
                debug!(service = %name, "discovery cache hit");
                return Ok(entry.url.clone());
            }
        }

        let url = self.source.resolve(name).await?;
        self.entries.insert(
            name.to_string(),
            CachedEndpoint {
                url: url.clone(),
                last_update: Instant::now(),
            },
        );
        debug!(service = %name, %url, "discovery cache refreshed on miss");
        Ok(url)
    }

    /// Drop a name from the cache (e.g. after a connection failure).
    pub fn invalidate(&self, name: &str) {
        self.entries.remove(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-query every cached name once. Failures keep the existing entry.
    pub async fn refresh_all(&self) {
        let names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for name in names {
            match self.source.resolve(&name).await {
                Ok(url) => {
                    self.entries.insert(
                        name.clone(),
                        CachedEndpoint {
                            url,
                            last_update: Instant::now(),
                        },
                    );
                }
                Err(e) => {
                    // Keep serving the stale entry; the next miss re-queries.
                    warn!(service = %name, error = %e, "background refresh failed");
                }
            }
        }
    }

    /// Background refresh loop; ticks every 30 s until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("discovery refresh loop started");
        let mut interval = tokio::time::interval(REFRESH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.refresh_all().await;
                }
                _ = cancel.cancelled() => {
                    info!("discovery refresh loop stopped");
                    break;
                }
            }
        }
    }
}
