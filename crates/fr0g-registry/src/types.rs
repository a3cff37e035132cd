use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How the registry should probe an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthCheck {
    Http {
        http: String,
        /// e.g. "30s".
        interval: String,
        /// e.g. "10s".
        timeout: String,
    },
    Tcp {
        tcp: String,
        interval: String,
        timeout: String,
    },
    Grpc {
        grpc: String,
        interval: String,
        timeout: String,
    },
}

/// One registered service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<HealthCheck>,
}

impl ServiceInfo {
    /// The endpoint URL discovery hands out for this instance.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Latest check outcome attached to a health query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStatus {
    /// One of `healthy`, `degraded`, `unhealthy`.
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// One entry of `GET /v1/health/service/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthServiceEntry {
    pub service: ServiceInfo,
    #[serde(default)]
    pub checks: Vec<CheckStatus>,
}
