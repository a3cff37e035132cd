use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::validation::Validator;

// Shared protocol constants: referenced by the stream and client layers.
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_GRPC_PORT: u16 = 9090;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000; // duplex stream heartbeat cadence
pub const HEARTBEAT_INTERVAL_MIN_MS: u64 = 1_000;
pub const HEARTBEAT_INTERVAL_MAX_MS: u64 = 300_000;
pub const RECONNECT_DELAY_MS: u64 = 5_000; // initial stream reconnect backoff
pub const RECONNECT_DELAY_MIN_MS: u64 = 100;
pub const RECONNECT_DELAY_MAX_MS: u64 = 60_000;
pub const OUTBOUND_HTTP_TIMEOUT_SECS: u64 = 30;
pub const STREAM_DIAL_TIMEOUT_SECS: u64 = 10;
pub const REGISTRY_HTTP_TIMEOUT_SECS: u64 = 5;

/// Top-level config (fr0g.toml + FR0G_* env overrides; env > file > defaults).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Fr0gConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub grpc: GrpcConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub service_registry: ServiceRegistryConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub openwebui: OpenWebUiConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub sms: SmsClientConfig,
    #[serde(default)]
    pub processors: ProcessorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
            host: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcConfig {
    #[serde(default = "default_grpc_port")]
    pub port: u16,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_GRPC_PORT,
        }
    }
}

/// Controls the persona CRUD back-end (an external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type", default)]
    pub kind: StorageKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Memory,
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_registry_url")]
    pub url: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Stable instance id. Generated from the service name + a UUID when empty.
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: std::collections::HashMap<String, String>,
    /// Seconds between health-check reports.
    #[serde(default = "default_health_interval")]
    pub health_interval: u64,
}

impl Default for ServiceRegistryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_registry_url(),
            service_name: default_service_name(),
            service_id: String::new(),
            tags: Vec::new(),
            meta: std::collections::HashMap::new(),
            health_interval: default_health_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub enable_cors: bool,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_requests_per_minute: u32,
    #[serde(default)]
    pub require_api_key: bool,
    #[serde(default)]
    pub allowed_api_keys: Vec<String>,
    #[serde(default)]
    pub enable_reflection: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_cors: false,
            allowed_origins: Vec::new(),
            rate_limit_requests_per_minute: default_rate_limit(),
            require_api_key: false,
            allowed_api_keys: Vec::new(),
            enable_reflection: false,
        }
    }
}

/// Upstream OpenWebUI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWebUiConfig {
    #[serde(default = "default_openwebui_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds. Must be > 0.
    #[serde(default = "default_openwebui_timeout")]
    pub timeout: u64,
}

impl Default for OpenWebUiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openwebui_url(),
            api_key: String::new(),
            timeout: default_openwebui_timeout(),
        }
    }
}

/// Master Control Program knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "bool_true")]
    pub learning_enabled: bool,
    /// 0.0–1.0.
    #[serde(default = "default_adaptation_threshold")]
    pub adaptation_threshold: f64,
    /// Seconds an un-promoted short-term memory survives.
    #[serde(default = "default_memory_retention")]
    pub memory_retention: u64,
    #[serde(default = "default_health_interval")]
    pub health_check_interval: u64,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval: u64,
    /// Must be > 0.
    #[serde(default = "default_max_workflows")]
    pub max_concurrent_workflows: usize,
    #[serde(default = "bool_true")]
    pub resource_optimization: bool,
    #[serde(default)]
    pub predictive_management: bool,
    #[serde(default = "bool_true")]
    pub system_consciousness: bool,
    #[serde(default = "bool_true")]
    pub emergent_capabilities: bool,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            learning_enabled: true,
            adaptation_threshold: default_adaptation_threshold(),
            memory_retention: default_memory_retention(),
            health_check_interval: default_health_interval(),
            metrics_interval: default_metrics_interval(),
            max_concurrent_workflows: default_max_workflows(),
            resource_optimization: true,
            predictive_management: false,
            system_consciousness: true,
            emergent_capabilities: true,
        }
    }
}

/// Duplex MCP ↔ I/O stream tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
        }
    }
}

/// Outbound SMS gateway client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsClientConfig {
    #[serde(default = "default_sms_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Originating number for outbound messages.
    #[serde(default = "default_sms_from")]
    pub from_number: String,
    /// Outbound sends per second (token-bucket capacity).
    #[serde(default = "default_sms_rate")]
    pub rate_limit: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

impl Default for SmsClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_sms_url(),
            api_key: String::new(),
            from_number: default_sms_from(),
            rate_limit: default_sms_rate(),
            retry: RetryConfig::default(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

/// Exponential-backoff retry shape shared by outbound JSON clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Multiplier ∈ [1.0, 5.0].
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,
    /// ∈ [100, 10000].
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// ≤ 60000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// ∈ [0, 10].
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            factor: default_backoff_factor(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Per-channel threat processor switches plus shared tracking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorsConfig {
    #[serde(default = "bool_true")]
    pub sms_enabled: bool,
    #[serde(default = "bool_true")]
    pub voice_enabled: bool,
    #[serde(default = "bool_true")]
    pub irc_enabled: bool,
    #[serde(default = "bool_true")]
    pub discord_enabled: bool,
    #[serde(default = "bool_true")]
    pub email_enabled: bool,
    /// Bounded ring of recent messages kept per processor.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Seconds between reputation-table maintenance sweeps.
    #[serde(default = "default_reputation_sweep_secs")]
    pub reputation_sweep_secs: u64,
}

impl Default for ProcessorsConfig {
    fn default() -> Self {
        Self {
            sms_enabled: true,
            voice_enabled: true,
            irc_enabled: true,
            discord_enabled: true,
            email_enabled: true,
            history_size: default_history_size(),
            reputation_sweep_secs: default_reputation_sweep_secs(),
        }
    }
}

impl Fr0gConfig {
    /// Load config from a TOML file with FR0G_* env var overrides
    /// (`FR0G_HTTP__PORT=9000`; `__` separates nesting so section names may
    /// themselves contain underscores).
    ///
    /// Checks in order: explicit path argument, then `./fr0g.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("fr0g.toml");

        let config: Fr0gConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FR0G_").split("__"))
            .extract()
            .map_err(|e| crate::error::Fr0gError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check every recognised key against its documented bounds.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut v = Validator::new();

        v.port("http.port", self.http.port as u32);
        v.port("grpc.port", self.grpc.port as u32);
        v.non_empty("http.host", &self.http.host);

        if self.service_registry.enabled {
            v.url("service_registry.url", &self.service_registry.url);
            v.non_empty(
                "service_registry.service_name",
                &self.service_registry.service_name,
            );
            v.positive(
                "service_registry.health_interval",
                self.service_registry.health_interval,
            );
        }

        v.url("openwebui.base_url", &self.openwebui.base_url);
        v.positive("openwebui.timeout", self.openwebui.timeout);

        v.range_f64(
            "mcp.adaptation_threshold",
            self.mcp.adaptation_threshold,
            0.0,
            1.0,
        );
        v.positive(
            "mcp.max_concurrent_workflows",
            self.mcp.max_concurrent_workflows as u64,
        );

        v.range_u64(
            "stream.heartbeat_interval_ms",
            self.stream.heartbeat_interval_ms,
            HEARTBEAT_INTERVAL_MIN_MS,
            HEARTBEAT_INTERVAL_MAX_MS,
        );
        v.range_u64(
            "stream.reconnect_delay_ms",
            self.stream.reconnect_delay_ms,
            RECONNECT_DELAY_MIN_MS,
            RECONNECT_DELAY_MAX_MS,
        );

        v.url("sms.base_url", &self.sms.base_url);
        v.non_empty("sms.from_number", &self.sms.from_number);
        v.positive("sms.rate_limit", self.sms.rate_limit as u64);
        v.range_f64("sms.retry.factor", self.sms.retry.factor, 1.0, 5.0);
        v.range_u64(
            "sms.retry.initial_delay_ms",
            self.sms.retry.initial_delay_ms,
            100,
            10_000,
        );
        v.range_u64("sms.retry.max_delay_ms", self.sms.retry.max_delay_ms, 100, 60_000);
        v.range_u64("sms.retry.max_retries", self.sms.retry.max_retries as u64, 0, 10);

        if self.security.require_api_key && self.security.allowed_api_keys.is_empty() {
            v.fail(
                "security.allowed_api_keys",
                "must not be empty when require_api_key is set",
            );
        }

        v.positive("processors.history_size", self.processors.history_size as u64);

        v.finish()
    }

    /// Effective registry instance id: configured value or a generated one.
    pub fn registry_service_id(&self) -> String {
        if self.service_registry.service_id.is_empty() {
            format!(
                "{}-{}",
                self.service_registry.service_name,
                uuid::Uuid::new_v4()
            )
        } else {
            self.service_registry.service_id.clone()
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}
fn default_grpc_port() -> u16 {
    DEFAULT_GRPC_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_registry_url() -> String {
    "http://localhost:8500".to_string()
}
fn default_service_name() -> String {
    "fr0g-ai-mcp".to_string()
}
fn default_health_interval() -> u64 {
    30
}
fn default_rate_limit() -> u32 {
    60
}
fn default_openwebui_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_openwebui_timeout() -> u64 {
    30
}
fn default_adaptation_threshold() -> f64 {
    0.5
}
fn default_memory_retention() -> u64 {
    3_600
}
fn default_metrics_interval() -> u64 {
    20
}
fn default_max_workflows() -> usize {
    10
}
fn default_heartbeat_ms() -> u64 {
    HEARTBEAT_INTERVAL_MS
}
fn default_reconnect_ms() -> u64 {
    RECONNECT_DELAY_MS
}
fn default_sms_url() -> String {
    "http://localhost:8600".to_string()
}
fn default_sms_from() -> String {
    "+15550000000".to_string()
}
fn default_sms_rate() -> u32 {
    10
}
fn default_delivery_timeout_ms() -> u64 {
    60_000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_history_size() -> usize {
    1_000
}
fn default_reputation_sweep_secs() -> u64 {
    30
}
