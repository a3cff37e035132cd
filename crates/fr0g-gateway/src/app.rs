use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fr0g_clients::{ChatBridgeClient, DeliveryTracker, SlidingWindowLimiter, SmsClient, TokenBucket};
use fr0g_cognitive::{AdaptiveLearner, CognitiveConfig, CognitiveEngine, PatternRecognizer};
use fr0g_community::{CommunityClient, HttpCommunityClient, MockCommunityClient};
use fr0g_core::config::{Fr0gConfig, StorageKind};
use fr0g_memory::{MemoryConfig, MemoryManager};
use fr0g_orchestrator::resources::{Allocation, ResourcePool};
use fr0g_orchestrator::types::{OrchestratorConfig, WorkflowTrigger};
use fr0g_orchestrator::workflow::WorkflowConfig;
use fr0g_orchestrator::{StrategyOrchestrator, WorkflowEngine};
use fr0g_vectors::{
    discord::DiscordProcessor, email::EmailProcessor, irc::IrcProcessor, sms::SmsProcessor,
    voice::VoiceProcessor, ProcessorRegistry,
};

use crate::dispatch::StreamDispatcher;

/// Where the persona CRUD service listens when no override is configured
/// (service_registry.meta key `aip_url`).
const DEFAULT_AIP_URL: &str = "http://localhost:8081";

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: Fr0gConfig,
    pub started_at: Instant,
    pub processors: ProcessorRegistry,
    pub engine: Arc<CognitiveEngine>,
    pub workflows: Arc<WorkflowEngine>,
    pub orchestrator: Arc<StrategyOrchestrator>,
    pub memory: Arc<MemoryManager>,
    pub chat: ChatBridgeClient,
    pub delivery: Arc<DeliveryTracker>,
    pub limiter: SlidingWindowLimiter,
    /// Active stream connections: conn_id → outbound frame sender.
    pub stream_clients: Arc<DashMap<String, mpsc::Sender<String>>>,
    /// Root token; cancelled once on shutdown.
    pub cancel: CancellationToken,
}

impl AppState {
    /// Wire the full MCP runtime from configuration.
    pub fn build(
        config: Fr0gConfig,
    ) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<WorkflowTrigger>)> {
        let cancel = CancellationToken::new();

        let learner = Arc::new(AdaptiveLearner::new(0.1));
        let recognizer = Arc::new(PatternRecognizer::new(CognitiveConfig::default()));
        let engine = Arc::new(CognitiveEngine::new(
            CognitiveConfig::default(),
            learner.clone(),
            recognizer.clone(),
        ));

        let memory = Arc::new(MemoryManager::new(MemoryConfig {
            short_term_ttl: config.mcp.memory_retention,
            ..MemoryConfig::default()
        }));

        let mut processors = ProcessorRegistry::new();
        let p = &config.processors;
        processors.register(Arc::new(SmsProcessor::new(
            p.sms_enabled,
            p.history_size,
            p.reputation_sweep_secs,
        )?));
        processors.register(Arc::new(VoiceProcessor::new(
            p.voice_enabled,
            p.history_size,
            p.reputation_sweep_secs,
        )?));
        processors.register(Arc::new(IrcProcessor::new(
            p.irc_enabled,
            p.history_size,
            p.reputation_sweep_secs,
        )?));
        processors.register(Arc::new(DiscordProcessor::new(
            p.discord_enabled,
            p.history_size,
            p.reputation_sweep_secs,
        )?));
        processors.register(Arc::new(EmailProcessor::new(
            p.email_enabled,
            p.history_size,
            p.reputation_sweep_secs,
        )?));

        // File storage means a real AIP service is deployed next to us; the
        // in-memory mode runs the deterministic panel in-process.
        let community: Arc<dyn CommunityClient> = match config.storage.kind {
            StorageKind::File => {
                let aip_url = config
                    .service_registry
                    .meta
                    .get("aip_url")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_AIP_URL);
                Arc::new(HttpCommunityClient::new(aip_url)?)
            }
            StorageKind::Memory => Arc::new(MockCommunityClient::new()),
        };

        let stream_clients: Arc<DashMap<String, mpsc::Sender<String>>> = Arc::new(DashMap::new());

        // Outbound SMS path: token-bucket rate limit, retrying client, and
        // the shared delivery tracker surfaced by /status.
        let delivery = Arc::new(DeliveryTracker::new(config.sms.delivery_timeout_ms));
        let sms = Arc::new(SmsClient::new(&config.sms, delivery.clone())?);
        let sms_bucket = Arc::new(TokenBucket::start(
            config.sms.rate_limit,
            cancel.child_token(),
        ));
        let dispatcher = Arc::new(StreamDispatcher::new(
            stream_clients.clone(),
            sms,
            sms_bucket,
            config.sms.from_number.clone(),
            cancel.child_token(),
        ));

        let workflows = Arc::new(WorkflowEngine::new(
            WorkflowConfig {
                max_concurrent: config.mcp.max_concurrent_workflows,
                ..WorkflowConfig::default()
            },
            community,
            learner.clone(),
            recognizer.clone(),
            dispatcher,
        ));

        let mut pool = ResourcePool::new(Allocation {
            cpu: 8.0,
            memory_bytes: 16 << 30,
            bandwidth_bps: 1_000_000_000,
        });
        pool.allocate(
            "cognitive",
            Allocation {
                cpu: 2.0,
                memory_bytes: 4 << 30,
                bandwidth_bps: 100_000_000,
            },
        );
        pool.allocate(
            "workflow",
            Allocation {
                cpu: 2.0,
                memory_bytes: 4 << 30,
                bandwidth_bps: 100_000_000,
            },
        );
        let (orchestrator, trigger_rx) = StrategyOrchestrator::new(
            OrchestratorConfig {
                predictive_enabled: config.mcp.predictive_management,
                ..OrchestratorConfig::default()
            },
            pool,
            recognizer,
        );

        let chat = ChatBridgeClient::new(&config.openwebui)?;
        let limiter =
            SlidingWindowLimiter::per_minute(config.security.rate_limit_requests_per_minute);

        let state = Arc::new(Self {
            config,
            started_at: Instant::now(),
            processors,
            engine,
            workflows,
            orchestrator: Arc::new(orchestrator),
            memory,
            chat,
            delivery,
            limiter,
            stream_clients,
            cancel,
        });
        Ok((state, trigger_rx))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/status", get(crate::http::health::status_handler))
        .route(
            "/webhook/{channel}",
            post(crate::http::webhooks::webhook_handler),
        )
        .route(
            "/api/chat/completions",
            post(crate::http::chat::chat_handler),
        )
        .route("/stream", get(crate::ws::connection::stream_handler));

    if state.config.security.enable_cors {
        let cors = if state.config.security.allowed_origins.is_empty() {
            tower_http::cors::CorsLayer::permissive()
        } else {
            let origins: Vec<axum::http::HeaderValue> = state
                .config
                .security
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            tower_http::cors::CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        };
        router = router.layer(cors);
    }

    router
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
