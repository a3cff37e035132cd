use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use fr0g_core::config::Fr0gConfig;
use fr0g_gateway::app;
use fr0g_registry::{DiscoveryCache, HealthCheck, RegistryClient, ServiceInfo};

/// fr0g-ai Master Control Program gateway.
#[derive(Debug, Parser)]
#[command(name = "fr0g-gateway", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Serve only the HTTP surface (the default: kept for parity with
    /// multi-listener deployments).
    #[arg(long)]
    http_only: bool,

    /// Serve only the gRPC surface. Not available in this build.
    #[arg(long)]
    grpc_only: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fr0g_gateway=info,tower_http=debug".into()),
        )
        .init();

    if cli.grpc_only {
        error!("--grpc-only: this build carries no gRPC listener");
        return ExitCode::from(2);
    }

    let config = match Fr0gConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("runtime start-up failed: {e}");
            return ExitCode::from(1);
        }
    };
    match runtime.block_on(serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal start-up error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn serve(config: Fr0gConfig) -> anyhow::Result<()> {
    let bind = config.http.host.clone();
    let port = config.http.port;

    let (state, trigger_rx) = app::AppState::build(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Background loops: cognitive ticks, memory cleanup, strategies,
    // strategy-triggered workflows, delivery watchdog, processors.
    {
        let engine = state.engine.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { engine.run(rx).await });
    }
    {
        let memory = state.memory.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { memory.run(rx).await });
    }
    {
        let orchestrator = state.orchestrator.clone();
        let cancel = state.cancel.child_token();
        tokio::spawn(async move { orchestrator.run(cancel).await });
    }
    {
        let workflows = state.workflows.clone();
        let cancel = state.cancel.child_token();
        tokio::spawn(async move { workflows.run_triggers(trigger_rx, cancel).await });
    }
    {
        let delivery = state.delivery.clone();
        let cancel = state.cancel.child_token();
        tokio::spawn(async move { delivery.run(cancel).await });
    }
    state.processors.start_all(&state.cancel);

    // Service registry: register this instance and keep discovery warm.
    let registration = if state.config.service_registry.enabled {
        let client = Arc::new(RegistryClient::new(&state.config.service_registry)?);
        let service_id = state.config.registry_service_id();
        let info = ServiceInfo {
            id: service_id.clone(),
            name: state.config.service_registry.service_name.clone(),
            address: bind.clone(),
            port,
            tags: state.config.service_registry.tags.clone(),
            meta: state.config.service_registry.meta.clone(),
            check: Some(HealthCheck::Http {
                http: format!("http://{bind}:{port}/health"),
                interval: format!("{}s", state.config.service_registry.health_interval),
                timeout: "10s".to_string(),
            }),
        };
        if let Err(e) = client.register(&info).await {
            // Registry being down is a degraded start, not a fatal one.
            warn!(error = %e, "service registry registration failed");
        }

        let discovery = Arc::new(DiscoveryCache::new(client.clone()));
        {
            let discovery = discovery.clone();
            let cancel = state.cancel.child_token();
            tokio::spawn(async move { discovery.run(cancel).await });
        }
        Some((client, service_id))
    } else {
        None
    };

    let router = app::build_router(state.clone());
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "fr0g-ai MCP gateway listening");

    let shutdown_state = state.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown_state.cancel.cancel();
        })
        .await?;

    // Orderly teardown: stop loops, processors, and deregister.
    let _ = shutdown_tx.send(true);
    state.processors.stop_all();
    if let Some((client, service_id)) = registration {
        if let Err(e) = client.deregister(&service_id).await {
            warn!(error = %e, "service registry deregistration failed");
        }
    }
    info!("fr0g-ai MCP gateway stopped");
    Ok(())
}
