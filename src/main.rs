use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use trustr::api::{create_router, AppState};
use trustr::config::Config;
use trustr::observability::{init_tracing, MetricsRegistry};
use trustr::policy::{PolicyLoader, PolicyWatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting trustr authorization server"
    );

    // Load initial policy and watch for changes
    let loader = PolicyLoader::new(config.policy_path.to_string_lossy());
    let watcher = PolicyWatcher::new(loader, config.policy_reload_interval());
    let (policy_rx, policy_handle) = watcher.start();

    let metrics = Arc::new(MetricsRegistry::new());

    // Count reloads picked up by the server
    let reload_handle = {
        let mut rx = policy_rx.clone();
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                metrics.record_policy_reload();
            }
        })
    };

    // Create application state
    let state = Arc::new(AppState {
        policy_rx,
        metrics,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        invocation_timeout: config.invocation_timeout(),
        latency_budget_ms: config.latency_budget_ms,
    });

    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    if config.graceful_shutdown {
        let shutdown = Arc::new(Notify::new());
        let notified = Arc::clone(&shutdown);

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { notified.notified().await })
                .await
        });

        shutdown_signal().await;
        shutdown.notify_one();

        // Bound the time spent draining in-flight requests
        match tokio::time::timeout(config.shutdown_timeout(), server).await {
            Ok(joined) => joined??,
            Err(_) => warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "In-flight requests did not drain before shutdown timeout"
            ),
        }
    } else {
        axum::serve(listener, app).await?;
    }

    // Cleanup
    info!("Shutting down...");
    policy_handle.abort();
    reload_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
