//! LLM Gateway - Main entry point
//!
//! This binary creates and runs the HTTP server with all configured routes and middleware.
//! Configuration is loaded from environment variables.

use anyhow::Result;
use llm_gateway::{
    core::{init_metrics, init_tracing, AppConfig},
    create_router, AppState, InMemoryCalendarStore, InMemoryDocumentStore, UpstreamClient,
};
use std::net::SocketAddr;
use std::sync::Arc;

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> Result<()> {
    init_tracing();
    init_metrics();

    let config = AppConfig::from_env()?;
    tracing::info!(worker_threads, "Tokio runtime started");

    let upstream = Arc::new(UpstreamClient::new(&config.upstream, &config.resilience)?);
    let documents = Arc::new(InMemoryDocumentStore::new(&config.documents));
    let calendars = Arc::new(InMemoryCalendarStore::new());

    tracing::info!(
        base_url = %config.upstream.base_url,
        dialect = %config.upstream.dialect,
        timeout_secs = config.upstream.timeout.as_secs_f64(),
        retry_attempts = config.resilience.retry_attempts,
        breaker_threshold = config.resilience.breaker_threshold,
        auth_enabled = config.api_token.is_some(),
        "Upstream configured"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState::new(config, upstream, documents, calendars));
    let app = create_router(state);

    tracing::info!("Starting LLM Gateway on {}", addr);
    tracing::info!("OpenAI API: /v1/chat/completions, /models");
    tracing::info!("Documents API: /api/upload, /sessions/:session_id/files");
    tracing::info!("Calendar API: /v1/productivity/calendar*");
    tracing::info!("Swagger UI: /swagger-ui");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received");
}
