//! Workhorse Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use workhorse_core::{
    api::{self, AppState},
    config::Config,
    jobs::{
        Coordinator, DataSyncProcessor, DispatchQueue, EmailProcessor, JobLifecycle,
        MemoryLaneBackend, ProcessorRegistry, QueueConfig, RedisLaneBackend,
        ReportProcessor, DEFAULT_LANE,
    },
    store::MemoryStore,
    telemetry,
    workers::{StaleSweeper, SweeperConfig, WorkerRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    // Initialize logging
    telemetry::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Workhorse Server"
    );

    // Record store (in-process; swap the trait objects for a durable store)
    let store = Arc::new(MemoryStore::new());

    // Dispatch queue
    let queue_config = QueueConfig::default();
    let queue = if config.redis.in_memory {
        tracing::info!("Using in-memory queue backend");
        Arc::new(DispatchQueue::new(
            Arc::new(MemoryLaneBackend::new()),
            queue_config,
        ))
    } else {
        let client = redis::Client::open(config.redis.url.as_str())
            .map_err(|e| anyhow::anyhow!("Failed to create Redis client: {}", e))?;
        tracing::info!(url = %config.redis.url, "Using Redis queue backend");
        Arc::new(DispatchQueue::new(
            Arc::new(RedisLaneBackend::new(client, queue_config.key_prefix.clone())),
            queue_config,
        ))
    };

    // Lifecycle engine and worker registry
    let lifecycle = Arc::new(JobLifecycle::new(
        store.clone(),
        queue.clone(),
        &config.scheduler,
    ));
    let registry = Arc::new(WorkerRegistry::new(store.clone()));

    // Built-in processors
    let mut processors = ProcessorRegistry::new();
    processors.register(Arc::new(EmailProcessor::new()))?;
    processors.register(Arc::new(ReportProcessor::new()))?;
    processors.register(Arc::new(DataSyncProcessor::new()))?;
    let processors = Arc::new(processors);
    tracing::info!(job_types = ?processors.job_types(), "Processors registered");

    // Coordinator consumer pool on the default lane
    let coordinator = Arc::new(Coordinator::new(
        lifecycle.clone(),
        processors,
        &config.scheduler,
    ));
    coordinator.start(&queue, DEFAULT_LANE).await;

    // Stale-worker sweeper
    let sweeper = StaleSweeper::new(
        registry.clone(),
        lifecycle.clone(),
        SweeperConfig {
            interval: config.scheduler.sweep_interval,
            stale_timeout: config.scheduler.worker_stale_timeout,
            fail_stale_worker_jobs: config.scheduler.fail_stale_worker_jobs,
        },
    );
    let sweeper_handle = sweeper.start();

    // Build router
    let app_state = AppState {
        lifecycle,
        registry,
    };
    let app = api::build_router(app_state);

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain in-flight work before exit
    sweeper_handle.shutdown().await;
    queue.close().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
