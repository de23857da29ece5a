//! SQS Bridge
//!
//! Long-polls an SQS queue and POSTs every message body to a job endpoint,
//! in the style of the Elastic Beanstalk worker daemon.
//!
//! ## Architecture
//!
//! ```text
//! SQS queue (SQSD_QUEUE_URL)
//!   ↓ (receive, 1 message, long-poll)
//! WorkerPool (SQSD_POOL_SIZE lifecycles)
//!   ↓ (POST body, application/json)
//! Job endpoint (SQSD_WORKER_URL)
//!   ↓ (2xx → delete; failure → retry or dead-letter)
//! SQS queue / dead-letter queue
//! ```
//!
//! ## Features
//!
//! - Dead-letter emulation for queue servers without redrive (ElasticMQ)
//! - Graceful shutdown handling
//! - Health check endpoint for Kubernetes probes
//! - Prometheus metrics

use axum::Router;
use core_config::{app_info, env_flag, server::ServerConfig, Environment, FromEnv};
use eyre::{Result, WrapErr};
use queue_worker::{
    health_router, init_metrics, HealthState, HttpDispatcher, MetricsSink, NoopSink,
    PrometheusSink, QueueClient, SqsQueueClient, WorkerConfig, WorkerPool,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Default port for the health and metrics server
const DEFAULT_HEALTH_PORT: u16 = 8083;

/// Start the health HTTP server
///
/// Provides endpoints for:
/// - Liveness probes: `/health`, `/healthz`
/// - Readiness probes: `/ready`, `/readyz`
/// - Prometheus metrics: `/metrics`
async fn start_health_server(health_state: HealthState, server: ServerConfig) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = server.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %server.port, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the bridge
///
/// 1. Sets up error reporting and structured logging (JSON for prod, pretty for dev)
/// 2. Loads the worker configuration from `SQSD_*` variables
/// 3. Builds the SQS client and the job HTTP client
/// 4. Runs the worker pool until SIGINT/SIGTERM
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the HTTP client cannot be
/// built, or the health server port cannot be parsed.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();

    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting SQS bridge");
    info!("Environment: {:?}", environment);

    let metrics: Arc<dyn MetricsSink> = if env_flag("SQSD_METRICS_ENABLED", true)
        .wrap_err("Failed to read SQSD_METRICS_ENABLED")?
    {
        init_metrics().wrap_err("Failed to initialize Prometheus metrics")?;
        Arc::new(PrometheusSink::default())
    } else {
        info!("Metrics disabled");
        Arc::new(NoopSink)
    };

    let config = Arc::new(
        WorkerConfig::from_env().wrap_err("Failed to load worker configuration")?,
    );
    info!(
        queue_url = %config.queue_url,
        job_url = %config.job_url,
        job_timeout_secs = config.job_timeout.as_secs(),
        pool_size = config.pool_size,
        dead_letter_emulation = config.dead_letter_emulation,
        dead_letter_queue_url = ?config.dead_letter_queue_url,
        max_receive_count = config.max_receive_count,
        "Worker configuration loaded"
    );

    let health_server = ServerConfig::from_env_with(
        &["SQSD_HEALTH_PORT", "HEALTH_PORT"],
        DEFAULT_HEALTH_PORT,
    )
    .wrap_err("Failed to load health server configuration")?;

    let endpoint_url = std::env::var("SQSD_SQS_ENDPOINT_URL")
        .ok()
        .filter(|url| !url.trim().is_empty());
    if let Some(url) = &endpoint_url {
        info!(endpoint_url = %url, "Using custom SQS endpoint");
    }
    let queue: Arc<dyn QueueClient> =
        Arc::new(SqsQueueClient::from_env(endpoint_url.as_deref()).await);

    let http = HttpDispatcher::build_client().wrap_err("Failed to build HTTP client")?;
    let dispatcher = Arc::new(HttpDispatcher::new(http, &config, metrics));

    let pool = WorkerPool::new(Arc::clone(&config), queue, dispatcher);

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    // Start health server in background
    let health_state = HealthState::new(app_info, config.queue_url.clone(), pool.status());
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_server).await {
            error!(error = %e, "Health server failed");
        }
    });

    pool.run(shutdown_rx).await;

    info!("SQS bridge stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
