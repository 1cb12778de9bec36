//! gpu-job-worker: sequential GPU job worker with a VRAM-budgeted model cache.
//!
//! Pops job envelopes from the queue, runs them one at a time on the shared
//! accelerator and publishes every status transition. Serves health, device
//! stats and metrics over HTTP alongside the worker.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use gpu_job_worker::config::{Cli, Config};
use gpu_job_worker::server::{build_router, AppState};
use gpu_job_worker::worker::{Worker, WorkerContext};

/// How long in-flight HTTP connections (SSE subscribers included) get to close.
const SERVER_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    init_tracing(&cli);

    info!("gpu-job-worker v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);

    info!(
        max_vram_mb = config.gpu.max_vram_mb,
        device = ?config.gpu.device,
        queue = %config.worker.queue_name,
        channel = %config.worker.status_channel,
        "Configuration loaded"
    );

    // Device, queue, publisher and metrics are built once and shared.
    let ctx = Arc::new(WorkerContext::local(config)?);
    let shutdown = CancellationToken::new();

    let server = if ctx.config.server.enabled {
        Some(tokio::spawn(serve(ctx.clone(), shutdown.clone())))
    } else {
        info!("HTTP server disabled");
        None
    };

    let mut worker_task = Worker::new(ctx.clone()).spawn_dedicated(shutdown.clone());

    let worker_exited = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, stopping after the current job");
            false
        }
        joined = &mut worker_task => {
            // The loop only returns on cancellation, so this is a panic.
            joined?;
            true
        }
    };

    shutdown.cancel();
    if !worker_exited {
        worker_task.await?;
    }

    if let Some(server) = server {
        match tokio::time::timeout(SERVER_DRAIN, server).await {
            Ok(joined) => joined??,
            Err(_) => warn!("HTTP server did not drain in time"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        "gpu_job_worker=debug,tower_http=debug"
    } else {
        "gpu_job_worker=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

async fn serve(ctx: Arc<WorkerContext>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listen_addr = ctx.config.server.listen.clone();
    let state = Arc::new(AppState::new(ctx));

    // Build the HTTP router.
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(addr = %listen_addr, "Starting server");
    let listener = TcpListener::bind(&listen_addr).await.map_err(|e| {
        error!(addr = %listen_addr, error = %e, "Failed to bind");
        e
    })?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
