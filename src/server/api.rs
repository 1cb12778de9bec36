//! Health, device telemetry and job submission API.
//!
//! - GET /health
//! - GET /gpu/stats
//! - GET /metrics
//! - POST /v1/jobs
//! - GET /v1/jobs/events

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::gpu::MB;
use crate::jobs::{JobEnvelope, JobStatus, JobType};
use crate::server::streaming::status_events_to_sse_stream;
use crate::worker::WorkerContext;

/// Application state shared across handlers.
pub struct AppState {
    pub ctx: Arc<WorkerContext>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self {
            ctx,
            start_time: Instant::now(),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/gpu/stats", get(gpu_stats))
        .route("/metrics", get(metrics))
        .route("/v1/jobs", post(submit_job))
        .route("/v1/jobs/events", get(job_events))
        .with_state(state)
}

// ─── Response Types ────────────────────────────────────────────────────────

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub cuda_available: bool,
    pub gpu_name: Option<String>,
    /// MB, 0 without an accelerator.
    pub vram_total: u64,
    pub uptime_secs: u64,
}

/// Device memory in MB.
#[derive(Debug, Serialize)]
pub struct GpuStatsResponse {
    pub vram_allocated: u64,
    pub vram_reserved: u64,
    pub vram_total: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.ctx.device.snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        cuda_available: snapshot.available,
        gpu_name: snapshot.name,
        vram_total: if snapshot.available { snapshot.total_bytes / MB } else { 0 },
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn gpu_stats(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let snapshot = state.ctx.device.snapshot();
    if !snapshot.available {
        return Json(ErrorResponse {
            error: "CUDA not available".to_string(),
        })
        .into_response();
    }

    Json(GpuStatsResponse {
        vram_allocated: snapshot.allocated_bytes / MB,
        vram_reserved: snapshot.reserved_bytes / MB,
        vram_total: snapshot.total_bytes / MB,
    })
    .into_response()
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, StatusCode> {
    let body = state.ctx.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Local producer: wrap `data` in an envelope and push it onto the queue.
///
/// Only the job type is checked here; payload validation happens in the
/// worker so that it is reported as a `failed` event.
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Value>,
) -> Result<(StatusCode, Json<SubmitResponse>), (StatusCode, Json<ErrorResponse>)> {
    let job_type = match data
        .get("jobType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .parse::<JobType>()
    {
        Ok(job_type) => job_type,
        Err(e) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    };

    let envelope = JobEnvelope {
        job_id: Uuid::new_v4().to_string(),
        data,
    };

    if let Err(e) = state.ctx.queue.enqueue(&envelope).await {
        error!(error = %e, "Failed to enqueue job");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        ));
    }

    state.ctx.metrics.record_status(JobStatus::Queued);
    info!(job_id = %envelope.job_id, job_type = %job_type, "Job queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: envelope.job_id,
            status: JobStatus::Queued,
        }),
    ))
}

async fn job_events(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, StatusCode> {
    let rx = state
        .ctx
        .publisher
        .subscribe()
        .ok_or(StatusCode::NOT_IMPLEMENTED)?;
    let stream = status_events_to_sse_stream(rx);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
