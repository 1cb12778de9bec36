//! End-to-end tests: HTTP surface, local producer and worker on one runtime.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use gpu_job_worker::config::Config;
use gpu_job_worker::gpu::{CpuDevice, SharedDevice, SimulatedDevice};
use gpu_job_worker::server::{build_router, AppState};
use gpu_job_worker::worker::{Worker, WorkerContext};

async fn spawn_server(ctx: Arc<WorkerContext>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::new(AppState::new(ctx)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn simulated_context() -> Arc<WorkerContext> {
    let mut config = Config::default();
    config.worker.poll_timeout_secs = 1;
    let device: SharedDevice = Arc::new(SimulatedDevice::rtx_3050());
    Arc::new(WorkerContext::local_with_device(config, device).unwrap())
}

#[tokio::test]
async fn test_health_and_stats_on_simulated_card() {
    let addr = spawn_server(simulated_context()).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["cuda_available"], true);
    assert_eq!(health["gpu_name"], "NVIDIA GeForce RTX 3050");
    assert_eq!(health["vram_total"], 8192);

    let stats: Value = client
        .get(format!("http://{addr}/gpu/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats, json!({"vram_allocated": 0, "vram_reserved": 0, "vram_total": 8192}));
}

#[tokio::test]
async fn test_stats_without_accelerator() {
    let device: SharedDevice = Arc::new(CpuDevice);
    let ctx = Arc::new(WorkerContext::local_with_device(Config::default(), device).unwrap());
    let addr = spawn_server(ctx).await;

    let stats: Value = reqwest::get(format!("http://{addr}/gpu/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats, json!({"error": "CUDA not available"}));
}

#[tokio::test]
async fn test_submitted_job_streams_to_completion() {
    let ctx = simulated_context();
    let addr = spawn_server(ctx.clone()).await;
    let client = reqwest::Client::new();

    // Subscribe before anything is published.
    let mut events = client
        .get(format!("http://{addr}/v1/jobs/events"))
        .send()
        .await
        .unwrap();
    assert!(events.status().is_success());

    let submitted = client
        .post(format!("http://{addr}/v1/jobs"))
        .json(&json!({
            "jobType": "study-animation",
            "topic": "Photosynthesis",
            "script": "Plants capture light. They turn it into sugar. Oxygen is released.",
            "subject": "science",
            "animationStyle": "whiteboard"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(submitted.status(), reqwest::StatusCode::ACCEPTED);
    let submitted: Value = submitted.json().await.unwrap();
    assert_eq!(submitted["status"], "queued");
    let job_id = submitted["jobId"].as_str().unwrap().to_string();

    let shutdown = CancellationToken::new();
    let mut worker = Worker::new(ctx.clone());
    let stop = shutdown.clone();
    let worker_task = tokio::spawn(async move { worker.run(stop).await });

    let mut body = String::new();
    let read = tokio::time::timeout(Duration::from_secs(10), async {
        while !body.contains("\"status\":\"completed\"") {
            match events.chunk().await.unwrap() {
                Some(chunk) => body.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    })
    .await;
    assert!(read.is_ok(), "no completion event, got: {body}");

    shutdown.cancel();
    worker_task.await.unwrap();

    let processing = body.find("\"status\":\"processing\"").unwrap();
    let completed = body.find("\"status\":\"completed\"").unwrap();
    assert!(processing < completed);
    assert!(body.contains(&job_id));
    assert!(body.contains("event: status"));

    let metrics = client
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("gpu_worker_jobs_total{status=\"queued\"} 1"), "{metrics}");
    assert!(metrics.contains("gpu_worker_jobs_total{status=\"completed\"} 1"), "{metrics}");
    assert!(metrics.contains("gpu_worker_model_loads_total 1"), "{metrics}");
}

#[tokio::test]
async fn test_unknown_job_type_is_rejected_at_submission() {
    let addr = spawn_server(simulated_context()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/jobs"))
        .json(&json!({"jobType": "hologram"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Unknown job type: hologram");
}
