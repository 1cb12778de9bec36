//! Integration tests for the dispatch loop: status lifecycle, failure
//! isolation and idle polling.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use gpu_job_worker::cache::manager::ResourceManager;
use gpu_job_worker::config::Config;
use gpu_job_worker::gpu::{SharedDevice, SimulatedDevice, MB};
use gpu_job_worker::jobs::{JobError, JobPayload, JobStatus, JobStatusEvent, JobType};
use gpu_job_worker::metrics::Metrics;
use gpu_job_worker::processors::{Processor, ProcessorRegistry};
use gpu_job_worker::worker::{
    BroadcastPublisher, InMemoryQueue, RecordingPublisher, Worker, WorkerContext,
};

struct Harness {
    worker: Worker,
    queue: Arc<InMemoryQueue>,
    publisher: Arc<RecordingPublisher>,
}

fn harness(registry: ProcessorRegistry) -> Harness {
    let device: SharedDevice = Arc::new(SimulatedDevice::new("test card", 8192 * MB));
    let queue = Arc::new(InMemoryQueue::new("bull:job-queue:wait"));
    let publisher = Arc::new(RecordingPublisher::new());

    let mut config = Config::default();
    config.worker.poll_timeout_secs = 1;

    let ctx = WorkerContext::new(
        config,
        device,
        queue.clone(),
        publisher.clone(),
        Arc::new(Metrics::new().unwrap()),
    );
    Harness {
        worker: Worker::with_registry(Arc::new(ctx), registry),
        queue,
        publisher,
    }
}

fn envelope(job_id: &str, data: Value) -> String {
    json!({ "jobId": job_id, "data": data }).to_string()
}

fn image_job(job_id: &str) -> String {
    envelope(
        job_id,
        json!({"jobType": "image-generation", "prompt": "a lighthouse at dusk", "numImages": 2}),
    )
}

fn story_job(job_id: &str) -> String {
    envelope(
        job_id,
        json!({
            "jobType": "story-video",
            "script": "Once upon a time a small robot found a seed.\n\nIt planted the seed and waited for spring.",
            "visualStyle": "pixar",
            "voiceStyle": "female-soft"
        }),
    )
}

fn events_for<'a>(events: &'a [JobStatusEvent], job_id: &str) -> Vec<&'a JobStatusEvent> {
    events.iter().filter(|e| e.job_id == job_id).collect()
}

/// Exactly one `processing` followed by exactly one terminal event.
fn assert_lifecycle(events: &[JobStatusEvent], job_id: &str, terminal: JobStatus) {
    let mine = events_for(events, job_id);
    assert_eq!(mine.len(), 2, "events for {job_id}: {mine:?}");
    assert_eq!(mine[0].status, JobStatus::Processing);
    assert_eq!(mine[1].status, terminal);
}

struct Failing;

impl Processor for Failing {
    fn process(&self, _: &str, _: &JobPayload, _: &mut ResourceManager) -> Result<Value, JobError> {
        Err(anyhow::anyhow!("sampler diverged at step 12").into())
    }
}

/// Blocks inside `process` until the test releases it.
struct Gated(Mutex<mpsc::Receiver<()>>);

impl Processor for Gated {
    fn process(&self, _: &str, _: &JobPayload, _: &mut ResourceManager) -> Result<Value, JobError> {
        let _ = self.0.lock().unwrap().recv();
        Ok(json!({"released": true}))
    }
}

#[test]
fn test_successful_job_lifecycle() {
    let mut h = harness(ProcessorRegistry::with_defaults());
    let outcome = h.worker.handle_message(&image_job("1")).unwrap();
    assert_eq!(outcome.status, JobStatus::Completed);

    let events = h.publisher.events();
    assert_lifecycle(&events, "1", JobStatus::Completed);

    let result = events[1].result.as_ref().unwrap();
    assert_eq!(result["count"], 2);
    assert_eq!(result["images"].as_array().unwrap().len(), 2);
    assert!(events[1].error.is_none());
    assert!(h.worker.resources().is_loaded("sdxl"));
}

#[test]
fn test_failure_is_isolated() {
    let mut registry = ProcessorRegistry::with_defaults();
    registry.register(JobType::ClothSwap, |_| Arc::new(Failing));
    let mut h = harness(registry);

    let bad = envelope(
        "bad",
        json!({"jobType": "cloth-swap", "personUrl": "p", "clothUrl": "c", "category": "casual"}),
    );
    h.worker.handle_message(&bad);
    h.worker.handle_message(&image_job("good"));

    let events = h.publisher.events();
    assert_lifecycle(&events, "bad", JobStatus::Failed);
    assert_lifecycle(&events, "good", JobStatus::Completed);

    let failed = events_for(&events, "bad")[1];
    assert_eq!(failed.error.as_deref(), Some("sampler diverged at step 12"));
    assert!(failed.result.is_none());
    assert_eq!(h.worker.stats().failed, 1);
    assert_eq!(h.worker.stats().completed, 1);
}

#[test]
fn test_unknown_job_type_fails_without_stopping() {
    let mut h = harness(ProcessorRegistry::with_defaults());
    h.worker.handle_message(&envelope("u", json!({"jobType": "hologram"})));
    h.worker.handle_message(&envelope("m", json!({"prompt": "no type at all"})));
    h.worker.handle_message(&image_job("after"));

    let events = h.publisher.events();
    assert_lifecycle(&events, "u", JobStatus::Failed);
    assert_lifecycle(&events, "m", JobStatus::Failed);
    assert_lifecycle(&events, "after", JobStatus::Completed);

    let unknown = events_for(&events, "u")[1];
    assert_eq!(unknown.error.as_deref(), Some("Unknown job type: hologram"));
    assert_eq!(h.worker.registry().instantiated(), 1);
}

#[test]
fn test_failed_job_releases_cached_memory() {
    let mut h = harness(ProcessorRegistry::with_defaults());
    h.worker.handle_message(&image_job("1"));

    // story-video needs 5000 MB: sdxl is flushed, then its 4500 MB load fails
    // against a card whose headroom was eaten by a stray allocation.
    let device = h.worker.context().device.clone();
    let _stray = device.allocate(4000 * MB).unwrap();
    h.worker.handle_message(&story_job("2"));

    let events = h.publisher.events();
    assert_lifecycle(&events, "2", JobStatus::Failed);
    let error = events_for(&events, "2")[1].error.clone().unwrap();
    assert!(error.contains("story-video"), "{error}");
    assert!(error.contains("out of memory"), "{error}");

    assert_eq!(h.worker.resources().loaded_count(), 0);
    assert_eq!(device.reserved_memory(), device.allocated_memory());
}

#[test]
fn test_interleaved_job_types_thrash_the_cache() {
    let mut h = harness(ProcessorRegistry::with_defaults());
    for (i, job) in [image_job("a"), story_job("b"), image_job("c")].iter().enumerate() {
        let outcome = h.worker.handle_message(job).unwrap();
        assert_eq!(outcome.status, JobStatus::Completed, "job {i}");
    }

    // sdxl (3500) then story-video (needs 5000 of 4000 free) then sdxl again
    // (needs 4000 of 3000 free): two full flushes.
    assert_eq!(h.worker.resources().stats().evictions, 2);
    assert_eq!(h.worker.resources().loaded_models(), vec!["sdxl".to_string()]);
}

#[tokio::test]
async fn test_idle_loop_publishes_nothing() {
    let h = harness(ProcessorRegistry::with_defaults());
    let publisher = h.publisher.clone();
    let mut worker = h.worker;

    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let handle = tokio::spawn(async move {
        worker.run(stop).await;
        worker
    });

    tokio::time::sleep(Duration::from_millis(1500)).await;
    shutdown.cancel();
    let worker = handle.await.unwrap();

    assert!(publisher.events().is_empty());
    assert!(worker.stats().idle_polls >= 1);
}

#[tokio::test]
async fn test_run_processes_queue_in_order() {
    let h = harness(ProcessorRegistry::with_defaults());
    for id in ["1", "2", "3"] {
        h.queue.push_raw(image_job(id));
    }
    h.queue.push_raw("garbage");
    h.queue.push_raw(envelope("4", json!({"jobType": "hologram"})));

    let publisher = h.publisher.clone();
    let mut worker = h.worker;
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let handle = tokio::spawn(async move {
        worker.run(stop).await;
        worker
    });

    for _ in 0..200 {
        if publisher.events().len() >= 8 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    let worker = handle.await.unwrap();

    let events = publisher.events();
    let order: Vec<(&str, JobStatus)> = events.iter().map(|e| (e.job_id.as_str(), e.status)).collect();
    assert_eq!(
        order,
        vec![
            ("1", JobStatus::Processing),
            ("1", JobStatus::Completed),
            ("2", JobStatus::Processing),
            ("2", JobStatus::Completed),
            ("3", JobStatus::Processing),
            ("3", JobStatus::Completed),
            ("4", JobStatus::Processing),
            ("4", JobStatus::Failed),
        ]
    );
    assert_eq!(worker.stats().malformed, 1);
    // Models are unloaded when the loop stops.
    assert_eq!(worker.resources().loaded_count(), 0);
}

#[tokio::test]
async fn test_broadcast_subscriber_sees_lifecycle() {
    let device: SharedDevice = Arc::new(SimulatedDevice::rtx_3050());
    let ctx = WorkerContext::local_with_device(Config::default(), device).unwrap();
    let mut rx = ctx.publisher.subscribe().unwrap();
    let mut worker = Worker::new(Arc::new(ctx));

    worker.handle_message(&envelope(
        "v",
        json!({"jobType": "3d-video", "prompt": "a drone shot over a canyon", "duration": 15}),
    ));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.status, JobStatus::Processing);
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(second.result.unwrap()["frames"], 15 * 30);
}

#[test]
fn test_publisher_without_subscribers_does_not_fail_jobs() {
    let device: SharedDevice = Arc::new(SimulatedDevice::rtx_3050());
    let publisher = Arc::new(BroadcastPublisher::new("job-updates", 4));
    let ctx = WorkerContext::new(
        Config::default(),
        device,
        Arc::new(InMemoryQueue::new("q")),
        publisher.clone(),
        Arc::new(Metrics::new().unwrap()),
    );
    assert_eq!(publisher.subscriber_count(), 0);

    let mut worker = Worker::new(Arc::new(ctx));
    let outcome = worker.handle_message(&image_job("lonely")).unwrap();
    assert_eq!(outcome.status, JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_long_job_does_not_hold_runtime_thread() {
    let (release, held) = mpsc::channel();
    let gated: Arc<dyn Processor> = Arc::new(Gated(Mutex::new(held)));
    let mut registry = ProcessorRegistry::with_defaults();
    registry.register(JobType::ClothSwap, move |_| gated.clone());
    let h = harness(registry);
    h.queue.push_raw(envelope(
        "slow",
        json!({"jobType": "cloth-swap", "personUrl": "p", "clothUrl": "c", "category": "casual"}),
    ));

    let publisher = h.publisher.clone();
    let shutdown = CancellationToken::new();
    let handle = h.worker.spawn_dedicated(shutdown.clone());

    for _ in 0..200 {
        if !publisher.events().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(publisher.events().len(), 1, "job never started");

    // The only runtime worker thread still picks up new tasks mid-job.
    let other = tokio::time::timeout(Duration::from_secs(2), tokio::spawn(async { 7 })).await;
    assert_eq!(other.expect("runtime thread is blocked").unwrap(), 7);

    release.send(()).unwrap();
    shutdown.cancel();
    let worker = handle.await.unwrap();
    assert_eq!(worker.stats().completed, 1);
    assert_lifecycle(&publisher.events(), "slow", JobStatus::Completed);
}
