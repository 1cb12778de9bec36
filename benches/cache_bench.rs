//! Benchmarks for the model cache and the dispatch boundary.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use gpu_job_worker::cache::manager::ResourceManager;
use gpu_job_worker::config::ModelCatalog;
use gpu_job_worker::gpu::SimulatedDevice;
use gpu_job_worker::inference::{DiffusionPipeline, PlaceholderBackend};
use gpu_job_worker::jobs::{JobEnvelope, JobPayload, JobType};

fn bench_acquire_resident(c: &mut Criterion) {
    let catalog = ModelCatalog::default();
    let sdxl = catalog.for_job(JobType::ImageGeneration);
    let mut rm = ResourceManager::new(Arc::new(SimulatedDevice::rtx_3050()), 7500);
    rm.acquire_as::<DiffusionPipeline, _>(&sdxl.name, DiffusionPipeline::loader(sdxl), sdxl.required_vram_mb)
        .unwrap();

    c.bench_function("acquire_resident_model", |b| {
        b.iter(|| {
            let pipe = rm
                .acquire_as::<DiffusionPipeline, _>(
                    black_box(&sdxl.name),
                    DiffusionPipeline::loader(sdxl),
                    sdxl.required_vram_mb,
                )
                .unwrap();
            black_box(pipe.samples());
        })
    });
}

fn bench_flush_and_reload(c: &mut Criterion) {
    let catalog = ModelCatalog::default();
    let sdxl = catalog.for_job(JobType::ImageGeneration);
    let story = catalog.for_job(JobType::StoryVideo);
    let mut rm = ResourceManager::new(Arc::new(SimulatedDevice::rtx_3050()), 7500);

    // Alternating job types flush the whole table on every switch.
    c.bench_function("alternating_models_full_flush", |b| {
        b.iter(|| {
            rm.acquire_as::<DiffusionPipeline, _>(&sdxl.name, DiffusionPipeline::loader(sdxl), sdxl.required_vram_mb)
                .unwrap();
            rm.acquire_as::<PlaceholderBackend, _>(&story.name, PlaceholderBackend::loader(story), story.required_vram_mb)
                .unwrap();
        })
    });
}

fn bench_payload_validation(c: &mut Criterion) {
    let raw = json!({
        "jobId": 1234,
        "data": {
            "jobType": "image-generation",
            "prompt": "a lighthouse on a cliff at dusk, volumetric light",
            "negativePrompt": "blurry",
            "width": 1024,
            "height": 768,
            "steps": 30,
            "numImages": 2
        }
    })
    .to_string();

    c.bench_function("decode_and_validate_envelope", |b| {
        b.iter(|| {
            let envelope = JobEnvelope::from_json(black_box(&raw)).unwrap();
            let payload = JobPayload::parse(JobType::ImageGeneration, &envelope.data).unwrap();
            black_box(payload);
        })
    });
}

criterion_group!(
    benches,
    bench_acquire_resident,
    bench_flush_and_reload,
    bench_payload_validation
);
criterion_main!(benches);
