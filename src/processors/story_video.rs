//! Cinematic story video: one narrated scene per paragraph.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use crate::cache::manager::ResourceManager;
use crate::config::ModelSpec;
use crate::inference::PlaceholderBackend;
use crate::jobs::{JobError, JobPayload, JobType};
use crate::processors::{artifact_path, mismatched, Processor, FPS};
use crate::worker::WorkerContext;

const SECONDS_PER_WORD: f64 = 0.4;
const RESOLUTION: (u32, u32) = (1280, 720);

#[derive(Debug, Clone, PartialEq)]
pub struct StoryScene {
    pub id: usize,
    pub text: String,
    pub word_count: usize,
    pub duration: f64,
}

/// Split a story on blank lines.
pub fn parse_story_script(script: &str) -> Vec<StoryScene> {
    script
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(id, para)| {
            let word_count = para.split_whitespace().count();
            StoryScene {
                id,
                text: para.to_string(),
                word_count,
                duration: word_count as f64 * SECONDS_PER_WORD,
            }
        })
        .collect()
}

pub struct StoryVideoGenerator {
    spec: ModelSpec,
    output_dir: PathBuf,
}

impl StoryVideoGenerator {
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            spec: ctx.config.models.for_job(JobType::StoryVideo).clone(),
            output_dir: ctx.config.output_dir.0.clone(),
        }
    }
}

impl Processor for StoryVideoGenerator {
    fn process(
        &self,
        job_id: &str,
        payload: &JobPayload,
        resources: &mut ResourceManager,
    ) -> Result<Value, JobError> {
        let JobPayload::StoryVideo(req) = payload else {
            return Err(mismatched(JobType::StoryVideo.as_str(), payload));
        };

        info!(job_id, style = req.visual_style, "Generating story video");
        let scenes = parse_story_script(&req.script);
        info!(job_id, scenes = scenes.len(), "Story parsed");

        let backend = resources.acquire_as::<PlaceholderBackend, _>(
            &self.spec.name,
            PlaceholderBackend::loader(&self.spec),
            self.spec.required_vram_mb,
        )?;

        let mut audio_files = Vec::with_capacity(scenes.len());
        let mut total_frames = 0u64;
        for scene in &scenes {
            // Narration, then the scene clip.
            backend.invoke();
            backend.invoke();
            audio_files.push(artifact_path(
                &self.output_dir,
                format!("narration_{job_id}_{}.wav", scene.id),
            ));
            total_frames += (scene.duration * FPS as f64) as u64;
            info!(job_id, "Scene {}/{} completed", scene.id + 1, scenes.len());
        }

        Ok(json!({
            "video_path": artifact_path(&self.output_dir, format!("story_video_{job_id}.mp4")),
            "duration": total_frames as f64 / FPS as f64,
            "scenes": scenes.len(),
            "audio_files": audio_files,
            "backgroundMusic": req.background_music,
            "resolution": format!("{}x{}", RESOLUTION.0, RESOLUTION.1),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_story_script_by_paragraph() {
        let scenes = parse_story_script("Once upon a time.\n\n\n\nThe end came quickly for the dragon.");
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].word_count, 4);
        assert_eq!(scenes[1].id, 1);
        assert!((scenes[1].duration - 2.8).abs() < 1e-9);
    }
}
