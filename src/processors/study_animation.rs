//! Narrated educational animation built from a script.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use crate::cache::manager::ResourceManager;
use crate::config::ModelSpec;
use crate::inference::PlaceholderBackend;
use crate::jobs::{JobError, JobPayload, JobType};
use crate::processors::{artifact_path, mismatched, Processor, FPS};
use crate::worker::WorkerContext;

/// Narration pace used to time scenes.
const SECONDS_PER_WORD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: usize,
    pub text: String,
    pub duration: f64,
}

/// Split a script into one scene per sentence.
pub fn parse_script(script: &str) -> Vec<Scene> {
    script
        .split('.')
        .enumerate()
        .filter_map(|(id, sentence)| {
            let text = sentence.trim();
            if text.is_empty() {
                return None;
            }
            Some(Scene {
                id,
                text: text.to_string(),
                duration: text.split_whitespace().count() as f64 * SECONDS_PER_WORD,
            })
        })
        .collect()
}

pub struct StudyAnimationGenerator {
    spec: ModelSpec,
    output_dir: PathBuf,
}

impl StudyAnimationGenerator {
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            spec: ctx.config.models.for_job(JobType::StudyAnimation).clone(),
            output_dir: ctx.config.output_dir.0.clone(),
        }
    }
}

impl Processor for StudyAnimationGenerator {
    fn process(
        &self,
        job_id: &str,
        payload: &JobPayload,
        resources: &mut ResourceManager,
    ) -> Result<Value, JobError> {
        let JobPayload::StudyAnimation(req) = payload else {
            return Err(mismatched(JobType::StudyAnimation.as_str(), payload));
        };

        info!(job_id, topic = req.topic, subject = req.subject, "Generating study animation");
        let scenes = parse_script(&req.script);

        let backend = resources.acquire_as::<PlaceholderBackend, _>(
            &self.spec.name,
            PlaceholderBackend::loader(&self.spec),
            self.spec.required_vram_mb,
        )?;

        let mut audio_files = Vec::with_capacity(scenes.len());
        let mut total_frames = 0u64;
        for scene in &scenes {
            backend.invoke();
            audio_files.push(artifact_path(
                &self.output_dir,
                format!("voiceover_{job_id}_{}.wav", scene.id),
            ));
            total_frames += (scene.duration * FPS as f64) as u64;
        }

        Ok(json!({
            "video_path": artifact_path(&self.output_dir, format!("study_animation_{job_id}.mp4")),
            "duration": total_frames as f64 / FPS as f64,
            "scenes": scenes.len(),
            "audio_files": audio_files,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_skips_empty_sentences() {
        let scenes = parse_script("Atoms bond. . Electrons are shared between them.");
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].text, "Atoms bond");
        assert_eq!(scenes[0].duration, 1.0);
        assert_eq!(scenes[1].id, 2);
        assert_eq!(scenes[1].duration, 2.5);
    }
}
