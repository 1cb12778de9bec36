//! Typed job payloads.
//!
//! `data` arrives as loose JSON. It is decoded into [`JobPayload`] and
//! range-checked at the dispatch boundary so processors only ever see
//! well-formed requests. Defaults and limits follow the producer-side schemas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::error::JobError;
use crate::jobs::types::JobType;

/// Payload of a job, keyed by `jobType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "jobType")]
pub enum JobPayload {
    #[serde(rename = "image-generation")]
    ImageGeneration(ImageGenerationRequest),
    #[serde(rename = "cloth-swap")]
    ClothSwap(ClothSwapRequest),
    #[serde(rename = "influencer-creation")]
    InfluencerCreation(InfluencerRequest),
    #[serde(rename = "3d-video")]
    Video3d(Video3dRequest),
    #[serde(rename = "study-animation")]
    StudyAnimation(StudyAnimationRequest),
    #[serde(rename = "story-video")]
    StoryVideo(StoryVideoRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_one")]
    pub num_images: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClothSwapRequest {
    pub person_url: String,
    pub cloth_url: String,
    pub category: String,
    #[serde(default = "default_true")]
    pub preserve_face: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencerRequest {
    pub gender: String,
    pub ethnicity: String,
    pub age_range: String,
    pub style: String,
    #[serde(default = "default_poses")]
    pub poses: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video3dRequest {
    pub prompt: String,
    #[serde(default = "default_video_duration")]
    pub duration: u32,
    #[serde(default = "default_camera_movement")]
    pub camera_movement: String,
    #[serde(default = "default_video_style")]
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyAnimationRequest {
    pub topic: String,
    pub script: String,
    pub subject: String,
    pub animation_style: String,
    #[serde(default = "default_study_duration")]
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryVideoRequest {
    pub script: String,
    pub visual_style: String,
    pub voice_style: String,
    #[serde(default = "default_music")]
    pub background_music: String,
}

fn default_dimension() -> u32 {
    1024
}
fn default_steps() -> u32 {
    30
}
fn default_one() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_poses() -> u32 {
    5
}
fn default_video_duration() -> u32 {
    30
}
fn default_camera_movement() -> String {
    "orbit".to_string()
}
fn default_video_style() -> String {
    "realistic".to_string()
}
fn default_study_duration() -> u32 {
    60
}
fn default_music() -> String {
    "none".to_string()
}

const DIMENSIONS: &[u32] = &[512, 768, 1024, 1536];
const IMAGE_STYLES: &[&str] = &["realistic", "artistic", "cinematic", "anime", "3d-render"];
const CLOTH_CATEGORIES: &[&str] = &["formal", "traditional", "western", "fitness", "casual"];
const GENDERS: &[&str] = &["male", "female", "non-binary"];
const AGE_RANGES: &[&str] = &["18-25", "26-35", "36-45", "46+"];
const VIDEO_DURATIONS: &[u32] = &[15, 30, 60];
const CAMERA_MOVEMENTS: &[&str] = &["orbit", "dolly", "pan", "static"];
const VIDEO_STYLES: &[&str] = &["realistic", "cartoon", "cinematic", "abstract"];
const SUBJECTS: &[&str] = &["science", "mathematics", "history", "literature", "technology"];
const ANIMATION_STYLES: &[&str] = &["3d-cgi", "whiteboard", "explainer", "motion-graphics"];
const STUDY_DURATIONS: &[u32] = &[30, 60, 120, 180];
const VISUAL_STYLES: &[&str] = &["pixar", "realistic", "anime", "cartoon", "cinematic"];
const VOICE_STYLES: &[&str] = &["male-deep", "male-warm", "female-soft", "female-energetic", "child"];
const MUSIC: &[&str] = &["epic", "emotional", "uplifting", "mysterious", "none"];

/// Collects the first violation found while checking a request.
struct Checker {
    job_type: JobType,
}

impl Checker {
    fn fail(&self, reason: String) -> JobError {
        JobError::invalid(self.job_type.as_str(), reason)
    }

    fn length(&self, field: &str, value: &str, min: usize, max: usize) -> Result<(), JobError> {
        let len = value.chars().count();
        if len < min || len > max {
            return Err(self.fail(format!(
                "{field} must be between {min} and {max} characters, got {len}"
            )));
        }
        Ok(())
    }

    fn range(&self, field: &str, value: u32, min: u32, max: u32) -> Result<(), JobError> {
        if value < min || value > max {
            return Err(self.fail(format!("{field} must be between {min} and {max}, got {value}")));
        }
        Ok(())
    }

    fn one_of<T>(&self, field: &str, value: &T, allowed: &[T]) -> Result<(), JobError>
    where
        T: PartialEq + std::fmt::Debug,
    {
        if !allowed.contains(value) {
            return Err(self.fail(format!("{field} must be one of {allowed:?}, got {value:?}")));
        }
        Ok(())
    }

    fn required(&self, field: &str, value: &str) -> Result<(), JobError> {
        if value.trim().is_empty() {
            return Err(self.fail(format!("{field} is required")));
        }
        Ok(())
    }
}

impl JobPayload {
    /// Decode and validate `data` for a job already resolved to `job_type`.
    pub fn parse(job_type: JobType, data: &Value) -> Result<Self, JobError> {
        let payload: JobPayload = serde_json::from_value(data.clone())
            .map_err(|e| JobError::invalid(job_type.as_str(), e.to_string()))?;

        if payload.job_type() != job_type {
            return Err(JobError::invalid(
                job_type.as_str(),
                format!("payload is tagged {}", payload.job_type()),
            ));
        }

        payload.validate()?;
        Ok(payload)
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::ImageGeneration(_) => JobType::ImageGeneration,
            JobPayload::ClothSwap(_) => JobType::ClothSwap,
            JobPayload::InfluencerCreation(_) => JobType::InfluencerCreation,
            JobPayload::Video3d(_) => JobType::Video3d,
            JobPayload::StudyAnimation(_) => JobType::StudyAnimation,
            JobPayload::StoryVideo(_) => JobType::StoryVideo,
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        let c = Checker {
            job_type: self.job_type(),
        };

        match self {
            JobPayload::ImageGeneration(req) => {
                c.length("prompt", &req.prompt, 3, 1000)?;
                c.length("negativePrompt", &req.negative_prompt, 0, 500)?;
                c.one_of("width", &req.width, DIMENSIONS)?;
                c.one_of("height", &req.height, DIMENSIONS)?;
                c.range("steps", req.steps, 20, 50)?;
                c.range("numImages", req.num_images, 1, 4)?;
                if let Some(style) = &req.style {
                    c.one_of("style", &style.as_str(), IMAGE_STYLES)?;
                }
            }
            JobPayload::ClothSwap(req) => {
                c.required("personUrl", &req.person_url)?;
                c.required("clothUrl", &req.cloth_url)?;
                c.one_of("category", &req.category.as_str(), CLOTH_CATEGORIES)?;
            }
            JobPayload::InfluencerCreation(req) => {
                c.one_of("gender", &req.gender.as_str(), GENDERS)?;
                c.required("ethnicity", &req.ethnicity)?;
                c.one_of("ageRange", &req.age_range.as_str(), AGE_RANGES)?;
                c.required("style", &req.style)?;
                c.range("poses", req.poses, 1, 10)?;
            }
            JobPayload::Video3d(req) => {
                c.length("prompt", &req.prompt, 10, 1000)?;
                c.one_of("duration", &req.duration, VIDEO_DURATIONS)?;
                c.one_of("cameraMovement", &req.camera_movement.as_str(), CAMERA_MOVEMENTS)?;
                c.one_of("style", &req.style.as_str(), VIDEO_STYLES)?;
            }
            JobPayload::StudyAnimation(req) => {
                c.length("topic", &req.topic, 3, 200)?;
                c.length("script", &req.script, 10, 5000)?;
                c.one_of("subject", &req.subject.as_str(), SUBJECTS)?;
                c.one_of("animationStyle", &req.animation_style.as_str(), ANIMATION_STYLES)?;
                c.one_of("duration", &req.duration, STUDY_DURATIONS)?;
            }
            JobPayload::StoryVideo(req) => {
                c.length("script", &req.script, 50, 10000)?;
                c.one_of("visualStyle", &req.visual_style.as_str(), VISUAL_STYLES)?;
                c.one_of("voiceStyle", &req.voice_style.as_str(), VOICE_STYLES)?;
                c.one_of("backgroundMusic", &req.background_music.as_str(), MUSIC)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_generation_defaults() {
        let data = json!({"jobType": "image-generation", "prompt": "a red fox", "jobId": "1"});
        let payload = JobPayload::parse(JobType::ImageGeneration, &data).unwrap();
        match payload {
            JobPayload::ImageGeneration(req) => {
                assert_eq!(req.width, 1024);
                assert_eq!(req.steps, 30);
                assert_eq!(req.num_images, 1);
                assert_eq!(req.negative_prompt, "");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_image_style_is_optional_but_checked() {
        let data = json!({"jobType": "image-generation", "prompt": "a red fox", "style": "anime"});
        assert!(JobPayload::parse(JobType::ImageGeneration, &data).is_ok());

        let data = json!({"jobType": "image-generation", "prompt": "a red fox", "style": "watercolor"});
        let err = JobPayload::parse(JobType::ImageGeneration, &data).unwrap_err();
        assert!(err.to_string().contains("style must be one of"), "{err}");
    }

    #[test]
    fn test_cloth_category_outside_allowed_set() {
        let data = json!({"jobType": "cloth-swap", "personUrl": "p", "clothUrl": "c", "category": "upper_body"});
        let err = JobPayload::parse(JobType::ClothSwap, &data).unwrap_err();
        assert!(err.to_string().contains("category"), "{err}");
    }

    #[test]
    fn test_missing_required_field() {
        let data = json!({"jobType": "cloth-swap", "category": "formal"});
        let err = JobPayload::parse(JobType::ClothSwap, &data).unwrap_err();
        assert!(matches!(err, JobError::InvalidPayload { .. }));
        assert!(err.to_string().contains("personUrl"), "{err}");
    }

    #[test]
    fn test_out_of_range_values() {
        let data = json!({"jobType": "image-generation", "prompt": "a red fox", "numImages": 9});
        let err = JobPayload::parse(JobType::ImageGeneration, &data).unwrap_err();
        assert!(err.to_string().contains("numImages"));

        let data = json!({"jobType": "3d-video", "prompt": "a slow orbit of a castle", "duration": 45});
        let err = JobPayload::parse(JobType::Video3d, &data).unwrap_err();
        assert!(err.to_string().contains("duration"));

        let data = json!({"jobType": "story-video", "script": "too short",
                          "visualStyle": "pixar", "voiceStyle": "child"});
        assert!(JobPayload::parse(JobType::StoryVideo, &data).is_err());
    }

    #[test]
    fn test_tag_must_match_resolved_type() {
        let data = json!({"jobType": "cloth-swap", "personUrl": "p", "clothUrl": "c", "category": "casual"});
        let err = JobPayload::parse(JobType::StoryVideo, &data).unwrap_err();
        assert!(err.to_string().contains("tagged cloth-swap"));
    }

    #[test]
    fn test_influencer_enums() {
        let data = json!({"jobType": "influencer-creation", "gender": "female", "ethnicity": "any",
                          "ageRange": "26-35", "style": "fitness"});
        assert!(JobPayload::parse(JobType::InfluencerCreation, &data).is_ok());

        let data = json!({"jobType": "influencer-creation", "gender": "robot", "ethnicity": "any",
                          "ageRange": "26-35", "style": "fitness"});
        assert!(JobPayload::parse(JobType::InfluencerCreation, &data).is_err());
    }
}
