//! Job envelopes, job types and status events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::jobs::error::JobError;

/// The job types the worker knows how to construct processors for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "image-generation")]
    ImageGeneration,
    #[serde(rename = "cloth-swap")]
    ClothSwap,
    #[serde(rename = "influencer-creation")]
    InfluencerCreation,
    #[serde(rename = "3d-video")]
    Video3d,
    #[serde(rename = "study-animation")]
    StudyAnimation,
    #[serde(rename = "story-video")]
    StoryVideo,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::ImageGeneration,
        JobType::ClothSwap,
        JobType::InfluencerCreation,
        JobType::Video3d,
        JobType::StudyAnimation,
        JobType::StoryVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImageGeneration => "image-generation",
            JobType::ClothSwap => "cloth-swap",
            JobType::InfluencerCreation => "influencer-creation",
            JobType::Video3d => "3d-video",
            JobType::StudyAnimation => "study-animation",
            JobType::StoryVideo => "story-video",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| JobError::UnknownJobType(s.to_string()))
    }
}

/// Wire-level unit popped from the queue.
///
/// ```json
/// { "jobId": "42", "data": { "jobType": "image-generation", "prompt": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    #[serde(deserialize_with = "string_or_number")]
    pub job_id: String,
    #[serde(default)]
    pub data: Value,
}

impl JobEnvelope {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Producers key jobs by database row id, which may arrive as a number.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "jobId must be a string or number, got {other}"
        ))),
    }
}

/// A dequeued job. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: String,
    job_type: Option<String>,
    data: Value,
}

impl Job {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        let job_type = data
            .get("jobType")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            id: id.into(),
            job_type,
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw `jobType` string as sent by the producer.
    pub fn job_type(&self) -> Option<&str> {
        self.job_type.as_deref()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl From<JobEnvelope> for Job {
    fn from(envelope: JobEnvelope) -> Self {
        Job::new(envelope.job_id, envelope.data)
    }
}

/// Lifecycle state of a job as seen by this worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Transitions only move forward: queued → processing → completed | failed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition published on the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusEvent {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusEvent {
    pub fn processing(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Processing,
            result: None,
            error: None,
        }
    }

    pub fn completed(job_id: impl Into<String>, result: Value) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}
