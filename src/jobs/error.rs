//! Per-job failure taxonomy.
//!
//! Every variant ends up as the `error` string of a `failed` status event;
//! none of them escape the dispatch loop.

use thiserror::Error;

use crate::cache::manager::ResourceError;
use crate::gpu::DeviceError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Invalid {job_type} payload: {reason}")]
    InvalidPayload { job_type: String, reason: String },

    #[error(transparent)]
    ModelLoad(#[from] ResourceError),

    #[error(transparent)]
    DeviceExhaustion(#[from] DeviceError),

    #[error("{0:#}")]
    Inference(anyhow::Error),
}

impl JobError {
    pub fn invalid(job_type: impl Into<String>, reason: impl Into<String>) -> Self {
        JobError::InvalidPayload {
            job_type: job_type.into(),
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        // Keep allocation failures recognisable when they surface from a body.
        match err.downcast::<DeviceError>() {
            Ok(device) => JobError::DeviceExhaustion(device),
            Err(other) => JobError::Inference(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_recovered_from_anyhow() {
        let err: JobError = anyhow::Error::new(DeviceError::OutOfMemory {
            requested: 10,
            allocated: 5,
            total: 12,
        })
        .into();
        assert!(matches!(err, JobError::DeviceExhaustion(_)));

        let err: JobError = anyhow::anyhow!("sampler diverged").into();
        assert_eq!(err.to_string(), "sampler diverged");
    }
}
