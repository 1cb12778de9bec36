//! Lazily constructed, memoized processors keyed by job type.
//!
//! Constructors are registered up front but only run on the first job of
//! their type, so backends for unused job types never come into existence.
//! Processor construction is independent of model residency: a processor
//! only loads its model when it processes a job.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::jobs::{JobError, JobType};
use crate::processors::{
    ClothSwapProcessor, ImageGenerator, InfluencerCreator, Processor, StoryVideoGenerator,
    StudyAnimationGenerator, Video3dGenerator,
};
use crate::worker::WorkerContext;

/// Builds the processor for one job type.
pub type ProcessorFactory = Box<dyn Fn(&WorkerContext) -> Arc<dyn Processor> + Send + Sync>;

#[derive(Default)]
pub struct ProcessorRegistry {
    factories: HashMap<JobType, ProcessorFactory>,
    instances: HashMap<JobType, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// A registry with no constructors.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a constructor for every built-in job type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(JobType::ImageGeneration, |ctx| Arc::new(ImageGenerator::new(ctx)));
        registry.register(JobType::ClothSwap, |ctx| Arc::new(ClothSwapProcessor::new(ctx)));
        registry.register(JobType::InfluencerCreation, |ctx| {
            Arc::new(InfluencerCreator::new(ctx))
        });
        registry.register(JobType::Video3d, |ctx| Arc::new(Video3dGenerator::new(ctx)));
        registry.register(JobType::StudyAnimation, |ctx| {
            Arc::new(StudyAnimationGenerator::new(ctx))
        });
        registry.register(JobType::StoryVideo, |ctx| Arc::new(StoryVideoGenerator::new(ctx)));
        registry
    }

    /// Register (or replace) the constructor for `job_type`.
    ///
    /// Replacing a constructor drops any instance already built from the old one.
    pub fn register<F>(&mut self, job_type: JobType, factory: F)
    where
        F: Fn(&WorkerContext) -> Arc<dyn Processor> + Send + Sync + 'static,
    {
        self.instances.remove(&job_type);
        self.factories.insert(job_type, Box::new(factory));
    }

    /// The processor for `job_type`, constructing it on first request.
    pub fn get(&mut self, job_type: JobType, ctx: &WorkerContext) -> Result<Arc<dyn Processor>, JobError> {
        if let Some(processor) = self.instances.get(&job_type) {
            return Ok(processor.clone());
        }

        let factory = self
            .factories
            .get(&job_type)
            .ok_or_else(|| JobError::UnknownJobType(job_type.to_string()))?;

        info!(job_type = %job_type, "Loading processor");
        let processor = factory(ctx);
        self.instances.insert(job_type, processor.clone());
        Ok(processor)
    }

    /// Resolve a raw `jobType` string from a job envelope.
    pub fn resolve(
        &mut self,
        raw: Option<&str>,
        ctx: &WorkerContext,
    ) -> Result<(JobType, Arc<dyn Processor>), JobError> {
        let raw = raw.ok_or_else(|| JobError::UnknownJobType("<missing>".to_string()))?;
        let job_type: JobType = raw.parse()?;
        let processor = self.get(job_type, ctx)?;
        Ok((job_type, processor))
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.factories.contains_key(&job_type)
    }

    pub fn is_instantiated(&self, job_type: JobType) -> bool {
        self.instances.contains_key(&job_type)
    }

    pub fn instantiated(&self) -> usize {
        self.instances.len()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("registered", &self.factories.keys().collect::<Vec<_>>())
            .field("instantiated", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}
