//! Typed processor registry.
//!
//! Processors are resolved by job type at registration time rather than at
//! dispatch time: registering a duplicate type fails immediately, and a
//! delivery for an unregistered type fails fast with `UnknownProcessor`
//! instead of silently stalling.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, WorkhorseError};
use crate::jobs::JobRecord;

/// Error produced by a processor execution.
#[derive(Debug, Clone)]
pub struct ProcessorError {
    pub message: String,
}

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProcessorError {}

/// Result of a processor execution: an opaque result value on success.
pub type ProcessorResult = std::result::Result<serde_json::Value, ProcessorError>;

/// A unit of work bound to one job type.
#[async_trait]
pub trait Processor: Send + Sync {
    /// The job type this processor handles.
    fn job_type(&self) -> &'static str;

    /// Execute the job. The payload arrives verbatim from the record.
    async fn process(&self, job: &JobRecord) -> ProcessorResult;
}

/// Registry mapping job types to processors.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<&'static str, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor. Duplicate job types are rejected.
    pub fn register(&mut self, processor: Arc<dyn Processor>) -> Result<()> {
        let job_type = processor.job_type();
        if self.processors.contains_key(job_type) {
            return Err(WorkhorseError::validation(format!(
                "Processor already registered for job type '{}'",
                job_type
            )));
        }
        self.processors.insert(job_type, processor);
        tracing::debug!(job_type, "Processor registered");
        Ok(())
    }

    /// Resolve the processor for a job type.
    pub fn resolve(&self, job_type: &str) -> Result<Arc<dyn Processor>> {
        self.processors
            .get(job_type)
            .cloned()
            .ok_or_else(|| WorkhorseError::unknown_processor(job_type))
    }

    /// Whether a job type is registered.
    pub fn contains(&self, job_type: &str) -> bool {
        self.processors.contains_key(job_type)
    }

    /// Registered job types.
    pub fn job_types(&self) -> Vec<&'static str> {
        self.processors.keys().copied().collect()
    }
}
