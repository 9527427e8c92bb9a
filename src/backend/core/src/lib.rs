//! # Workhorse Core
//!
//! Job scheduling and worker coordination engine.
//!
//! ## Architecture
//!
//! - **Job Lifecycle Engine**: The state machine owning every job status
//!   transition (pending → running → completed/failed, retries,
//!   cancellation)
//! - **Dispatch Queue**: Named lanes with delayed visibility, deliver-once
//!   idempotency keys, and bounded consumer pools
//! - **Retry Policy**: Pure eligibility and exponential-backoff decisions
//! - **Worker Registry**: Heartbeat tracking, metrics, and staleness sweeps
//! - **Coordinator**: Glues queue deliveries to lifecycle transitions and
//!   drives automatic retries
//! - **API**: REST surface over the engine

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod store;
pub mod telemetry;
pub mod workers;

pub use error::{ErrorCode, ErrorContext, Result, WorkhorseError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, SchedulerConfig};
    pub use crate::error::{ErrorCode, ErrorContext, Result, WorkhorseError};
    pub use crate::jobs::{
        Coordinator, CreateJobRequest, DispatchQueue, JobFilter, JobId, JobLifecycle,
        JobRecord, JobStats, JobStatus, LogLevel, Processor, ProcessorRegistry,
        RetryPolicy, DEFAULT_LANE,
    };
    pub use crate::store::{JobStore, MemoryStore, WorkerStore};
    pub use crate::workers::{
        StaleSweeper, SweeperConfig, Worker, WorkerId, WorkerMetrics, WorkerRegistry,
        WorkerStatus,
    };
}
