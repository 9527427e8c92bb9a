//! Job scheduling system for Workhorse Core.
//!
//! This module provides the job lifecycle state machine and its
//! collaborators:
//!
//! - **Job records**: Status, retry counters, append-only logs
//! - **Retry policy**: Pure eligibility and backoff decisions
//! - **Dispatch queue**: Named lanes with delayed visibility and
//!   deliver-once idempotency keys
//! - **Processors**: Typed registry of per-job-type handlers
//! - **Lifecycle engine**: The single owner of job mutation
//! - **Coordinator**: Glue from queue deliveries to lifecycle transitions
//!
//! # Architecture
//!
//! ```text
//! create ──▶ JobLifecycle ──▶ DispatchQueue ──▶ Coordinator ──▶ Processor
//!                ▲                                   │
//!                └────────── status transitions ─────┘
//! ```

pub mod builtin;
pub mod coordinator;
pub mod job;
pub mod lifecycle;
pub mod processor;
pub mod queue;
pub mod retry;

pub use builtin::{DataSyncProcessor, EmailProcessor, ReportProcessor};
pub use coordinator::Coordinator;
pub use job::{
    CreateJobRequest, JobFilter, JobId, JobLogEntry, JobRecord, JobStats, JobStatus,
    LogLevel, RetryPolicyRequest,
};
pub use lifecycle::{JobLifecycle, DEFAULT_LANE};
pub use processor::{Processor, ProcessorError, ProcessorRegistry, ProcessorResult};
pub use queue::{
    Delivery, DeliveryHandler, DispatchQueue, EnqueueAck, LaneBackend, MemoryLaneBackend,
    QueueConfig, RedisLaneBackend, RemoveOutcome,
};
pub use retry::{BackoffStrategy, RetryPolicy};
