//! Job record definitions.
//!
//! This module provides the core types of the job lifecycle:
//!
//! - **JobId**: Opaque unique identifier, assigned at creation
//! - **JobStatus**: Enumeration of lifecycle states
//! - **JobRecord**: The persisted job, including its append-only log
//! - **CreateJobRequest / JobFilter / JobStats**: Boundary shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string representation.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting for dispatch (or re-dispatch after a retry reset)
    Pending,
    /// Job is currently being executed by a worker slot
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed (processor error, timeout, or cancellation)
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    ///
    /// `Failed` is terminal only once the retry budget is exhausted; that
    /// check needs the record's counters, see [`JobRecord::can_retry`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if a job in this status may be cancelled.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Parse from the lowercase wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Log
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity of a job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One entry in a job's append-only execution log.
///
/// Insertion order is significant and never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
}

impl JobLogEntry {
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Record
// ═══════════════════════════════════════════════════════════════════════════════

/// The persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique job identifier, immutable after creation
    pub id: JobId,
    /// Processor selector tag, immutable after creation
    #[serde(rename = "type")]
    pub job_type: String,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Opaque payload passed verbatim to the processor
    pub payload: serde_json::Value,
    /// Time after which the job becomes eligible for dispatch
    pub scheduled_time: DateTime<Utc>,
    /// When execution started; unset while pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of retries consumed so far
    pub retry_count: u32,
    /// Retry ceiling, fixed at creation
    pub max_retries: u32,
    /// Worker currently or most recently processing this job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    /// Append-only execution log
    pub logs: Vec<JobLogEntry>,
    /// Last failure message; cleared on retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a new pending record.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            payload,
            scheduled_time: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            assigned_worker: None,
            logs: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the dispatch eligibility time.
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_time = at;
        self
    }

    /// Set the retry ceiling.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Mark as running on the given worker.
    pub fn mark_running(&mut self, worker: impl Into<String>) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.assigned_worker = Some(worker.into());
        self.touch();
    }

    /// Mark as completed.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.error = None;
        self.touch();
    }

    /// Mark as failed with the given error message.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.touch();
    }

    /// Reset to pending for another attempt.
    ///
    /// Consumes one unit of the retry budget and clears the per-attempt
    /// fields so the record reads as freshly pending.
    pub fn reset_for_retry(&mut self) {
        self.retry_count += 1;
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
        self.touch();
    }

    /// Append a log entry.
    pub fn push_log(&mut self, message: impl Into<String>, level: LogLevel) {
        self.logs.push(JobLogEntry::new(message, level));
        self.touch();
    }

    /// Check if the job is retry-eligible.
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }

    /// Refresh `updated_at`.
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Boundary Shapes
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry policy fragment of a creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyRequest {
    /// Retry ceiling for the new job
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    pub delay: u64,
}

/// Job creation input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: serde_json::Value,
    /// ISO-8601 time after which the job becomes dispatch-eligible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicyRequest>,
}

/// Job listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub status: Option<JobStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl JobFilter {
    /// Effective page number (1-indexed, default 1).
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Effective page size (default 10).
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(10).max(1)
    }

    /// Offset of the first item: `skip = (page - 1) * limit`.
    pub fn skip(&self) -> u64 {
        (self.page() - 1) * self.limit()
    }

    /// Check whether a record passes the filter.
    pub fn matches(&self, job: &JobRecord) -> bool {
        if let Some(ref t) = self.job_type {
            if &job.job_type != t {
                return false;
            }
        }
        if let Some(s) = self.status {
            if job.status != s {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if job.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if job.created_at > end {
                return false;
            }
        }
        true
    }
}

/// Aggregate job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}
