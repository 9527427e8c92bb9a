//! Worker record definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::jobs::JobId;

/// Unique identifier for a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Registered and ready for work
    Idle,
    /// Currently processing a job
    Active,
    /// Heartbeat expired or self-reported failure
    Failed,
}

impl WorkerStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "active" => Some(Self::Active),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A registered worker and its latest self-reported state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: WorkerId,
    /// Unique human-readable label, enforced at registration
    pub name: String,
    pub status: WorkerStatus,
    /// Job currently being processed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<JobId>,
    /// Jobs finished on this worker; increments on active-to-idle handoff
    pub processed_jobs: u64,
    /// Refreshed on every status report
    pub last_heartbeat: DateTime<Utc>,
    /// Latest self-reported metrics, overwritten each heartbeat
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// Create a freshly registered idle worker.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkerId::new(),
            name: name.into(),
            status: WorkerStatus::Idle,
            current_job: None,
            processed_jobs: 0,
            last_heartbeat: now,
            memory_usage: 0.0,
            cpu_usage: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Metrics fragment of a status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMetrics {
    pub memory_usage: f64,
    pub cpu_usage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job: Option<JobId>,
}
