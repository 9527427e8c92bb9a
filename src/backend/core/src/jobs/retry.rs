//! Retry eligibility and backoff policy.
//!
//! Pure decision logic: given a job's retry counters and status, decide
//! whether another attempt is permitted and how long to wait before it.
//! Stateless by design so it can be tested against plain tables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{JobRecord, JobStatus};

// ═══════════════════════════════════════════════════════════════════════════════
// Backoff Strategy
// ═══════════════════════════════════════════════════════════════════════════════

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed { delay_ms: u64 },
    /// Exponential increase in delay (base * 2^retry_count), capped
    Exponential { base_delay_ms: u64, max_delay_ms: u64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base_delay_ms: 1000,
            max_delay_ms: 3_600_000, // 1 hour cap
        }
    }
}

impl BackoffStrategy {
    /// Calculate the delay before the attempt following `retry_count`
    /// consumed retries.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let ms = match self {
            Self::Fixed { delay_ms } => *delay_ms,
            Self::Exponential {
                base_delay_ms,
                max_delay_ms,
            } => {
                // 2^retry_count with saturation so large counts stay at the cap
                let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
                base_delay_ms.saturating_mul(factor).min(*max_delay_ms)
            }
        };

        Duration::from_millis(ms)
    }

    /// Create a fixed backoff strategy.
    pub fn fixed(delay_ms: u64) -> Self {
        Self::Fixed { delay_ms }
    }

    /// Create an exponential backoff strategy.
    pub fn exponential(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self::Exponential {
            base_delay_ms,
            max_delay_ms,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Retry Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry decision logic shared by the coordinator and the manual retry path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Backoff strategy for automatic re-enqueue delays
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(backoff: BackoffStrategy) -> Self {
        Self { backoff }
    }

    /// A failed job with remaining budget is retry-eligible; nothing else is.
    pub fn can_retry(status: JobStatus, retry_count: u32, max_retries: u32) -> bool {
        status == JobStatus::Failed && retry_count < max_retries
    }

    /// Eligibility check against a full record.
    pub fn is_eligible(&self, job: &JobRecord) -> bool {
        Self::can_retry(job.status, job.retry_count, job.max_retries)
    }

    /// Delay before the next attempt of a job that has consumed
    /// `retry_count` retries.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        self.backoff.delay_for(retry_count)
    }
}
