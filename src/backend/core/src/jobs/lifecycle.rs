//! Job lifecycle engine.
//!
//! Owns every job mutation. Transitions on a given id are serialized
//! through a per-id lock map, so no two transitions on the same record can
//! interleave and the `retry_count <= max_retries` invariant cannot be
//! broken by a race.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::SchedulerConfig;
use crate::error::{ErrorCode, Result, WorkhorseError};
use crate::jobs::queue::{DispatchQueue, RemoveOutcome};
use crate::jobs::{
    CreateJobRequest, JobFilter, JobId, JobRecord, JobStats, JobStatus, LogLevel,
};
use crate::store::JobStore;

/// Lane used for all job dispatch.
pub const DEFAULT_LANE: &str = "default";

/// The job lifecycle state machine.
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    queue: Arc<DispatchQueue>,
    locks: DashMap<JobId, Arc<Mutex<()>>>,
    default_max_retries: u32,
}

impl JobLifecycle {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<DispatchQueue>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            locks: DashMap::new(),
            default_max_retries: config.default_max_retries,
        }
    }

    fn lock_for(&self, id: JobId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation & Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a pending job and enqueue it for dispatch.
    ///
    /// Returns once the record is persisted and the queue item is enqueued;
    /// execution happens asynchronously.
    pub async fn create(&self, request: CreateJobRequest) -> Result<JobRecord> {
        if request.job_type.trim().is_empty() {
            return Err(WorkhorseError::validation("Job type cannot be empty"));
        }

        let now = Utc::now();
        let scheduled_time = request.schedule_time.unwrap_or(now);
        let max_retries = request
            .retry_policy
            .as_ref()
            .map(|p| p.max_attempts)
            .unwrap_or(self.default_max_retries);

        let job = JobRecord::new(request.job_type, request.payload)
            .scheduled_for(scheduled_time)
            .with_max_retries(max_retries);

        self.store.insert(job.clone()).await?;

        let delay = (scheduled_time - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.queue
            .enqueue(
                DEFAULT_LANE,
                job.id,
                job.payload.clone(),
                (delay > Duration::ZERO).then_some(delay),
            )
            .await?;

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            scheduled_time = %job.scheduled_time,
            "Job created"
        );
        Ok(job)
    }

    /// Load a job by id.
    pub async fn get(&self, id: JobId) -> Result<JobRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkhorseError::job_not_found(id))
    }

    /// Filtered, paginated listing (newest `created_at` first).
    pub async fn list(&self, filter: &JobFilter) -> Result<(Vec<JobRecord>, u64)> {
        self.store.list(filter).await
    }

    /// Aggregate counts by status.
    pub async fn stats(&self) -> Result<JobStats> {
        self.store.count_by_status().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Transition pending → running, binding the processing worker.
    pub async fn mark_running(&self, id: JobId, worker: &str) -> Result<JobRecord> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut job = self.get(id).await?;
        if job.status != JobStatus::Pending {
            return Err(WorkhorseError::invalid_transition(
                id,
                job.status,
                "start running",
            ));
        }

        job.mark_running(worker);
        self.store.save(job.clone()).await?;
        tracing::debug!(job_id = %id, worker, "Job running");
        Ok(job)
    }

    /// Transition running → completed.
    pub async fn mark_completed(&self, id: JobId) -> Result<JobRecord> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut job = self.get(id).await?;
        if job.status != JobStatus::Running {
            return Err(WorkhorseError::invalid_transition(
                id,
                job.status,
                "complete",
            ));
        }

        job.mark_completed();
        self.store.save(job.clone()).await?;
        tracing::info!(job_id = %id, "Job completed");
        Ok(job)
    }

    /// Transition running → failed, recording the failure message.
    pub async fn mark_failed(&self, id: JobId, error: &str) -> Result<JobRecord> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut job = self.get(id).await?;
        if job.status != JobStatus::Running {
            return Err(WorkhorseError::invalid_transition(id, job.status, "fail"));
        }

        job.mark_failed(error);
        self.store.save(job.clone()).await?;
        tracing::warn!(job_id = %id, error, "Job failed");
        Ok(job)
    }

    /// Reset a failed job to pending and re-enqueue it under the same id.
    ///
    /// Only legal while `status == failed` with remaining retry budget;
    /// concurrent calls serialize on the id lock so the budget cannot be
    /// overspent.
    pub async fn retry(&self, id: JobId) -> Result<JobRecord> {
        self.retry_with_delay(id, None).await
    }

    /// Retry with a dispatch delay (used for automatic backoff).
    pub async fn retry_with_delay(
        &self,
        id: JobId,
        delay: Option<Duration>,
    ) -> Result<JobRecord> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut job = self.get(id).await?;
        if job.status != JobStatus::Failed {
            return Err(WorkhorseError::not_retryable(format!(
                "Job {} is {}, only failed jobs can be retried",
                id, job.status
            )));
        }
        if job.retry_count >= job.max_retries {
            return Err(WorkhorseError::not_retryable(format!(
                "Job {} exhausted its retry budget ({}/{})",
                id, job.retry_count, job.max_retries
            )));
        }

        job.reset_for_retry();
        self.store.save(job.clone()).await?;

        self.queue
            .enqueue(DEFAULT_LANE, id, job.payload.clone(), delay)
            .await?;

        tracing::info!(
            job_id = %id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            delay_ms = delay.map(|d| d.as_millis() as u64),
            "Job retry scheduled"
        );
        Ok(job)
    }

    /// Cancel a pending or running job.
    ///
    /// The record is forced to a failed outcome immediately; removal of a
    /// not-yet-started queue item is best-effort, and a delivery already in
    /// flight keeps running with its result discarded by the coordinator.
    pub async fn cancel(&self, id: JobId) -> Result<JobRecord> {
        let job = {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;

            let mut job = self.get(id).await?;
            if !job.status.is_cancellable() {
                return Err(WorkhorseError::not_cancellable(format!(
                    "Job {} is {}, only pending or running jobs can be cancelled",
                    id, job.status
                )));
            }

            job.mark_failed("cancelled");
            self.store.save(job.clone()).await?;
            job
        };

        match self.queue.remove(DEFAULT_LANE, id).await {
            Ok(RemoveOutcome::Removed) => {
                tracing::info!(job_id = %id, "Cancelled job removed from queue");
            }
            Ok(RemoveOutcome::AlreadyStarted) => {
                tracing::info!(
                    job_id = %id,
                    "Cancelled job already dispatched, result will be discarded"
                );
            }
            Ok(RemoveOutcome::NotFound) => {}
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to remove cancelled job from queue");
            }
        }

        Ok(job)
    }

    /// Hard-remove a record regardless of status.
    ///
    /// Queue entries are left dangling; a later delivery of the deleted id
    /// finds no record and becomes a no-op.
    pub async fn delete(&self, id: JobId) -> Result<JobRecord> {
        let removed = {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            self.store.delete(id).await?
        };
        self.locks.remove(&id);

        match removed {
            Some(job) => {
                tracing::info!(job_id = %id, "Job deleted");
                Ok(job)
            }
            None => Err(WorkhorseError::job_not_found(id)),
        }
    }

    /// Append an entry to a job's execution log.
    pub async fn append_log(
        &self,
        id: JobId,
        message: &str,
        level: LogLevel,
    ) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut job = self.get(id).await?;
        job.push_log(message, level);
        self.store.save(job).await?;
        Ok(())
    }

    /// Check whether an error marks a delivery that should be silently
    /// skipped (record gone or concurrently transitioned).
    pub fn is_skippable_delivery_error(error: &WorkhorseError) -> bool {
        matches!(
            error.code(),
            ErrorCode::JobNotFound | ErrorCode::InvalidTransition
        )
    }
}
