//! Worker registry.
//!
//! Owns all worker mutation: registration (idempotent by name), heartbeat
//! status reports, listing, and staleness sweeps. Per-id locks serialize
//! mutations so reports and sweeps cannot interleave on one record.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{Result, WorkhorseError};
use crate::store::WorkerStore;
use crate::workers::{Worker, WorkerId, WorkerMetrics, WorkerStatus};

/// The worker registry.
pub struct WorkerRegistry {
    store: Arc<dyn WorkerStore>,
    locks: DashMap<WorkerId, Arc<Mutex<()>>>,
    // Serializes registrations so one name cannot race into two records
    register_lock: Mutex<()>,
}

impl WorkerRegistry {
    pub fn new(store: Arc<dyn WorkerStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            register_lock: Mutex::new(()),
        }
    }

    fn lock_for(&self, id: WorkerId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Register a worker by name.
    ///
    /// Idempotent: re-registering an existing name reactivates it to idle
    /// and refreshes its heartbeat instead of duplicating the record.
    pub async fn register(&self, name: &str) -> Result<Worker> {
        if name.trim().is_empty() {
            return Err(WorkhorseError::validation("Worker name cannot be empty"));
        }

        let _guard = self.register_lock.lock().await;

        let worker = match self.store.get_by_name(name).await? {
            Some(mut existing) => {
                existing.status = WorkerStatus::Idle;
                existing.last_heartbeat = Utc::now();
                existing.touch();
                self.store.save(existing.clone()).await?;
                tracing::info!(worker = name, worker_id = %existing.id, "Worker re-registered");
                existing
            }
            None => {
                let worker = Worker::new(name);
                self.store.insert(worker.clone()).await?;
                tracing::info!(worker = name, worker_id = %worker.id, "Worker registered");
                worker
            }
        };

        Ok(worker)
    }

    /// Apply a heartbeat status report.
    ///
    /// Refreshes the heartbeat and metrics. A transition to idle while a
    /// current job was held counts one processed job.
    pub async fn report_status(
        &self,
        id: WorkerId,
        status: WorkerStatus,
        metrics: WorkerMetrics,
    ) -> Result<Worker> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut worker = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| WorkhorseError::worker_not_found(id))?;

        let finished_job =
            status == WorkerStatus::Idle && (metrics.current_job.is_some() || worker.current_job.is_some());
        if finished_job {
            worker.processed_jobs += 1;
        }

        worker.status = status;
        worker.last_heartbeat = Utc::now();
        worker.memory_usage = metrics.memory_usage;
        worker.cpu_usage = metrics.cpu_usage;
        worker.current_job = if status == WorkerStatus::Idle {
            None
        } else {
            metrics.current_job
        };
        worker.touch();

        self.store.save(worker.clone()).await?;
        tracing::debug!(
            worker = %worker.name,
            worker_id = %id,
            status = %status,
            processed_jobs = worker.processed_jobs,
            "Worker status reported"
        );
        Ok(worker)
    }

    /// All workers, most recent heartbeat first.
    pub async fn list(&self) -> Result<Vec<Worker>> {
        self.store.list().await
    }

    /// Load a worker by id.
    pub async fn get(&self, id: WorkerId) -> Result<Worker> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkhorseError::worker_not_found(id))
    }

    /// Force workers whose heartbeat is older than `timeout` to failed.
    ///
    /// Returns the workers that were newly marked failed. A stale worker
    /// recovers only via a subsequent status report.
    pub async fn sweep_stale(&self, timeout: Duration) -> Result<Vec<Worker>> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(timeout).unwrap_or_else(|_| ChronoDuration::seconds(30));

        let stale = self.store.stale_since(cutoff).await?;
        let mut failed = Vec::new();

        for candidate in stale {
            let lock = self.lock_for(candidate.id);
            let _guard = lock.lock().await;

            // Re-read under the lock: a report may have arrived meanwhile
            let Some(mut worker) = self.store.get(candidate.id).await? else {
                continue;
            };
            if worker.last_heartbeat >= cutoff || worker.status == WorkerStatus::Failed {
                continue;
            }

            worker.status = WorkerStatus::Failed;
            worker.touch();
            self.store.save(worker.clone()).await?;
            tracing::warn!(
                worker = %worker.name,
                worker_id = %worker.id,
                last_heartbeat = %worker.last_heartbeat,
                "Worker marked failed after heartbeat timeout"
            );
            failed.push(worker);
        }

        Ok(failed)
    }
}
