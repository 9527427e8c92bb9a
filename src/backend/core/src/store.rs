//! Record store contracts.
//!
//! The job and worker record stores are external collaborators: the engine
//! only speaks this load/save/query contract. `MemoryStore` implements both
//! traits for tests and single-process deployments; a durable implementation
//! can be swapped in behind the same seam.
//!
//! The stores do not serialize transitions themselves. Key-scoped mutual
//! exclusion lives in the owning components (lifecycle engine, worker
//! registry), which perform get/save cycles under their own per-id locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::jobs::{JobFilter, JobId, JobRecord, JobStats, JobStatus};
use crate::workers::{Worker, WorkerId};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Durable storage for job records, keyed by job id.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new record.
    async fn insert(&self, job: JobRecord) -> Result<()>;

    /// Load a record by id.
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>>;

    /// Persist the full state of an existing record.
    async fn save(&self, job: JobRecord) -> Result<()>;

    /// Hard-remove a record, returning it if present.
    async fn delete(&self, id: JobId) -> Result<Option<JobRecord>>;

    /// Filtered, paginated listing sorted by `created_at` descending.
    ///
    /// Returns the page plus the total match count independent of paging.
    async fn list(&self, filter: &JobFilter) -> Result<(Vec<JobRecord>, u64)>;

    /// Aggregate counts by status.
    async fn count_by_status(&self) -> Result<JobStats>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Worker Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Durable storage for worker records, keyed by worker id with a unique
/// name index.
#[async_trait]
pub trait WorkerStore: Send + Sync {
    /// Persist a new worker.
    async fn insert(&self, worker: Worker) -> Result<()>;

    /// Load by id.
    async fn get(&self, id: WorkerId) -> Result<Option<Worker>>;

    /// Load by unique name.
    async fn get_by_name(&self, name: &str) -> Result<Option<Worker>>;

    /// Persist the full state of an existing worker.
    async fn save(&self, worker: Worker) -> Result<()>;

    /// All workers, most recent heartbeat first.
    async fn list(&self) -> Result<Vec<Worker>>;

    /// Workers whose heartbeat is older than the cutoff.
    async fn stale_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Worker>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Store
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory implementation of both store contracts.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
    workers: Arc<RwLock<HashMap<WorkerId, Worker>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: JobRecord) -> Result<()> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn save(&self, job: JobRecord) -> Result<()> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.jobs.write().await.remove(&id))
    }

    async fn list(&self, filter: &JobFilter) -> Result<(Vec<JobRecord>, u64)> {
        let jobs = self.jobs.read().await;

        let mut matching: Vec<JobRecord> = jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page: Vec<JobRecord> = matching
            .into_iter()
            .skip(filter.skip() as usize)
            .take(filter.limit() as usize)
            .collect();

        Ok((page, total))
    }

    async fn count_by_status(&self) -> Result<JobStats> {
        let jobs = self.jobs.read().await;

        let mut stats = JobStats::default();
        for job in jobs.values() {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl WorkerStore for MemoryStore {
    async fn insert(&self, worker: Worker) -> Result<()> {
        self.workers.write().await.insert(worker.id, worker);
        Ok(())
    }

    async fn get(&self, id: WorkerId) -> Result<Option<Worker>> {
        Ok(self.workers.read().await.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Worker>> {
        Ok(self
            .workers
            .read()
            .await
            .values()
            .find(|w| w.name == name)
            .cloned())
    }

    async fn save(&self, worker: Worker) -> Result<()> {
        self.workers.write().await.insert(worker.id, worker);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Worker>> {
        let workers = self.workers.read().await;
        let mut all: Vec<Worker> = workers.values().cloned().collect();
        all.sort_by(|a, b| b.last_heartbeat.cmp(&a.last_heartbeat));
        Ok(all)
    }

    async fn stale_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Worker>> {
        let workers = self.workers.read().await;
        Ok(workers
            .values()
            .filter(|w| w.last_heartbeat < cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_job_crud() {
        let store = MemoryStore::new();
        let job = JobRecord::new("email-send", serde_json::json!({}));
        let id = job.id;

        JobStore::insert(&store, job).await.unwrap();
        let loaded = JobStore::get(&store, id).await.unwrap().unwrap();
        assert_eq!(loaded.job_type, "email-send");

        let deleted = store.delete(id).await.unwrap();
        assert!(deleted.is_some());
        assert!(JobStore::get(&store, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sorted_and_counted() {
        let store = MemoryStore::new();
        for i in 0..15 {
            let mut job = JobRecord::new("report", serde_json::json!({"i": i}));
            job.created_at = Utc::now() + Duration::milliseconds(i);
            JobStore::insert(&store, job).await.unwrap();
        }

        let filter = JobFilter {
            limit: Some(10),
            ..Default::default()
        };
        let (page, total) = JobStore::list(&store, &filter).await.unwrap();
        assert_eq!(total, 15);
        assert_eq!(page.len(), 10);
        // Newest first
        assert!(page.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let filter = JobFilter {
            page: Some(2),
            limit: Some(10),
            ..Default::default()
        };
        let (page, total) = JobStore::list(&store, &filter).await.unwrap();
        assert_eq!(total, 15);
        assert_eq!(page.len(), 5);
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let store = MemoryStore::new();

        let mut completed = JobRecord::new("report", serde_json::json!({}));
        completed.mark_running("w1");
        completed.mark_completed();
        JobStore::insert(&store, completed).await.unwrap();

        JobStore::insert(&store, JobRecord::new("report", serde_json::json!({})))
            .await
            .unwrap();

        let stats = store.count_by_status().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.running, 0);
    }

    #[tokio::test]
    async fn test_worker_name_index_and_staleness() {
        let store = MemoryStore::new();
        let mut worker = Worker::new("w1");
        worker.last_heartbeat = Utc::now() - Duration::seconds(120);
        WorkerStore::insert(&store, worker).await.unwrap();

        let by_name = store.get_by_name("w1").await.unwrap();
        assert!(by_name.is_some());
        assert!(store.get_by_name("nope").await.unwrap().is_none());

        let stale = store
            .stale_since(Utc::now() - Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].name, "w1");
    }
}
