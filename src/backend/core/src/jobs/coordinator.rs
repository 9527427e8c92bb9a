//! Coordinator binding queue deliveries to lifecycle transitions.
//!
//! One delivery turns into: mark running → run the processor under the
//! configured timeout → commit the terminal transition → consult the retry
//! policy. Redeliveries are absorbed because `mark_running` rejects
//! non-pending jobs, and a concurrently cancelled job's result is discarded
//! because its terminal commit fails the running-state check.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::error::ErrorCode;
use crate::jobs::lifecycle::JobLifecycle;
use crate::jobs::processor::ProcessorRegistry;
use crate::jobs::queue::{Delivery, DeliveryHandler, DispatchQueue};
use crate::jobs::retry::{BackoffStrategy, RetryPolicy};
use crate::jobs::{JobId, JobRecord, LogLevel};

/// Glue between the dispatch queue and the lifecycle engine.
pub struct Coordinator {
    lifecycle: Arc<JobLifecycle>,
    processors: Arc<ProcessorRegistry>,
    retry_policy: RetryPolicy,
    auto_retry: bool,
    job_timeout: Duration,
    concurrency: usize,
}

impl Coordinator {
    pub fn new(
        lifecycle: Arc<JobLifecycle>,
        processors: Arc<ProcessorRegistry>,
        config: &SchedulerConfig,
    ) -> Self {
        let backoff = BackoffStrategy::exponential(
            config.retry_base_delay.as_millis() as u64,
            config.retry_max_delay.as_millis() as u64,
        );
        Self {
            lifecycle,
            processors,
            retry_policy: RetryPolicy::new(backoff),
            auto_retry: config.auto_retry,
            job_timeout: config.job_timeout,
            concurrency: config.concurrency,
        }
    }

    /// Register this coordinator as the consumer pool of a lane.
    pub async fn start(self: &Arc<Self>, queue: &DispatchQueue, lane: &str) {
        queue
            .consume(lane, self.clone() as Arc<dyn DeliveryHandler>, self.concurrency)
            .await;
    }

    /// The retry policy in effect (exposed for tests and introspection).
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    async fn log_best_effort(&self, id: JobId, message: &str, level: LogLevel) {
        if let Err(e) = self.lifecycle.append_log(id, message, level).await {
            tracing::debug!(job_id = %id, error = %e, "Skipped job log append");
        }
    }

    /// Commit a success, discarding the result if the job was concurrently
    /// cancelled or deleted.
    async fn commit_success(&self, id: JobId, result: &serde_json::Value) {
        match self.lifecycle.mark_completed(id).await {
            Ok(_) => {
                self.log_best_effort(
                    id,
                    &format!("completed with result: {}", result),
                    LogLevel::Info,
                )
                .await;
            }
            Err(e) if JobLifecycle::is_skippable_delivery_error(&e) => {
                tracing::debug!(job_id = %id, "Discarding result, job no longer running");
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to commit completion");
            }
        }
    }

    /// Commit a failure and, when configured and eligible, schedule an
    /// automatic retry with backoff.
    async fn commit_failure(&self, id: JobId, error_message: &str, allow_retry: bool) {
        let job: JobRecord = match self.lifecycle.mark_failed(id, error_message).await {
            Ok(job) => job,
            Err(e) if JobLifecycle::is_skippable_delivery_error(&e) => {
                tracing::debug!(job_id = %id, "Discarding failure, job no longer running");
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to commit failure");
                return;
            }
        };

        self.log_best_effort(id, error_message, LogLevel::Error).await;

        if !(allow_retry && self.auto_retry && self.retry_policy.is_eligible(&job)) {
            return;
        }

        let delay = self.retry_policy.next_delay(job.retry_count);
        match self.lifecycle.retry_with_delay(id, Some(delay)).await {
            Ok(job) => {
                self.log_best_effort(
                    id,
                    &format!(
                        "retry {}/{} scheduled in {}ms",
                        job.retry_count,
                        job.max_retries,
                        delay.as_millis()
                    ),
                    LogLevel::Warn,
                )
                .await;
            }
            // A concurrent manual retry or cancel got there first
            Err(e) if e.code() == ErrorCode::NotRetryable => {
                tracing::debug!(job_id = %id, "Automatic retry skipped");
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to schedule automatic retry");
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for Coordinator {
    async fn handle(&self, lane: &str, delivery: Delivery) {
        let id = delivery.job_id;
        let slot = format!("{}-worker", lane);

        // Bind the job to this processing slot. Cancelled, deleted, or
        // redelivered jobs are not pending anymore and are skipped.
        let job = match self.lifecycle.mark_running(id, &slot).await {
            Ok(job) => job,
            Err(e) if JobLifecycle::is_skippable_delivery_error(&e) => {
                tracing::debug!(job_id = %id, lane, "Skipping delivery");
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %id, lane, error = %e, "Could not start delivery");
                return;
            }
        };

        self.log_best_effort(id, &format!("processing started on {}", slot), LogLevel::Info)
            .await;

        let processor = match self.processors.resolve(&job.job_type) {
            Ok(processor) => processor,
            Err(e) => {
                // Retrying an unregistered type cannot succeed
                self.commit_failure(id, e.user_message(), false).await;
                return;
            }
        };

        match tokio::time::timeout(self.job_timeout, processor.process(&job)).await {
            Ok(Ok(result)) => {
                self.commit_success(id, &result).await;
            }
            Ok(Err(e)) => {
                self.commit_failure(id, &e.message, true).await;
            }
            Err(_) => {
                let message = format!(
                    "processor timed out after {}s",
                    self.job_timeout.as_secs()
                );
                self.commit_failure(id, &message, true).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::processor::{Processor, ProcessorError, ProcessorResult};
    use crate::jobs::{CreateJobRequest, JobStatus};
    use crate::store::MemoryStore;

    struct FlakyProcessor {
        failures_left: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl Processor for FlakyProcessor {
        fn job_type(&self) -> &'static str {
            "flaky"
        }

        async fn process(&self, _job: &crate::jobs::JobRecord) -> ProcessorResult {
            use std::sync::atomic::Ordering;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(ProcessorError::new("transient failure"))
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        }
    }

    fn setup(auto_retry: bool) -> (Arc<JobLifecycle>, Arc<Coordinator>, Arc<DispatchQueue>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(DispatchQueue::in_memory());
        let config = SchedulerConfig {
            auto_retry,
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let lifecycle = Arc::new(JobLifecycle::new(store, queue.clone(), &config));

        let mut processors = ProcessorRegistry::new();
        processors
            .register(Arc::new(FlakyProcessor {
                failures_left: std::sync::atomic::AtomicU32::new(1),
            }))
            .unwrap();
        let coordinator = Arc::new(Coordinator::new(
            lifecycle.clone(),
            Arc::new(processors),
            &config,
        ));
        (lifecycle, coordinator, queue)
    }

    #[tokio::test]
    async fn test_delivery_of_unknown_type_fails_without_retry() {
        let (lifecycle, coordinator, _queue) = setup(true);
        let job = lifecycle
            .create(CreateJobRequest {
                job_type: "mystery".into(),
                payload: serde_json::json!({}),
                schedule_time: None,
                retry_policy: None,
            })
            .await
            .unwrap();

        coordinator
            .handle(
                "default",
                Delivery {
                    job_id: job.id,
                    payload: job.payload.clone(),
                },
            )
            .await;

        let job = lifecycle.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("mystery"));
    }

    #[tokio::test]
    async fn test_double_delivery_is_noop() {
        let (lifecycle, coordinator, _queue) = setup(false);
        let job = lifecycle
            .create(CreateJobRequest {
                job_type: "flaky".into(),
                payload: serde_json::json!({}),
                schedule_time: None,
                retry_policy: None,
            })
            .await
            .unwrap();

        // First delivery fails the job once (flaky processor), so after it
        // the record is failed; a second delivery must not restart it.
        let delivery = Delivery {
            job_id: job.id,
            payload: job.payload.clone(),
        };
        coordinator.handle("default", delivery.clone()).await;
        let after_first = lifecycle.get(job.id).await.unwrap();

        coordinator.handle("default", delivery).await;
        let after_second = lifecycle.get(job.id).await.unwrap();

        assert_eq!(after_first.status, after_second.status);
        assert_eq!(after_first.retry_count, after_second.retry_count);
    }
}
