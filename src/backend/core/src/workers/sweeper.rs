//! Periodic stale-worker sweep.
//!
//! Runs on a fixed interval, independent of request traffic. Store or queue
//! errors during a sweep are logged and the sweep retries on its next tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::jobs::lifecycle::JobLifecycle;
use crate::workers::WorkerRegistry;

/// Configuration for the stale sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between sweeps
    pub interval: Duration,
    /// Heartbeat age beyond which a worker is stale
    pub stale_timeout: Duration,
    /// Force-fail the current job of a newly stale worker
    pub fail_stale_worker_jobs: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            stale_timeout: Duration::from_secs(30),
            fail_stale_worker_jobs: true,
        }
    }
}

/// Handle for a running sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the current tick to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Periodic liveness sweeper over the worker registry.
pub struct StaleSweeper {
    registry: Arc<WorkerRegistry>,
    lifecycle: Arc<JobLifecycle>,
    config: SweeperConfig,
}

impl StaleSweeper {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        lifecycle: Arc<JobLifecycle>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            config,
        }
    }

    /// Run one sweep: mark stale workers failed and, when configured,
    /// force-fail the job each newly failed worker was holding.
    pub async fn sweep_once(&self) {
        let failed = match self.registry.sweep_stale(self.config.stale_timeout).await {
            Ok(failed) => failed,
            Err(e) => {
                tracing::warn!(error = %e, "Stale-worker sweep failed, will retry next tick");
                return;
            }
        };

        if !self.config.fail_stale_worker_jobs {
            return;
        }

        for worker in failed {
            let Some(job_id) = worker.current_job else {
                continue;
            };
            match self
                .lifecycle
                .mark_failed(job_id, "worker heartbeat lost")
                .await
            {
                Ok(_) => {
                    tracing::warn!(
                        worker = %worker.name,
                        job_id = %job_id,
                        "Force-failed job of stale worker"
                    );
                }
                Err(e) if JobLifecycle::is_skippable_delivery_error(&e) => {
                    // Job already reached a terminal state on its own
                }
                Err(e) => {
                    tracing::warn!(
                        worker = %worker.name,
                        job_id = %job_id,
                        error = %e,
                        "Could not fail job of stale worker"
                    );
                }
            }
        }
    }

    /// Spawn the periodic sweep loop.
    pub fn start(self) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let interval = self.config.interval;

        let handle = tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                stale_timeout_secs = self.config.stale_timeout.as_secs(),
                "Stale-worker sweeper started"
            );

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        self.sweep_once().await;
                    }
                }
            }

            tracing::info!("Stale-worker sweeper stopped");
        });

        SweeperHandle { shutdown, handle }
    }
}
