//! Dispatch queue with named lanes, delayed visibility, and deliver-once
//! idempotency keys.
//!
//! The queue is an at-least-once transport: a crash between delivery and
//! acknowledgment causes redelivery, which the coordinator's idempotent
//! transitions absorb. Within a lane an item's `job_id` is an idempotency
//! key while the item is pending, and at most one delivery of a given
//! `job_id` is in flight at a time.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::jobs::JobId;

/// Configuration for the dispatch queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Poll interval for lane consumers (milliseconds)
    pub poll_interval_ms: u64,
    /// Key prefix for durable backends
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            key_prefix: "workhorse:lanes".to_string(),
        }
    }
}

/// A claimed queue item handed to a consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub job_id: JobId,
    pub payload: serde_json::Value,
}

/// Result of an enqueue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueAck {
    /// False when the id was already pending in the lane and the call
    /// collapsed into the existing entry.
    pub enqueued: bool,
}

/// Outcome of a best-effort removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Item was pending and has been removed
    Removed,
    /// Item is already in flight; the delivery cannot be recalled
    AlreadyStarted,
    /// No such item in the lane
    NotFound,
}

/// Handler invoked once per claimed delivery.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, lane: &str, delivery: Delivery);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lane Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for lane storage backends.
#[async_trait]
pub trait LaneBackend: Send + Sync {
    /// Add an item, visible after `delay`. Returns false when the id was
    /// already pending in the lane.
    async fn enqueue(
        &self,
        lane: &str,
        job_id: JobId,
        payload: serde_json::Value,
        delay: Duration,
    ) -> Result<bool>;

    /// Claim the next visible item whose id is not currently in flight.
    async fn claim(&self, lane: &str) -> Result<Option<Delivery>>;

    /// Acknowledge a claimed item, releasing its in-flight slot.
    async fn ack(&self, lane: &str, job_id: JobId) -> Result<()>;

    /// Best-effort removal of a not-yet-claimed item.
    async fn remove(&self, lane: &str, job_id: JobId) -> Result<RemoveOutcome>;

    /// Number of pending (unclaimed) items in the lane.
    async fn pending_len(&self, lane: &str) -> Result<usize>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

struct PendingItem {
    payload: serde_json::Value,
    visible_at: tokio::time::Instant,
}

#[derive(Default)]
struct LaneState {
    pending: HashMap<JobId, PendingItem>,
    in_flight: HashSet<JobId>,
}

/// In-memory lane backend for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryLaneBackend {
    lanes: SyncMutex<HashMap<String, LaneState>>,
}

impl MemoryLaneBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // Guard is never held across an await point
    fn with_lane<T>(&self, lane: &str, f: impl FnOnce(&mut LaneState) -> T) -> T {
        let mut lanes = self.lanes.lock();
        f(lanes.entry(lane.to_string()).or_default())
    }
}

#[async_trait]
impl LaneBackend for MemoryLaneBackend {
    async fn enqueue(
        &self,
        lane: &str,
        job_id: JobId,
        payload: serde_json::Value,
        delay: Duration,
    ) -> Result<bool> {
        let visible_at = tokio::time::Instant::now() + delay;
        let inserted = self.with_lane(lane, |state| {
            if state.pending.contains_key(&job_id) {
                return false;
            }
            state.pending.insert(
                job_id,
                PendingItem {
                    payload,
                    visible_at,
                },
            );
            true
        });
        Ok(inserted)
    }

    async fn claim(&self, lane: &str) -> Result<Option<Delivery>> {
        let now = tokio::time::Instant::now();
        let claimed = self.with_lane(lane, |state| {
            let candidate = state
                .pending
                .iter()
                .filter(|(id, item)| item.visible_at <= now && !state.in_flight.contains(id))
                .min_by_key(|(_, item)| item.visible_at)
                .map(|(id, _)| *id)?;

            let item = state.pending.remove(&candidate)?;
            state.in_flight.insert(candidate);
            Some(Delivery {
                job_id: candidate,
                payload: item.payload,
            })
        });
        Ok(claimed)
    }

    async fn ack(&self, lane: &str, job_id: JobId) -> Result<()> {
        self.with_lane(lane, |state| {
            state.in_flight.remove(&job_id);
        });
        Ok(())
    }

    async fn remove(&self, lane: &str, job_id: JobId) -> Result<RemoveOutcome> {
        let outcome = self.with_lane(lane, |state| {
            if state.pending.remove(&job_id).is_some() {
                RemoveOutcome::Removed
            } else if state.in_flight.contains(&job_id) {
                RemoveOutcome::AlreadyStarted
            } else {
                RemoveOutcome::NotFound
            }
        });
        Ok(outcome)
    }

    async fn pending_len(&self, lane: &str) -> Result<usize> {
        Ok(self.with_lane(lane, |state| state.pending.len()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis-backed lane backend for production use.
///
/// Each lane keeps a sorted set of pending ids scored by visibility time
/// (epoch milliseconds), a hash of payloads, and a set of in-flight ids.
pub struct RedisLaneBackend {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLaneBackend {
    /// Create a new Redis lane backend.
    ///
    /// # Arguments
    /// * `client` - A connected Redis client
    /// * `key_prefix` - Namespace for lane keys (e.g. `"workhorse:lanes"`)
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn scheduled_key(&self, lane: &str) -> String {
        format!("{}:{}:scheduled", self.key_prefix, lane)
    }

    fn payloads_key(&self, lane: &str) -> String {
        format!("{}:{}:payloads", self.key_prefix, lane)
    }

    fn inflight_key(&self, lane: &str) -> String {
        format!("{}:{}:inflight", self.key_prefix, lane)
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl LaneBackend for RedisLaneBackend {
    async fn enqueue(
        &self,
        lane: &str,
        job_id: JobId,
        payload: serde_json::Value,
        delay: Duration,
    ) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let visible_at = Self::now_ms() + delay.as_millis() as i64;
        let member = job_id.to_string();

        // NX makes the id a deliver-once key while pending
        let added: i64 = redis::cmd("ZADD")
            .arg(self.scheduled_key(lane))
            .arg("NX")
            .arg(visible_at)
            .arg(&member)
            .query_async(&mut conn)
            .await?;

        if added == 0 {
            tracing::debug!(lane, job_id = %job_id, "Enqueue collapsed into pending entry");
            return Ok(false);
        }

        let serialized = serde_json::to_string(&payload)?;
        redis::cmd("HSET")
            .arg(self.payloads_key(lane))
            .arg(&member)
            .arg(serialized)
            .query_async::<_, i64>(&mut conn)
            .await?;

        tracing::debug!(lane, job_id = %job_id, delay_ms = delay.as_millis() as u64, "Item enqueued");
        Ok(true)
    }

    async fn claim(&self, lane: &str) -> Result<Option<Delivery>> {
        let mut conn = self.get_conn().await?;

        // A small candidate window lets us skip ids that are still in flight.
        let candidates: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.scheduled_key(lane))
            .arg("-inf")
            .arg(Self::now_ms())
            .arg("LIMIT")
            .arg(0)
            .arg(8)
            .query_async(&mut conn)
            .await?;

        for member in candidates {
            let in_flight: i64 = redis::cmd("SISMEMBER")
                .arg(self.inflight_key(lane))
                .arg(&member)
                .query_async(&mut conn)
                .await?;
            if in_flight == 1 {
                continue;
            }

            // ZREM returning 1 means this consumer owns the claim
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.scheduled_key(lane))
                .arg(&member)
                .query_async(&mut conn)
                .await?;
            if removed == 0 {
                continue;
            }

            redis::cmd("SADD")
                .arg(self.inflight_key(lane))
                .arg(&member)
                .query_async::<_, i64>(&mut conn)
                .await?;

            let raw: Option<String> = redis::cmd("HGET")
                .arg(self.payloads_key(lane))
                .arg(&member)
                .query_async(&mut conn)
                .await?;

            let job_id = match JobId::parse(&member) {
                Some(id) => id,
                None => {
                    tracing::warn!(lane, member = %member, "Discarding malformed lane member");
                    continue;
                }
            };
            let payload = match raw {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Value::Null,
            };

            return Ok(Some(Delivery { job_id, payload }));
        }

        Ok(None)
    }

    async fn ack(&self, lane: &str, job_id: JobId) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let member = job_id.to_string();

        redis::cmd("SREM")
            .arg(self.inflight_key(lane))
            .arg(&member)
            .query_async::<_, i64>(&mut conn)
            .await?;
        redis::cmd("HDEL")
            .arg(self.payloads_key(lane))
            .arg(&member)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, lane: &str, job_id: JobId) -> Result<RemoveOutcome> {
        let mut conn = self.get_conn().await?;
        let member = job_id.to_string();

        let removed: i64 = redis::cmd("ZREM")
            .arg(self.scheduled_key(lane))
            .arg(&member)
            .query_async(&mut conn)
            .await?;
        if removed == 1 {
            redis::cmd("HDEL")
                .arg(self.payloads_key(lane))
                .arg(&member)
                .query_async::<_, i64>(&mut conn)
                .await?;
            return Ok(RemoveOutcome::Removed);
        }

        let in_flight: i64 = redis::cmd("SISMEMBER")
            .arg(self.inflight_key(lane))
            .arg(&member)
            .query_async(&mut conn)
            .await?;
        if in_flight == 1 {
            Ok(RemoveOutcome::AlreadyStarted)
        } else {
            Ok(RemoveOutcome::NotFound)
        }
    }

    async fn pending_len(&self, lane: &str) -> Result<usize> {
        let mut conn = self.get_conn().await?;
        let len: usize = redis::cmd("ZCARD")
            .arg(self.scheduled_key(lane))
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dispatch Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// The dispatch queue: enqueue/remove plus consumer pool management.
pub struct DispatchQueue {
    backend: Arc<dyn LaneBackend>,
    config: QueueConfig,
    shutdown: watch::Sender<bool>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DispatchQueue {
    /// Create a new dispatch queue with the given backend.
    pub fn new(backend: Arc<dyn LaneBackend>, config: QueueConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            backend,
            config,
            shutdown,
            consumers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a queue over the in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLaneBackend::new()), QueueConfig::default())
    }

    /// Enqueue an item, visible after the optional delay.
    pub async fn enqueue(
        &self,
        lane: &str,
        job_id: JobId,
        payload: serde_json::Value,
        delay: Option<Duration>,
    ) -> Result<EnqueueAck> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(crate::error::WorkhorseError::queue("queue is closed"));
        }
        let enqueued = self
            .backend
            .enqueue(lane, job_id, payload, delay.unwrap_or(Duration::ZERO))
            .await?;
        Ok(EnqueueAck { enqueued })
    }

    /// Best-effort removal of a not-yet-claimed item.
    pub async fn remove(&self, lane: &str, job_id: JobId) -> Result<RemoveOutcome> {
        self.backend.remove(lane, job_id).await
    }

    /// Number of pending items in a lane.
    pub async fn pending_len(&self, lane: &str) -> Result<usize> {
        self.backend.pending_len(lane).await
    }

    /// Register a consumer pool on a lane.
    ///
    /// Up to `concurrency` handler invocations run at once; each claimed
    /// item is acknowledged after its handler returns.
    pub async fn consume(
        &self,
        lane: &str,
        handler: Arc<dyn DeliveryHandler>,
        concurrency: usize,
    ) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!(lane = %lane, "Consumer registration refused, queue is closed");
            return;
        }

        let lane = lane.to_string();
        let backend = self.backend.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let concurrency = concurrency.max(1);

        let handle = tokio::spawn(async move {
            tracing::info!(lane = %lane, concurrency, "Lane consumer started");

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        loop {
                            let permit = match semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => break,
                            };
                            match backend.claim(&lane).await {
                                Ok(Some(delivery)) => {
                                    let backend = backend.clone();
                                    let handler = handler.clone();
                                    let lane = lane.clone();
                                    tokio::spawn(async move {
                                        let job_id = delivery.job_id;
                                        handler.handle(&lane, delivery).await;
                                        if let Err(e) = backend.ack(&lane, job_id).await {
                                            tracing::warn!(
                                                lane = %lane,
                                                job_id = %job_id,
                                                error = %e,
                                                "Failed to acknowledge delivery"
                                            );
                                        }
                                        drop(permit);
                                    });
                                }
                                Ok(None) => {
                                    drop(permit);
                                    break;
                                }
                                Err(e) => {
                                    tracing::warn!(lane = %lane, error = %e, "Lane claim failed");
                                    drop(permit);
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            // Drain: wait until every in-flight handler has released its permit
            let _ = semaphore.acquire_many(concurrency as u32).await;
            tracing::info!(lane = %lane, "Lane consumer stopped");
        });

        self.consumers.lock().await.push(handle);
    }

    /// Stop accepting producers/consumers and drain in-flight work.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> = self.consumers.lock().await.drain(..).collect();
        futures::future::join_all(handles).await;
        tracing::info!("Dispatch queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_idempotency_key() {
        let backend = MemoryLaneBackend::new();
        let id = JobId::new();

        assert!(backend
            .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
            .await
            .unwrap());
        assert!(!backend
            .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
            .await
            .unwrap());
        assert_eq!(backend.pending_len("default").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_claim_respects_visibility() {
        let backend = MemoryLaneBackend::new();
        let id = JobId::new();
        backend
            .enqueue(
                "default",
                id,
                serde_json::json!({}),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(backend.claim("default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_and_ack_cycle() {
        let backend = MemoryLaneBackend::new();
        let id = JobId::new();
        backend
            .enqueue("default", id, serde_json::json!({"k": 1}), Duration::ZERO)
            .await
            .unwrap();

        let delivery = backend.claim("default").await.unwrap().unwrap();
        assert_eq!(delivery.job_id, id);

        // In flight: no second claim of the same id
        assert!(backend.claim("default").await.unwrap().is_none());

        backend.ack("default", id).await.unwrap();
        assert_eq!(backend.pending_len("default").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_blocks_redelivery_of_reenqueued_id() {
        let backend = MemoryLaneBackend::new();
        let id = JobId::new();
        backend
            .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
            .await
            .unwrap();
        let _delivery = backend.claim("default").await.unwrap().unwrap();

        // Re-enqueue while the first delivery is still unacknowledged
        backend
            .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
            .await
            .unwrap();
        assert!(backend.claim("default").await.unwrap().is_none());

        // Acknowledged: the re-enqueued item becomes claimable
        backend.ack("default", id).await.unwrap();
        assert!(backend.claim("default").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_outcomes() {
        let backend = MemoryLaneBackend::new();
        let pending = JobId::new();
        let started = JobId::new();

        backend
            .enqueue("default", pending, serde_json::json!({}), Duration::ZERO)
            .await
            .unwrap();
        backend
            .enqueue("default", started, serde_json::json!({}), Duration::ZERO)
            .await
            .unwrap();

        // Claim until the started id is in flight
        let mut claimed = Vec::new();
        while let Some(d) = backend.claim("default").await.unwrap() {
            claimed.push(d.job_id);
        }
        assert!(claimed.contains(&started));

        for id in claimed {
            if id != started {
                backend.ack("default", id).await.unwrap();
            }
        }

        assert_eq!(
            backend.remove("default", started).await.unwrap(),
            RemoveOutcome::AlreadyStarted
        );
        assert_eq!(
            backend.remove("default", JobId::new()).await.unwrap(),
            RemoveOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_lanes_are_independent() {
        let backend = MemoryLaneBackend::new();
        let id = JobId::new();
        backend
            .enqueue("emails", id, serde_json::json!({}), Duration::ZERO)
            .await
            .unwrap();

        assert!(backend.claim("reports").await.unwrap().is_none());
        assert!(backend.claim("emails").await.unwrap().is_some());
    }

    struct Recorder {
        seen: Mutex<Vec<JobId>>,
    }

    #[async_trait]
    impl DeliveryHandler for Recorder {
        async fn handle(&self, _lane: &str, delivery: Delivery) {
            self.seen.lock().await.push(delivery.job_id);
        }
    }

    #[tokio::test]
    async fn test_consume_delivers_and_close_drains() {
        let queue = DispatchQueue::in_memory();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });

        let ids: Vec<JobId> = (0..5).map(|_| JobId::new()).collect();
        for id in &ids {
            queue
                .enqueue("default", *id, serde_json::json!({}), None)
                .await
                .unwrap();
        }

        queue.consume("default", recorder.clone(), 2).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if recorder.seen.lock().await.len() == ids.len() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("all items delivered");

        queue.close().await;

        let seen = recorder.seen.lock().await;
        for id in &ids {
            assert!(seen.contains(id));
        }
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_enqueue() {
        let queue = DispatchQueue::in_memory();
        queue.close().await;
        let result = queue
            .enqueue("default", JobId::new(), serde_json::json!({}), None)
            .await;
        assert!(result.is_err());
    }
}
