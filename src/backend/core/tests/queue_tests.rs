//! Integration tests for the dispatch queue.
//!
//! Covers lane isolation, delayed visibility, deliver-once idempotency
//! keys, at-most-one-in-flight-per-id, best-effort removal, consumer
//! concurrency bounds, and close-with-drain.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use tokio_test::assert_ok;
use workhorse_core::jobs::{
    Delivery, DeliveryHandler, DispatchQueue, JobId, LaneBackend, MemoryLaneBackend,
    RemoveOutcome,
};

// ============================================================================
// Backend Semantics
// ============================================================================

#[tokio::test]
async fn test_delayed_item_becomes_visible_after_delay() {
    let backend = MemoryLaneBackend::new();
    let id = JobId::new();

    backend
        .enqueue(
            "default",
            id,
            serde_json::json!({}),
            Duration::from_millis(80),
        )
        .await
        .unwrap();

    assert!(backend.claim("default").await.unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(120)).await;
    let delivery = backend.claim("default").await.unwrap().unwrap();
    assert_eq!(delivery.job_id, id);
}

#[tokio::test]
async fn test_visibility_time_ordering() {
    let backend = MemoryLaneBackend::new();
    let early = JobId::new();
    let late = JobId::new();

    // Enqueue the later-visible item first
    backend
        .enqueue(
            "default",
            late,
            serde_json::json!({}),
            Duration::from_millis(30),
        )
        .await
        .unwrap();
    backend
        .enqueue("default", early, serde_json::json!({}), Duration::ZERO)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(backend.claim("default").await.unwrap().unwrap().job_id, early);
    assert_eq!(backend.claim("default").await.unwrap().unwrap().job_id, late);
}

#[tokio::test]
async fn test_duplicate_pending_id_collapses() {
    let backend = MemoryLaneBackend::new();
    let id = JobId::new();

    assert!(backend
        .enqueue("default", id, serde_json::json!({"v": 1}), Duration::ZERO)
        .await
        .unwrap());
    assert!(!backend
        .enqueue("default", id, serde_json::json!({"v": 2}), Duration::ZERO)
        .await
        .unwrap());

    assert!(backend.claim("default").await.unwrap().is_some());
    assert!(backend.claim("default").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_pending_item() {
    let backend = MemoryLaneBackend::new();
    let id = JobId::new();

    assert_ok!(
        backend
            .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
            .await
    );
    assert_eq!(
        backend.remove("default", id).await.unwrap(),
        RemoveOutcome::Removed
    );
    assert!(backend.claim("default").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_in_flight_item_reports_started() {
    let backend = MemoryLaneBackend::new();
    let id = JobId::new();

    backend
        .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
        .await
        .unwrap();
    backend.claim("default").await.unwrap().unwrap();

    assert_eq!(
        backend.remove("default", id).await.unwrap(),
        RemoveOutcome::AlreadyStarted
    );
}

// ============================================================================
// Consumer Pool
// ============================================================================

struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
    handled: AtomicUsize,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            handled: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DeliveryHandler for ConcurrencyProbe {
    async fn handle(&self, _lane: &str, _delivery: Delivery) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.handled.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let queue = DispatchQueue::in_memory();
    let probe = Arc::new(ConcurrencyProbe::new());

    for _ in 0..12 {
        queue
            .enqueue("default", JobId::new(), serde_json::json!({}), None)
            .await
            .unwrap();
    }

    queue.consume("default", probe.clone(), 3).await;

    tokio::time::timeout(Duration::from_secs(10), async {
        while probe.handled.load(Ordering::SeqCst) < 12 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("all deliveries handled");

    assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    queue.close().await;
}

struct SlowRecorder {
    seen: Mutex<Vec<JobId>>,
}

#[async_trait]
impl DeliveryHandler for SlowRecorder {
    async fn handle(&self, _lane: &str, delivery: Delivery) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.seen.lock().await.push(delivery.job_id);
    }
}

#[tokio::test]
async fn test_close_waits_for_in_flight_handlers() {
    let queue = DispatchQueue::in_memory();
    let recorder = Arc::new(SlowRecorder {
        seen: Mutex::new(Vec::new()),
    });

    let id = JobId::new();
    queue
        .enqueue("default", id, serde_json::json!({}), None)
        .await
        .unwrap();
    queue.consume("default", recorder.clone(), 1).await;

    // Wait until the delivery is claimed, then close while it is in flight
    tokio::time::sleep(Duration::from_millis(150)).await;
    queue.close().await;

    let seen = recorder.seen.lock().await;
    assert_eq!(seen.as_slice(), &[id]);
}

#[tokio::test]
async fn test_same_id_never_concurrently_in_flight() {
    let backend = MemoryLaneBackend::new();
    let id = JobId::new();

    backend
        .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
        .await
        .unwrap();
    let first = backend.claim("default").await.unwrap();
    assert!(first.is_some());

    // Redelivery attempt of the same id while unacknowledged
    backend
        .enqueue("default", id, serde_json::json!({}), Duration::ZERO)
        .await
        .unwrap();
    assert!(backend.claim("default").await.unwrap().is_none());

    backend.ack("default", id).await.unwrap();
    assert!(backend.claim("default").await.unwrap().is_some());
}
