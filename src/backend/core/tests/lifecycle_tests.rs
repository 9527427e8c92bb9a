//! Integration tests for the job lifecycle engine.
//!
//! Covers the state machine invariants end to end: creation defaults,
//! transition legality, retry budget enforcement, cancellation, deletion,
//! listing, and stats.

use std::sync::Arc;

use workhorse_core::config::SchedulerConfig;
use workhorse_core::error::ErrorCode;
use workhorse_core::jobs::{
    CreateJobRequest, DispatchQueue, JobFilter, JobLifecycle, JobStatus, RetryPolicyRequest,
    DEFAULT_LANE,
};
use workhorse_core::store::MemoryStore;

fn engine_with_queue() -> (JobLifecycle, Arc<DispatchQueue>) {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(DispatchQueue::in_memory());
    let engine = JobLifecycle::new(store, queue.clone(), &SchedulerConfig::default());
    (engine, queue)
}

fn request(job_type: &str) -> CreateJobRequest {
    CreateJobRequest {
        job_type: job_type.to_string(),
        payload: serde_json::json!({"to": "a@b.com"}),
        schedule_time: None,
        retry_policy: None,
    }
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn test_create_round_trip() {
    let (engine, queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.max_retries, 3);
    assert!(job.started_at.is_none());

    // Record is queryable and the queue holds one item
    let loaded = engine.get(job.id).await.unwrap();
    assert_eq!(loaded.job_type, "email-send");
    assert_eq!(queue.pending_len(DEFAULT_LANE).await.unwrap(), 1);
}

#[tokio::test]
async fn test_create_with_retry_policy() {
    let (engine, _queue) = engine_with_queue();

    let mut req = request("email-send");
    req.retry_policy = Some(RetryPolicyRequest {
        max_attempts: 7,
        delay: 2000,
    });
    let job = engine.create(req).await.unwrap();
    assert_eq!(job.max_retries, 7);
}

#[tokio::test]
async fn test_create_deferred_schedule() {
    let (engine, queue) = engine_with_queue();

    let mut req = request("email-send");
    req.schedule_time = Some(chrono::Utc::now() + chrono::Duration::seconds(60));
    let job = engine.create(req).await.unwrap();

    // Enqueued but not yet visible to a consumer
    assert_eq!(queue.pending_len(DEFAULT_LANE).await.unwrap(), 1);
    assert!(job.scheduled_time > chrono::Utc::now());
}

#[tokio::test]
async fn test_create_rejects_empty_type() {
    let (engine, _queue) = engine_with_queue();
    let err = engine.create(request("")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

// ============================================================================
// Retry Semantics
// ============================================================================

#[tokio::test]
async fn test_fail_then_retry_round_trip() {
    let (engine, _queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    engine.mark_running(job.id, "w1").await.unwrap();
    engine.mark_failed(job.id, "smtp unreachable").await.unwrap();

    let job = engine.retry(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert!(job.started_at.is_none());
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_retry_rejected_unless_failed() {
    let (engine, _queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    assert_eq!(
        engine.retry(job.id).await.unwrap_err().code(),
        ErrorCode::NotRetryable
    );

    engine.mark_running(job.id, "w1").await.unwrap();
    assert_eq!(
        engine.retry(job.id).await.unwrap_err().code(),
        ErrorCode::NotRetryable
    );

    engine.mark_completed(job.id).await.unwrap();
    assert_eq!(
        engine.retry(job.id).await.unwrap_err().code(),
        ErrorCode::NotRetryable
    );
}

#[tokio::test]
async fn test_invariant_retry_count_never_exceeds_max() {
    let (engine, _queue) = engine_with_queue();

    let mut req = request("email-send");
    req.retry_policy = Some(RetryPolicyRequest {
        max_attempts: 2,
        delay: 1,
    });
    let job = engine.create(req).await.unwrap();

    loop {
        engine.mark_running(job.id, "w1").await.unwrap();
        engine.mark_failed(job.id, "boom").await.unwrap();
        let current = engine.get(job.id).await.unwrap();
        assert!(current.retry_count <= current.max_retries);
        if engine.retry(job.id).await.is_err() {
            break;
        }
    }

    let final_state = engine.get(job.id).await.unwrap();
    assert_eq!(final_state.status, JobStatus::Failed);
    assert_eq!(final_state.retry_count, final_state.max_retries);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_pending_removes_queue_item() {
    let (engine, queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    assert_eq!(queue.pending_len(DEFAULT_LANE).await.unwrap(), 1);

    let cancelled = engine.cancel(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.as_deref(), Some("cancelled"));
    assert!(cancelled.completed_at.is_some());
    assert_eq!(queue.pending_len(DEFAULT_LANE).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_terminal_jobs_rejected() {
    let (engine, _queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    engine.mark_running(job.id, "w1").await.unwrap();
    engine.mark_completed(job.id).await.unwrap();
    assert_eq!(
        engine.cancel(job.id).await.unwrap_err().code(),
        ErrorCode::NotCancellable
    );

    let job = engine.create(request("email-send")).await.unwrap();
    engine.mark_running(job.id, "w1").await.unwrap();
    engine.mark_failed(job.id, "boom").await.unwrap();
    assert_eq!(
        engine.cancel(job.id).await.unwrap_err().code(),
        ErrorCode::NotCancellable
    );
}

#[tokio::test]
async fn test_cancelled_job_remains_retryable_within_budget() {
    let (engine, _queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    engine.cancel(job.id).await.unwrap();

    let job = engine.retry(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
}

// ============================================================================
// Completion Effects
// ============================================================================

#[tokio::test]
async fn test_completion_sets_timestamp_and_clears_error() {
    let (engine, _queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    engine.mark_running(job.id, "w1").await.unwrap();
    let job = engine.mark_completed(job.id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert!(job.error.is_none());
}

#[tokio::test]
async fn test_double_running_transition_rejected() {
    let (engine, _queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    engine.mark_running(job.id, "w1").await.unwrap();

    // Redelivery of an already-running id must not commit a second start
    let err = engine.mark_running(job.id, "w2").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidTransition);

    let job = engine.get(job.id).await.unwrap();
    assert_eq!(job.assigned_worker.as_deref(), Some("w1"));
}

// ============================================================================
// Listing & Stats
// ============================================================================

#[tokio::test]
async fn test_list_failed_newest_first_with_accurate_total() {
    let (engine, _queue) = engine_with_queue();

    for i in 0..15 {
        let mut req = request("email-send");
        req.payload = serde_json::json!({"i": i});
        let job = engine.create(req).await.unwrap();
        engine.mark_running(job.id, "w1").await.unwrap();
        engine.mark_failed(job.id, "boom").await.unwrap();
    }
    // One job that stays pending must not show up
    engine.create(request("report-generate")).await.unwrap();

    let filter = JobFilter {
        status: Some(JobStatus::Failed),
        page: Some(1),
        limit: Some(10),
        ..Default::default()
    };
    let (jobs, total) = engine.list(&filter).await.unwrap();

    assert_eq!(total, 15);
    assert_eq!(jobs.len(), 10);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Failed));
    assert!(jobs
        .windows(2)
        .all(|w| w[0].created_at >= w[1].created_at));

    let filter = JobFilter {
        status: Some(JobStatus::Failed),
        page: Some(2),
        limit: Some(10),
        ..Default::default()
    };
    let (jobs, total) = engine.list(&filter).await.unwrap();
    assert_eq!(total, 15);
    assert_eq!(jobs.len(), 5);
}

#[tokio::test]
async fn test_list_filters_by_type_and_date() {
    let (engine, _queue) = engine_with_queue();

    engine.create(request("email-send")).await.unwrap();
    engine.create(request("report-generate")).await.unwrap();

    let filter = JobFilter {
        job_type: Some("email-send".into()),
        ..Default::default()
    };
    let (jobs, total) = engine.list(&filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(jobs[0].job_type, "email-send");

    // A date window in the past matches nothing
    let filter = JobFilter {
        end_date: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        ..Default::default()
    };
    let (_, total) = engine.list(&filter).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_stats_by_status() {
    let (engine, _queue) = engine_with_queue();

    let a = engine.create(request("email-send")).await.unwrap();
    let b = engine.create(request("email-send")).await.unwrap();
    let _c = engine.create(request("email-send")).await.unwrap();

    engine.mark_running(a.id, "w1").await.unwrap();
    engine.mark_completed(a.id).await.unwrap();
    engine.mark_running(b.id, "w1").await.unwrap();
    engine.mark_failed(b.id, "boom").await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_delete_is_unconditional_and_queue_entry_dangles() {
    let (engine, queue) = engine_with_queue();

    let job = engine.create(request("email-send")).await.unwrap();
    engine.delete(job.id).await.unwrap();

    assert_eq!(
        engine.get(job.id).await.unwrap_err().code(),
        ErrorCode::JobNotFound
    );
    // The queue entry is tolerated; a later delivery becomes a no-op
    assert_eq!(queue.pending_len(DEFAULT_LANE).await.unwrap(), 1);
}
