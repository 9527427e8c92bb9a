//! API request handlers with proper error propagation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiResponse, AppState};
use crate::error::WorkhorseError;
use crate::jobs::{CreateJobRequest, JobFilter, JobId, JobRecord};
use crate::workers::{Worker, WorkerId, WorkerMetrics, WorkerStatus};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobRecord>,
    pub total: u64,
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let job = state.lifecycle.create(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(job))))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let job = state.lifecycle.get(JobId::from_uuid(id)).await?;
    Ok(Json(ApiResponse::success(job)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let (jobs, total) = state.lifecycle.list(&filter).await?;
    Ok(Json(ApiResponse::success(ListJobsResponse { jobs, total })))
}

pub async fn job_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let stats = state.lifecycle.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let job = state.lifecycle.retry(JobId::from_uuid(id)).await?;
    Ok(Json(ApiResponse::success(job)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let job = state.lifecycle.cancel(JobId::from_uuid(id)).await?;
    Ok(Json(ApiResponse::success(job)))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let job = state.lifecycle.delete(JobId::from_uuid(id)).await?;
    Ok(Json(ApiResponse::success(job)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Worker Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkerStatusRequest {
    pub status: WorkerStatus,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    #[serde(default)]
    pub current_job: Option<JobId>,
}

pub async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<RegisterWorkerRequest>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let worker = state.registry.register(&req.name).await?;
    Ok(Json(ApiResponse::success(worker)))
}

pub async fn list_workers(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let workers: Vec<Worker> = state.registry.list().await?;
    Ok(Json(ApiResponse::success(workers)))
}

pub async fn update_worker_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateWorkerStatusRequest>,
) -> Result<impl IntoResponse, WorkhorseError> {
    let metrics = WorkerMetrics {
        memory_usage: req.memory_usage,
        cpu_usage: req.cpu_usage,
        current_job: req.current_job,
    };
    let worker = state
        .registry
        .report_status(WorkerId(id), req.status, metrics)
        .await?;
    Ok(Json(ApiResponse::success(worker)))
}
