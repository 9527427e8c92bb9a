//! HTTP API layer for Workhorse Core.
//!
//! REST interface over the lifecycle engine and worker registry. All
//! handlers return `Result<impl IntoResponse, WorkhorseError>` so errors
//! map to HTTP status codes through the `IntoResponse` implementation on
//! `WorkhorseError`.

mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::jobs::JobLifecycle;
use crate::workers::WorkerRegistry;

/// Application state shared across handlers.
///
/// Constructed once at process start and passed by reference everywhere;
/// there is no global connection or singleton state.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<JobLifecycle>,
    pub registry: Arc<WorkerRegistry>,
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/v1/jobs",
            post(handlers::create_job).get(handlers::list_jobs),
        )
        .route("/api/v1/jobs/stats", get(handlers::job_stats))
        .route(
            "/api/v1/jobs/:id",
            get(handlers::get_job).delete(handlers::delete_job),
        )
        .route("/api/v1/jobs/:id/retry", post(handlers::retry_job))
        .route("/api/v1/jobs/:id/cancel", post(handlers::cancel_job))
        .route("/api/v1/workers/register", post(handlers::register_worker))
        .route("/api/v1/workers", get(handlers::list_workers))
        .route(
            "/api/v1/workers/:id/status",
            put(handlers::update_worker_status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// API response wrapper.
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_error() {
        let response: ApiResponse<()> = ApiResponse::error("test error");
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some("test error".to_string()));
    }
}
