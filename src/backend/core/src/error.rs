//! Error handling for Workhorse Core.
//!
//! This module provides:
//! - Machine-readable error codes covering the job and worker state machines
//! - HTTP status code mapping for API responses
//! - User-friendly messages vs detailed internal messages
//! - Error logging with tracing integration
//! - Metrics integration for error tracking

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Workhorse operations.
pub type Result<T> = std::result::Result<T, WorkhorseError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Job lifecycle errors (1000-1099)
    JobNotFound,
    InvalidTransition,
    NotRetryable,
    NotCancellable,

    // Dispatch errors (1100-1199)
    UnknownProcessor,
    ProcessorFailed,
    ProcessorTimeout,

    // Worker errors (1200-1299)
    WorkerNotFound,

    // Transport errors (2000-2099)
    QueueUnavailable,
    StoreUnavailable,

    // Serialization errors (2200-2299)
    SerializationError,

    // Validation errors (4100-4199)
    ValidationError,

    // Configuration errors (5000-5099)
    ConfigurationError,

    // Internal errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::JobNotFound => 1000,
            Self::InvalidTransition => 1001,
            Self::NotRetryable => 1002,
            Self::NotCancellable => 1003,

            Self::UnknownProcessor => 1100,
            Self::ProcessorFailed => 1101,
            Self::ProcessorTimeout => 1102,

            Self::WorkerNotFound => 1200,

            Self::QueueUnavailable => 2000,
            Self::StoreUnavailable => 2001,

            Self::SerializationError => 2200,

            Self::ValidationError => 4100,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            // Not Found (404)
            Self::JobNotFound | Self::WorkerNotFound => StatusCode::NOT_FOUND,

            // Conflict (409)
            Self::InvalidTransition | Self::NotRetryable | Self::NotCancellable => {
                StatusCode::CONFLICT
            }

            // Unprocessable Entity (422)
            Self::ValidationError | Self::UnknownProcessor => StatusCode::UNPROCESSABLE_ENTITY,

            // Timeout (504)
            Self::ProcessorTimeout => StatusCode::GATEWAY_TIMEOUT,

            // Service Unavailable (503)
            Self::QueueUnavailable | Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            // Internal Server Error (500)
            Self::ProcessorFailed
            | Self::SerializationError
            | Self::ConfigurationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QueueUnavailable
                | Self::StoreUnavailable
                | Self::ProcessorFailed
                | Self::ProcessorTimeout
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "lifecycle",
            1100..=1199 => "dispatch",
            1200..=1299 => "worker",
            2000..=2099 => "transport",
            2200..=2299 => "serialization",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// User errors (bad input, illegal state transitions)
    Low,
    /// Operational issues (processor failures, timeouts)
    Medium,
    /// System errors (queue/store outages, critical bugs)
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::JobNotFound
            | ErrorCode::WorkerNotFound
            | ErrorCode::InvalidTransition
            | ErrorCode::NotRetryable
            | ErrorCode::NotCancellable
            | ErrorCode::UnknownProcessor
            | ErrorCode::ValidationError => Self::Low,

            ErrorCode::ProcessorFailed | ErrorCode::ProcessorTimeout => Self::Medium,

            ErrorCode::QueueUnavailable
            | ErrorCode::StoreUnavailable
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Workhorse Core.
///
/// Supports structured error codes, user-friendly vs internal messages,
/// HTTP status mapping, and metrics integration.
#[derive(Error, Debug)]
pub struct WorkhorseError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for WorkhorseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl WorkhorseError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a job-not-found error.
    pub fn job_not_found(id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", id))
    }

    /// Create a worker-not-found error.
    pub fn worker_not_found(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::WorkerNotFound,
            format!("Worker not found: {}", id),
        )
    }

    /// Create an invalid-transition error.
    pub fn invalid_transition(
        id: impl fmt::Display,
        from: impl fmt::Display,
        attempted: &str,
    ) -> Self {
        Self::new(
            ErrorCode::InvalidTransition,
            format!("Job {} is {}, cannot {}", id, from, attempted),
        )
    }

    /// Create a not-retryable error.
    pub fn not_retryable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::NotRetryable, message)
    }

    /// Create a not-cancellable error.
    pub fn not_cancellable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::NotCancellable, message)
    }

    /// Create an unknown-processor error.
    pub fn unknown_processor(job_type: &str) -> Self {
        Self::new(
            ErrorCode::UnknownProcessor,
            format!("No processor registered for job type '{}'", job_type),
        )
    }

    /// Create a queue transport error.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::QueueUnavailable,
            "Dispatch queue unavailable",
            message,
        )
    }

    /// Create a store transport error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::StoreUnavailable,
            "Record store unavailable",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Record error metrics.
    fn record_metrics(&self) {
        counter!(
            "workhorse_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&WorkhorseError> for ErrorResponse {
    fn from(error: &WorkhorseError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for WorkhorseError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| WorkhorseError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| WorkhorseError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| WorkhorseError::new(ErrorCode::JobNotFound, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| WorkhorseError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for WorkhorseError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to serialize or deserialize data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<redis::RedisError> for WorkhorseError {
    fn from(error: redis::RedisError) -> Self {
        Self::with_internal(
            ErrorCode::QueueUnavailable,
            "Dispatch queue unavailable",
            error.to_string(),
        )
        .with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::JobNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::InvalidTransition.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::ValidationError.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::QueueUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::QueueUnavailable.is_retryable());
        assert!(ErrorCode::ProcessorTimeout.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
        assert!(!ErrorCode::NotRetryable.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = WorkhorseError::with_internal(
            ErrorCode::StoreUnavailable,
            "Record store unavailable",
            "connection refused",
        );
        let text = err.to_string();
        assert!(text.contains("StoreUnavailable"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = WorkhorseError::invalid_transition("j1", "completed", "cancel");
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
        assert!(err.user_message().contains("completed"));
    }

    #[test]
    fn test_severity_from_code() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::ValidationError),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::ProcessorFailed),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::StoreUnavailable),
            ErrorSeverity::High
        );
    }
}
