//! Built-in processors.
//!
//! These cover the stock job types shipped with the server: email delivery,
//! report generation, and data synchronization. Their internals are opaque
//! to the engine; they exist so a fresh deployment has working job types
//! and so tests have realistic processors to dispatch.

use async_trait::async_trait;
use std::time::Duration;

use super::processor::{Processor, ProcessorError, ProcessorResult};
use super::JobRecord;

/// Sends an email described by `{to, subject, body}`.
pub struct EmailProcessor {
    /// Simulated delivery latency
    latency: Duration,
}

impl EmailProcessor {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(200),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for EmailProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for EmailProcessor {
    fn job_type(&self) -> &'static str {
        "email-send"
    }

    async fn process(&self, job: &JobRecord) -> ProcessorResult {
        let to = job
            .payload
            .get("to")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProcessorError::new("email payload missing 'to'"))?;

        tracing::info!(job_id = %job.id, to, "Sending email");
        tokio::time::sleep(self.latency).await;

        Ok(serde_json::json!({
            "success": true,
            "messageId": format!("email-{}", job.id),
        }))
    }
}

/// Generates a report described by `{reportType, parameters}`.
pub struct ReportProcessor {
    latency: Duration,
}

impl ReportProcessor {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(500),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for ReportProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for ReportProcessor {
    fn job_type(&self) -> &'static str {
        "report-generate"
    }

    async fn process(&self, job: &JobRecord) -> ProcessorResult {
        let report_type = job
            .payload
            .get("reportType")
            .and_then(|v| v.as_str())
            .unwrap_or("generic");

        tracing::info!(job_id = %job.id, report_type, "Generating report");
        tokio::time::sleep(self.latency).await;

        Ok(serde_json::json!({
            "success": true,
            "reportUrl": format!("/reports/{}-{}.pdf", report_type, job.id),
        }))
    }
}

/// Synchronizes records described by `{source, target, data}`.
pub struct DataSyncProcessor {
    latency: Duration,
}

impl DataSyncProcessor {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(300),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for DataSyncProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for DataSyncProcessor {
    fn job_type(&self) -> &'static str {
        "data-sync"
    }

    async fn process(&self, job: &JobRecord) -> ProcessorResult {
        let source = job
            .payload
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let target = job
            .payload
            .get("target")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let records = job
            .payload
            .get("data")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);

        tracing::info!(job_id = %job.id, source, target, records, "Syncing data");
        tokio::time::sleep(self.latency).await;

        Ok(serde_json::json!({
            "success": true,
            "recordsProcessed": records,
        }))
    }
}
