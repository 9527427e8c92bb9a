//! Job management commands.
//!
//! Provides submit, list, get, retry, cancel, delete, and stats operations.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a new job
    Submit {
        /// Job type (selects the processor, e.g. email-send)
        #[arg(short = 't', long = "type")]
        job_type: String,

        /// JSON payload passed to the processor
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// ISO-8601 time to defer dispatch until
        #[arg(short, long)]
        schedule: Option<String>,

        /// Maximum retry attempts
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// List jobs
    List {
        /// Filter by job type
        #[arg(short = 't', long = "type")]
        job_type: Option<String>,

        /// Filter by status (pending, running, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Page number (1-indexed)
        #[arg(long, default_value = "1")]
        page: u64,

        /// Page size
        #[arg(short, long, default_value = "10")]
        limit: u64,
    },

    /// Show a job, including its execution log
    Get {
        /// Job ID
        job_id: Uuid,
    },

    /// Retry a failed job
    Retry {
        /// Job ID
        job_id: Uuid,
    },

    /// Cancel a pending or running job
    Cancel {
        /// Job ID
        job_id: Uuid,
    },

    /// Delete a job record
    Delete {
        /// Job ID
        job_id: Uuid,
    },

    /// Show aggregate job counts by status
    Stats,
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest {
    #[serde(rename = "type")]
    job_type: String,
    payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_policy: Option<RetryPolicyReq>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetryPolicyReq {
    max_attempts: u32,
    delay: u64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInfo {
    id: Uuid,
    #[serde(rename = "type")]
    job_type: String,
    status: String,
    retry_count: u32,
    max_retries: u32,
    #[serde(default)]
    assigned_worker: Option<String>,
    #[serde(default)]
    error: Option<String>,
    created_at: String,
    #[serde(default)]
    logs: Vec<serde_json::Value>,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ListJobsResponse {
    jobs: Vec<JobInfo>,
    total: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct JobStats {
    total: u64,
    pending: u64,
    running: u64,
    completed: u64,
    failed: u64,
}

#[derive(Tabled, Serialize)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    job_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Retries")]
    retries: String,
    #[tabled(rename = "Worker")]
    worker: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&JobInfo> for JobRow {
    fn from(job: &JobInfo) -> Self {
        Self {
            id: job.id.to_string(),
            job_type: job.job_type.clone(),
            status: job.status.clone(),
            retries: format!("{}/{}", job.retry_count, job.max_retries),
            worker: job.assigned_worker.clone().unwrap_or_default(),
            created_at: job.created_at.clone(),
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: JobCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        JobCommands::Submit {
            job_type,
            payload,
            schedule,
            max_retries,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("Payload must be valid JSON")?;

            let body = CreateJobRequest {
                job_type,
                payload,
                schedule_time: schedule,
                retry_policy: max_retries.map(|max_attempts| RetryPolicyReq {
                    max_attempts,
                    delay: 1000,
                }),
            };

            let job: JobInfo = client.post("/api/v1/jobs", &body).await?;
            match format {
                OutputFormat::Table => {
                    output::print_success("Job submitted");
                    output::print_detail("ID", &job.id.to_string());
                    output::print_detail("Type", &job.job_type);
                    output::print_detail("Status", &job.status);
                }
                OutputFormat::Json => output::print_item(&job, format),
            }
        }

        JobCommands::List {
            job_type,
            status,
            page,
            limit,
        } => {
            let mut query = vec![format!("page={}", page), format!("limit={}", limit)];
            if let Some(t) = job_type {
                query.push(format!("type={}", t));
            }
            if let Some(s) = status {
                query.push(format!("status={}", s));
            }

            let resp: ListJobsResponse = client
                .get(&format!("/api/v1/jobs?{}", query.join("&")))
                .await?;

            let rows: Vec<JobRow> = resp.jobs.iter().map(JobRow::from).collect();
            output::print_list(&rows, format);
            if matches!(format, OutputFormat::Table) {
                output::print_detail("Total", &resp.total.to_string());
            }
        }

        JobCommands::Get { job_id } => {
            let job: JobInfo = client.get(&format!("/api/v1/jobs/{}", job_id)).await?;
            output::print_item(&job, format);
        }

        JobCommands::Retry { job_id } => {
            let job: JobInfo = client
                .post_empty(&format!("/api/v1/jobs/{}/retry", job_id))
                .await?;
            output::print_success(&format!(
                "Retry {}/{} scheduled",
                job.retry_count, job.max_retries
            ));
        }

        JobCommands::Cancel { job_id } => {
            let _job: JobInfo = client
                .post_empty(&format!("/api/v1/jobs/{}/cancel", job_id))
                .await?;
            output::print_success("Job cancelled");
        }

        JobCommands::Delete { job_id } => {
            let _job: JobInfo = client.delete(&format!("/api/v1/jobs/{}", job_id)).await?;
            output::print_success("Job deleted");
        }

        JobCommands::Stats => {
            let stats: JobStats = client.get("/api/v1/jobs/stats").await?;
            match format {
                OutputFormat::Table => {
                    output::print_detail("Total", &stats.total.to_string());
                    output::print_detail("Pending", &stats.pending.to_string());
                    output::print_detail("Running", &stats.running.to_string());
                    output::print_detail("Completed", &stats.completed.to_string());
                    output::print_detail("Failed", &stats.failed.to_string());
                }
                OutputFormat::Json => output::print_item(&stats, format),
            }
        }
    }

    Ok(())
}
