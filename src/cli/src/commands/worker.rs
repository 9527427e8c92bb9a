//! Worker management commands.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Register a worker by name (idempotent)
    Register {
        /// Unique worker name
        name: String,
    },

    /// List workers, most recent heartbeat first
    List,

    /// Send a status report for a worker
    Report {
        /// Worker ID
        worker_id: Uuid,

        /// New status (idle, active, failed)
        #[arg(short, long)]
        status: String,

        /// Memory usage metric
        #[arg(long, default_value = "0")]
        memory: f64,

        /// CPU usage metric
        #[arg(long, default_value = "0")]
        cpu: f64,

        /// Job currently held by the worker
        #[arg(long)]
        current_job: Option<Uuid>,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RegisterWorkerRequest {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWorkerStatusRequest {
    status: String,
    memory_usage: f64,
    cpu_usage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_job: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkerInfo {
    id: Uuid,
    name: String,
    status: String,
    #[serde(default)]
    current_job: Option<Uuid>,
    processed_jobs: u64,
    last_heartbeat: String,
    memory_usage: f64,
    cpu_usage: f64,
}

#[derive(Tabled, Serialize)]
struct WorkerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Processed")]
    processed_jobs: u64,
    #[tabled(rename = "Mem")]
    memory: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Last Heartbeat")]
    last_heartbeat: String,
}

impl From<&WorkerInfo> for WorkerRow {
    fn from(worker: &WorkerInfo) -> Self {
        Self {
            id: worker.id.to_string(),
            name: worker.name.clone(),
            status: worker.status.clone(),
            processed_jobs: worker.processed_jobs,
            memory: format!("{:.1}", worker.memory_usage),
            cpu: format!("{:.1}", worker.cpu_usage),
            last_heartbeat: worker.last_heartbeat.clone(),
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: WorkerCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        WorkerCommands::Register { name } => {
            let worker: WorkerInfo = client
                .post("/api/v1/workers/register", &RegisterWorkerRequest { name })
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success("Worker registered");
                    output::print_detail("ID", &worker.id.to_string());
                    output::print_detail("Name", &worker.name);
                    output::print_detail("Status", &worker.status);
                }
                OutputFormat::Json => output::print_item(&worker, format),
            }
        }

        WorkerCommands::List => {
            let workers: Vec<WorkerInfo> = client.get("/api/v1/workers").await?;
            let rows: Vec<WorkerRow> = workers.iter().map(WorkerRow::from).collect();
            output::print_list(&rows, format);
        }

        WorkerCommands::Report {
            worker_id,
            status,
            memory,
            cpu,
            current_job,
        } => {
            let body = UpdateWorkerStatusRequest {
                status,
                memory_usage: memory,
                cpu_usage: cpu,
                current_job,
            };
            let worker: WorkerInfo = client
                .put(&format!("/api/v1/workers/{}/status", worker_id), &body)
                .await?;
            output::print_success(&format!(
                "Worker {} is {} ({} processed)",
                worker.name, worker.status, worker.processed_jobs
            ));
        }
    }

    Ok(())
}
