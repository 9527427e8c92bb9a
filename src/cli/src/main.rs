//! Workhorse CLI - Command-line interface for the Workhorse scheduler.
//!
//! Provides commands for job, worker, and health management.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{health, job, worker};
use output::OutputFormat;

/// Workhorse - Job scheduling engine CLI
#[derive(Parser)]
#[command(
    name = "workhorse",
    version = "0.1.0",
    about = "Workhorse - Job scheduling engine",
    long_about = "CLI tool for submitting and managing Workhorse jobs and workers.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "WORKHORSE_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Job management operations
    #[command(subcommand)]
    Job(job::JobCommands),

    /// Worker management operations
    #[command(subcommand)]
    Worker(worker::WorkerCommands),

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Job(cmd) => job::execute(cmd, &client, format).await,
        Commands::Worker(cmd) => worker::execute(cmd, &client, format).await,
        Commands::Health => health::execute(&client).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
