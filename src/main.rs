//! `georisk` — the geopolitical risk scoring pipeline process.
//!
//! Either runs the long-lived scheduler loop, triggers a single task
//! out-of-band, or reports the scheduler's per-task status.

use anyhow::Result;
use clap::{Parser, Subcommand};
use georisk_pipeline::coordinator::TaskName;
use georisk_pipeline::{Config, Coordinator, Storage};
use georisk_pipeline::register::Register;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "georisk", about = "Geopolitical risk scoring pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator's long-lived tick loop.
    RunScheduler,
    /// Run a single named task out-of-band and exit.
    RunTask {
        #[arg(value_name = "TASK")]
        task: String,
    },
    /// Print the per-task scheduler state table.
    SchedulerStatus,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::from(3)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);
    let storage = Arc::new(Storage::open(&config.database_path)?);
    let register = Register::connect(config.redis_url.as_deref()).await?;
    let coordinator = Coordinator::new(Arc::clone(&config), Arc::clone(&storage), register);

    match cli.command {
        Command::RunScheduler => run_scheduler(&coordinator, &config).await,
        Command::RunTask { task } => run_task(&coordinator, &task).await,
        Command::SchedulerStatus => scheduler_status(&coordinator).await,
    }
}

async fn run_scheduler(coordinator: &Coordinator, config: &Config) -> Result<ExitCode> {
    info!("starting scheduler loop");
    let mut ticker = tokio::time::interval(config.tick_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = coordinator.tick().await {
                    error!(error = %e, "coordinator tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(ExitCode::from(4));
            }
        }
    }
}

async fn run_task(coordinator: &Coordinator, task: &str) -> Result<ExitCode> {
    let task_name = match TaskName::from_str(task) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::from(2));
        }
    };

    match coordinator.run_manual(task_name).await {
        Ok(()) => {
            info!(task = task_name.as_str(), "task completed");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(task = task_name.as_str(), error = %e, "task failed");
            Ok(ExitCode::from(3))
        }
    }
}

async fn scheduler_status(coordinator: &Coordinator) -> Result<ExitCode> {
    let statuses = coordinator.status().await?;
    println!("{:<22} {:<28} {:>14} {:>6}", "task", "last_run_at", "interval_secs", "due");
    for status in statuses {
        let last_run = status
            .last_run_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<22} {:<28} {:>14} {:>6}",
            status.name, last_run, status.interval_secs, status.due
        );
    }
    Ok(ExitCode::SUCCESS)
}
