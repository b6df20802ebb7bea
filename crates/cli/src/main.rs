//! `conveyor` — operational CLI for the job queue.
//!
//! Covers the database-side operations an operator needs without a running
//! worker: migrations, enqueueing, stats, and the janitor sweeps. Dispatch
//! itself lives in the embedding process, where the handlers are registered.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use conveyor_core::{NewJob, Priority};
use conveyor_queue::{HandlerRegistry, QueueConfig, QueueService};
use conveyor_store::PostgresJobStore;

#[derive(Parser)]
#[command(name = "conveyor", version, about = "Operational tooling for the conveyor job queue")]
struct Cli {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the schema migrations.
    Migrate,

    /// Enqueue one job.
    Enqueue {
        /// Handler key, e.g. `invoice.render`.
        job_type: String,

        /// JSON payload handed to the handler.
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Claim-ordering tier: high, medium, or low.
        #[arg(long, default_value = "medium")]
        priority: String,

        /// Seconds before the job becomes eligible.
        #[arg(long, default_value_t = 0)]
        delay_seconds: u64,

        /// Attempt budget stamped onto the job.
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },

    /// Print job counts per status.
    Stats,

    /// Recover stuck jobs and purge terminal jobs past retention.
    Cleanup {
        #[arg(long, default_value_t = 30)]
        retention_days: u64,

        #[arg(long, default_value_t = 300)]
        lock_timeout_seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    conveyor_observability::init();

    let cli = Cli::parse();
    let store = PostgresJobStore::connect(&cli.database_url).await?;

    match cli.command {
        Command::Migrate => {
            store.migrate().await?;
            println!("migrations applied");
        }
        Command::Enqueue {
            job_type,
            payload,
            priority,
            delay_seconds,
            max_attempts,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let priority: Priority = priority.parse()?;

            let config = QueueConfig::default().with_max_attempts(max_attempts);
            let service = QueueService::new(store, HandlerRegistry::new(), config);

            let id = service
                .add_job(
                    NewJob::new(job_type, payload)
                        .with_priority(priority)
                        .with_delay(Duration::from_secs(delay_seconds)),
                )
                .await?;
            println!("enqueued job {id}");
        }
        Command::Stats => {
            let service = QueueService::new(store, HandlerRegistry::new(), QueueConfig::default());
            let counts = service.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        Command::Cleanup {
            retention_days,
            lock_timeout_seconds,
        } => {
            let config = QueueConfig::default()
                .with_retention(Duration::from_secs(retention_days * 24 * 60 * 60))
                .with_lock_timeout(Duration::from_secs(lock_timeout_seconds));
            let service = QueueService::new(store, HandlerRegistry::new(), config);

            let report = service.cleanup_dead_jobs().await?;
            println!(
                "recovered {} stuck job(s), purged {} terminal job(s)",
                report.recovered, report.purged
            );
        }
    }

    Ok(())
}
