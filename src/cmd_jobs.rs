//! Subcommand handlers for cronkeeper.

use tracing::{info, warn};

use cronkeeper_config::Config;
use cronkeeper_core::{next_fire_times, FileJobStore, JobDefinition, JobKey, JobStore};

use crate::cli::{Commands, OutputFormat};

/// Handle a subcommand.
pub(crate) async fn handle_command(
    command: Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Validate { expressions, count } => validate_expressions(&expressions, count),
        Commands::Jobs { format } => list_jobs(config, format).await,
        Commands::Show { key } => show_job(config, &key).await,
        Commands::Remove { key } => remove_job(config, &key).await,
    }
}

/// Validate cron expressions and print their upcoming fire times.
fn validate_expressions(
    expressions: &[String],
    count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut invalid = 0;

    for expression in expressions {
        match next_fire_times(expression, count) {
            Ok(times) => {
                println!("'{}' is valid", expression);
                for time in times {
                    println!("  {}", time.to_rfc3339());
                }
            }
            Err(e) => {
                invalid += 1;
                println!("{}", e);
            }
        }
    }

    if invalid > 0 {
        return Err(format!("{} of {} expressions are invalid", invalid, expressions.len()).into());
    }
    Ok(())
}

async fn open_store(config: &Config) -> Result<FileJobStore, Box<dyn std::error::Error>> {
    let path = config.storage.resolved_path();
    info!("Using job store at {}", path.display());
    Ok(FileJobStore::new(path).await?)
}

/// List stored jobs.
async fn list_jobs(config: &Config, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config).await?;
    let jobs = store.fetch_all(&config.cron.manager_id).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No cron jobs stored for {}.", config.cron.manager_id);
                return Ok(());
            }

            println!("{:<32} {:<20} {:<14} {}", "JOB", "SCHEDULE", "POLICY", "NEXT RUN");
            println!("{}", "-".repeat(90));
            for job in &jobs {
                println!(
                    "{:<32} {:<20} {:<14} {}",
                    job.key().to_string(),
                    job.cron_schedule.as_deref().unwrap_or("-"),
                    job.collision_policy().to_string(),
                    next_run(job)
                );
            }
            println!("\nTotal: {} jobs", jobs.len());
        }
    }

    Ok(())
}

fn next_run(job: &JobDefinition) -> String {
    job.cron_schedule
        .as_deref()
        .and_then(|expr| next_fire_times(expr, 1).ok())
        .and_then(|times| times.into_iter().next())
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

/// Print one stored job as JSON.
async fn show_job(config: &Config, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key: JobKey = key.parse()?;
    let store = open_store(config).await?;

    match store.fetch(&config.cron.manager_id, &key).await? {
        Some(job) => {
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        None => Err(format!("No such cron job {}", key).into()),
    }
}

/// Remove a stored job.
async fn remove_job(config: &Config, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key: JobKey = key.parse()?;
    let store = open_store(config).await?;

    if store.fetch(&config.cron.manager_id, &key).await?.is_none() {
        warn!("No such cron job {}", key);
        println!("No such cron job {}", key);
        return Ok(());
    }

    store.remove(&config.cron.manager_id, &key).await?;
    println!("Removed cron job {}", key);
    Ok(())
}
