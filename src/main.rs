//! cronkeeper - cron job manager for a cluster scheduler
//!
//! Operator CLI over the stored cron job registry.

mod cli;
mod cmd_jobs;

use clap::Parser;
use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cronkeeper_config::{ConfigLoader, ConfigValidator, LoggingConfig};

use crate::cli::Cli;
use crate::cmd_jobs::handle_command;

/// Initialize tracing with console output and, if a log directory is
/// configured, a daily-rolling file.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match logging.resolved_directory() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("cronkeeper")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&dir)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes buffered lines on exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        // Console on stderr keeps stdout clean for command output.
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)?;
    init_tracing(&config.logging)?;

    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
    validation.into_result()?;

    handle_command(cli.command, &config).await
}
