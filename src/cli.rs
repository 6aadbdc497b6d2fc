//! CLI definitions for cronkeeper.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// cronkeeper CLI.
#[derive(Parser)]
#[command(name = "cronkeeper")]
#[command(about = "Cron job manager for a cluster scheduler")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Check cron expressions and preview their next fire times
    Validate {
        /// Cron expressions (5, 6 or 7 fields)
        #[arg(required = true)]
        expressions: Vec<String>,

        /// Number of upcoming fire times to print
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },

    /// List stored cron jobs
    Jobs {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show one stored cron job as JSON
    Show {
        /// Job key (<role>/<name>)
        key: String,
    },

    /// Remove a stored cron job; a running manager picks this up on its next boot
    Remove {
        /// Job key (<role>/<name>)
        key: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from(["cronkeeper", "validate", "0 0 * * *", "*/5 * * * *", "-n", "3"])
            .unwrap();
        match cli.command {
            Commands::Validate { expressions, count } => {
                assert_eq!(expressions, vec!["0 0 * * *", "*/5 * * * *"]);
                assert_eq!(count, 3);
            }
            _ => panic!("expected validate"),
        }
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
    }

    #[test]
    fn test_validate_requires_expression() {
        assert!(Cli::try_parse_from(["cronkeeper", "validate"]).is_err());
    }

    #[test]
    fn test_parse_jobs_format() {
        let cli = Cli::try_parse_from(["cronkeeper", "--config", "/etc/cronkeeper.toml", "jobs", "--format", "json"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/cronkeeper.toml"));
        assert!(matches!(cli.command, Commands::Jobs { format: OutputFormat::Json }));
    }

    #[test]
    fn test_parse_show_and_remove() {
        let cli = Cli::try_parse_from(["cronkeeper", "show", "www-data/backup"]).unwrap();
        assert!(matches!(cli.command, Commands::Show { ref key } if key == "www-data/backup"));

        let cli = Cli::try_parse_from(["cronkeeper", "remove", "www-data/backup"]).unwrap();
        assert!(matches!(cli.command, Commands::Remove { .. }));
    }
}
