//! Error types for the cron job manager.

use thiserror::Error;

use crate::job::JobKey;

/// Errors that can occur while registering, storing or triggering cron jobs.
#[derive(Debug, Error)]
pub enum CronError {
    /// The recurrence expression could not be parsed.
    #[error("Invalid cron schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// The job carries no recurrence expression at all.
    #[error("Not a valid cron job, {0} has no cron schedule")]
    MissingSchedule(JobKey),

    /// No job with the given key is registered.
    #[error("No such cron job {0}")]
    JobNotFound(JobKey),

    /// Operational failure reported by the scheduler core (e.g. a failed kill).
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Persistent job registry failure.
    #[error("Job store error: {0}")]
    Store(String),

    /// The operation observed cancellation before completing.
    #[error("Operation cancelled")]
    Cancelled,
}

impl CronError {
    /// Whether this error came from user input rather than an operational failure.
    pub fn is_invalid_schedule(&self) -> bool {
        matches!(self, Self::InvalidSchedule { .. } | Self::MissingSchedule(_))
    }
}

impl From<serde_json::Error> for CronError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(format!("serialization failed: {}", err))
    }
}

/// Result type for cron manager operations.
pub type CronResult<T> = Result<T, CronError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_schedule_display() {
        let err = CronError::InvalidSchedule {
            expression: "not a cron string".to_string(),
            reason: "expected 5 to 7 fields".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("not a cron string"));
        assert!(display.contains("5 to 7 fields"));
        assert!(err.is_invalid_schedule());
    }

    #[test]
    fn test_job_not_found_display() {
        let err = CronError::JobNotFound(JobKey::new("role", "nightly"));
        assert_eq!(err.to_string(), "No such cron job role/nightly");
        assert!(!err.is_invalid_schedule());
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = CronError::from(serde_err);
        assert!(matches!(err, CronError::Store(_)));
    }
}
