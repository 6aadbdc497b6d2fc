//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Poll delays above this are legal but suspicious.
const MAX_BACKOFF_WARN_MS: u64 = 60 * 60 * 1000;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_cron(config, &mut result);
        Self::validate_storage(config, &mut result);

        result
    }

    fn validate_cron(config: &Config, result: &mut ValidationResult) {
        let cron = &config.cron;

        if cron.manager_id.trim().is_empty() {
            result.add_error(ValidationError::new(
                "cron.manager_id",
                "Manager id cannot be empty",
            ));
        }

        if cron.cron_user.trim().is_empty() {
            result.add_error(ValidationError::new(
                "cron.cron_user",
                "Cron user cannot be empty",
            ));
        }

        if cron.initial_backoff_ms == 0 {
            result.add_error(ValidationError::new(
                "cron.initial_backoff_ms",
                "initial_backoff_ms must be greater than 0",
            ));
        }

        if cron.initial_backoff_ms > cron.max_backoff_ms {
            result.add_error(ValidationError::new(
                "cron.max_backoff_ms",
                format!(
                    "max_backoff_ms ({}) is below initial_backoff_ms ({})",
                    cron.max_backoff_ms, cron.initial_backoff_ms
                ),
            ));
        }

        if cron.max_backoff_ms > MAX_BACKOFF_WARN_MS {
            result.add_warning(ValidationWarning::new(
                "cron.max_backoff_ms",
                "max_backoff_ms is over an hour, deferred runs may start long after their previous run ends",
            ));
        }
    }

    fn validate_storage(config: &Config, result: &mut ValidationResult) {
        if config.storage.path.trim().is_empty() {
            result.add_error(ValidationError::new(
                "storage.path",
                "Storage path cannot be empty",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
