//! Cron job definitions and keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CronError;

/// Unique key of a job: owning role plus job name, rendered as `role/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    /// Owning role.
    pub role: String,
    /// Job name, unique within the role.
    pub name: String,
}

impl JobKey {
    /// Create a new job key.
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role, self.name)
    }
}

impl FromStr for JobKey {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((role, name)) if !role.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(role, name))
            }
            _ => Err(CronError::Schedule(format!(
                "Invalid job key '{}', expected <role>/<name>",
                s
            ))),
        }
    }
}

/// What to do when a trigger fires while a previous run of the job is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollisionPolicy {
    /// Kill the active run, then start the new one once it is gone.
    KillExisting,
    /// Skip the new run.
    CancelNew,
    /// Start the new run alongside the active one.
    RunOverlap,
    /// A policy value this build does not know about.
    #[serde(other)]
    Unrecognized,
}

impl Default for CollisionPolicy {
    fn default() -> Self {
        CollisionPolicy::KillExisting
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollisionPolicy::KillExisting => "KILL_EXISTING",
            CollisionPolicy::CancelNew => "CANCEL_NEW",
            CollisionPolicy::RunOverlap => "RUN_OVERLAP",
            CollisionPolicy::Unrecognized => "UNRECOGNIZED",
        };
        f.write_str(s)
    }
}

/// A job accepted by the cron manager.
///
/// The task configuration is opaque here and handed to the scheduler core
/// untouched on every launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Owning role.
    pub role: String,
    /// Job name.
    pub name: String,
    /// Cron recurrence expression.
    #[serde(default)]
    pub cron_schedule: Option<String>,
    /// Collision policy; `None` means the default (kill existing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_collision_policy: Option<CollisionPolicy>,
    /// Task launch configuration passed through to the scheduler core.
    #[serde(default)]
    pub task_config: serde_json::Value,
}

impl JobDefinition {
    /// Create a new job definition.
    pub fn new(
        role: impl Into<String>,
        name: impl Into<String>,
        cron_schedule: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            cron_schedule: Some(cron_schedule.into()),
            cron_collision_policy: None,
            task_config: serde_json::Value::Null,
        }
    }

    /// Set the collision policy.
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.cron_collision_policy = Some(policy);
        self
    }

    /// Set the task launch configuration.
    pub fn with_task_config(mut self, task_config: serde_json::Value) -> Self {
        self.task_config = task_config;
        self
    }

    /// The unique key of this job.
    pub fn key(&self) -> JobKey {
        JobKey::new(self.role.clone(), self.name.clone())
    }

    /// Whether a non-empty recurrence expression is present.
    pub fn has_cron_schedule(&self) -> bool {
        self.cron_schedule
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// The collision policy, with an unset policy resolved to the default.
    pub fn collision_policy(&self) -> CollisionPolicy {
        self.cron_collision_policy.unwrap_or_default()
    }
}
