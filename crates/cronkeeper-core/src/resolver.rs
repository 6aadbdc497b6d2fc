//! Decides what a trigger does when a previous run is still active.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::job::{CollisionPolicy, JobDefinition};
use crate::metrics::CronMetrics;
use crate::pending::PendingRuns;
use crate::scheduler_core::SchedulerCore;
use crate::task::TaskQuery;

/// Result of handling one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Launched right away.
    Launched,
    /// Active tasks were killed and the new run launched right away.
    KilledAndLaunched,
    /// Launch handed to a background waiter.
    Deferred {
        /// Whether this trigger spawned the waiter, or joined an outstanding one.
        waiter_spawned: bool,
    },
    /// The collision policy skipped this run.
    Skipped,
    /// A scheduler core call failed; nothing was launched.
    Abandoned,
}

impl fmt::Display for TriggerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerOutcome::Launched => f.write_str("launched"),
            TriggerOutcome::KilledAndLaunched => f.write_str("killed existing and launched"),
            TriggerOutcome::Deferred { waiter_spawned: true } => f.write_str("deferred"),
            TriggerOutcome::Deferred { waiter_spawned: false } => {
                f.write_str("deferred (joined pending run)")
            }
            TriggerOutcome::Skipped => f.write_str("skipped"),
            TriggerOutcome::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Applies a job's collision policy each time its trigger fires.
pub struct CollisionResolver {
    core: Arc<dyn SchedulerCore>,
    pending: Arc<PendingRuns>,
    metrics: Arc<CronMetrics>,
    cron_user: String,
}

impl CollisionResolver {
    /// Create a resolver. `cron_user` is the identity kill requests are issued as.
    pub fn new(
        core: Arc<dyn SchedulerCore>,
        pending: Arc<PendingRuns>,
        metrics: Arc<CronMetrics>,
        cron_user: impl Into<String>,
    ) -> Self {
        Self {
            core,
            pending,
            metrics,
            cron_user: cron_user.into(),
        }
    }

    /// Handle one trigger of `job`.
    ///
    /// Failures of the scheduler core are logged and end the trigger; they
    /// never propagate to the timer.
    pub async fn resolve(&self, job: &JobDefinition) -> TriggerOutcome {
        let key = job.key();
        self.metrics.record_trigger();
        info!(job = %key, "Cron triggered for {} at {}", key, Utc::now().to_rfc3339());

        let query = TaskQuery::active_for(job);
        let active = match self.core.has_tasks(&query).await {
            Ok(active) => active,
            Err(e) => {
                self.metrics.record_abandoned();
                error!(job = %key, "Failed to query active tasks of {}: {}", key, e);
                return TriggerOutcome::Abandoned;
            }
        };

        if !active {
            return self.launch(job, TriggerOutcome::Launched).await;
        }

        match job.collision_policy() {
            CollisionPolicy::KillExisting => self.kill_existing(query, job).await,
            CollisionPolicy::CancelNew => {
                self.metrics.record_skip();
                info!(job = %key, "Cron collision policy prevented job {} from running", key);
                TriggerOutcome::Skipped
            }
            CollisionPolicy::RunOverlap => {
                info!(job = %key, "Cron collision policy permitting overlapping run of {}", key);
                self.launch(job, TriggerOutcome::Launched).await
            }
            CollisionPolicy::Unrecognized => {
                warn!(
                    job = %key,
                    "Unrecognized cron collision policy for {}, falling back to {}",
                    key,
                    CollisionPolicy::KillExisting
                );
                self.kill_existing(query, job).await
            }
        }
    }

    async fn kill_existing(&self, query: TaskQuery, job: &JobDefinition) -> TriggerOutcome {
        let key = job.key();
        info!(job = %key, "Cron collision policy requires killing existing run of {}", key);

        if let Err(e) = self.core.kill(&query, &self.cron_user).await {
            self.metrics.record_abandoned();
            error!(job = %key, "Failed to kill active tasks of {}: {}", key, e);
            return TriggerOutcome::Abandoned;
        }
        self.metrics.record_kill();

        match self.core.has_tasks(&query).await {
            Ok(false) => self.launch(job, TriggerOutcome::KilledAndLaunched).await,
            Ok(true) => TriggerOutcome::Deferred {
                waiter_spawned: self.pending.defer_run(query, job.clone()),
            },
            Err(e) => {
                // The waiter polls again, so an unknown state is treated as still active.
                warn!(job = %key, "Failed to re-check tasks of {} after kill: {}", key, e);
                TriggerOutcome::Deferred {
                    waiter_spawned: self.pending.defer_run(query, job.clone()),
                }
            }
        }
    }

    async fn launch(&self, job: &JobDefinition, outcome: TriggerOutcome) -> TriggerOutcome {
        let key = job.key();
        match self.core.launch(job).await {
            Ok(()) => {
                self.metrics.record_launch(false);
                info!(job = %key, "Launched cron run of {}", key);
                outcome
            }
            Err(e) => {
                self.metrics.record_abandoned();
                error!(job = %key, "Failed to launch cron run of {}: {}", key, e);
                TriggerOutcome::Abandoned
            }
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
