//! # cronkeeper core
//!
//! Periodic job triggering for a cluster scheduler.
//!
//! Jobs carrying a cron expression are scheduled with a [`TriggerTimer`].
//! Each firing is handed to the [`CollisionResolver`], which checks the
//! scheduler core for active instances of the job and applies the job's
//! [`CollisionPolicy`]: launch, kill then launch, defer until the previous
//! run has drained, or skip. Deferred launches go through [`PendingRuns`],
//! which keeps at most one waiter per job.
//!
//! [`CronJobManager`] ties these together with a persistent [`JobStore`].

pub mod backoff;
pub mod error;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod pending;
pub mod registry;
pub mod resolver;
pub mod scheduler_core;
pub mod store;
pub mod task;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::BackoffHelper;
pub use error::{CronError, CronResult};
pub use job::{CollisionPolicy, JobDefinition, JobKey};
pub use manager::{CronJobManager, JobManager};
pub use metrics::{CronMetrics, MetricsSnapshot};
pub use pending::{LivenessCheck, PendingRuns};
pub use registry::TriggerRegistry;
pub use resolver::{CollisionResolver, TriggerOutcome};
pub use scheduler_core::SchedulerCore;
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use task::{TaskInstance, TaskQuery, TaskState};
pub use timer::{
    next_fire_times, parse_schedule, CronTimer, ScheduleHandle, TriggerCallback, TriggerTimer,
};
