//! Deferred launches waiting for a previous run to terminate.
//!
//! At most one background waiter exists per job. A trigger that arrives
//! while a waiter is outstanding only refreshes the definition the waiter
//! will launch; it never spawns a second waiter. A waiter whose job has
//! been deleted in the meantime drops the run instead of launching it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffHelper;
use crate::error::CronError;
use crate::job::{JobDefinition, JobKey};
use crate::metrics::CronMetrics;
use crate::scheduler_core::SchedulerCore;
use crate::task::TaskQuery;

/// Reports whether a job is still registered.
pub type LivenessCheck = Arc<dyn Fn(&JobKey) -> bool + Send + Sync>;

struct PendingRun {
    job: JobDefinition,
    waiter: u64,
    cancel: CancellationToken,
}

/// Outstanding deferred launches, keyed by job.
pub struct PendingRuns {
    runs: Arc<DashMap<JobKey, PendingRun>>,
    core: Arc<dyn SchedulerCore>,
    backoff: BackoffHelper,
    metrics: Arc<CronMetrics>,
    is_live: LivenessCheck,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_waiter: AtomicU64,
}

impl PendingRuns {
    /// Create an empty set of pending runs.
    pub fn new(
        core: Arc<dyn SchedulerCore>,
        backoff: BackoffHelper,
        metrics: Arc<CronMetrics>,
    ) -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            core,
            backoff,
            metrics,
            is_live: Arc::new(|_: &JobKey| true),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_waiter: AtomicU64::new(0),
        }
    }

    /// Consult `is_live` before every deferred launch. Every job counts as
    /// live by default.
    pub fn with_liveness(mut self, is_live: LivenessCheck) -> Self {
        self.is_live = is_live;
        self
    }

    /// Launch `job` once no task matching `query` is active.
    ///
    /// Returns `true` if a new waiter was spawned, `false` if an outstanding
    /// waiter absorbed the run. The check and the insert are one atomic step.
    pub fn defer_run(&self, query: TaskQuery, job: JobDefinition) -> bool {
        let key = job.key();

        let spawned = match self.runs.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().job = job;
                None
            }
            Entry::Vacant(entry) => {
                let waiter = self.next_waiter.fetch_add(1, Ordering::Relaxed);
                let cancel = self.shutdown.child_token();
                entry.insert(PendingRun {
                    job,
                    waiter,
                    cancel: cancel.clone(),
                });
                Some((waiter, cancel))
            }
        };

        let Some((waiter, cancel)) = spawned else {
            self.metrics.record_absorbed();
            info!(job = %key, "Cron run for {} already pending, refreshed its definition", key);
            return false;
        };

        self.metrics.set_pending_runs(self.runs.len() as u64);
        self.metrics.record_waiter_spawned();
        info!(job = %key, "Waiting for job {} to terminate before launching cron", key);

        let waiter = Waiter {
            runs: self.runs.clone(),
            core: self.core.clone(),
            metrics: self.metrics.clone(),
            is_live: self.is_live.clone(),
            key,
            query,
            waiter,
        };
        let backoff = self.backoff;
        self.tracker.spawn(async move {
            waiter.run(backoff, cancel).await;
        });

        true
    }

    /// Drop the pending run of `key` and stop its waiter. Returns whether one existed.
    pub fn abandon(&self, key: &JobKey) -> bool {
        match self.runs.remove(key) {
            Some((_, run)) => {
                run.cancel.cancel();
                self.metrics.set_pending_runs(self.runs.len() as u64);
                info!(job = %key, "Abandoned pending cron run for {}", key);
                true
            }
            None => false,
        }
    }

    /// Whether a run of `key` is pending.
    pub fn contains(&self, key: &JobKey) -> bool {
        self.runs.contains_key(key)
    }

    /// The definition that will be launched for `key`, if a run is pending.
    pub fn pending_job(&self, key: &JobKey) -> Option<JobDefinition> {
        self.runs.get(key).map(|run| run.job.clone())
    }

    /// Number of pending runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no run is pending.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Stop every waiter without launching and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Pending cron runs shut down");
    }
}

struct Waiter {
    runs: Arc<DashMap<JobKey, PendingRun>>,
    core: Arc<dyn SchedulerCore>,
    metrics: Arc<CronMetrics>,
    is_live: LivenessCheck,
    key: JobKey,
    query: TaskQuery,
    waiter: u64,
}

impl Waiter {
    async fn run(&self, backoff: BackoffHelper, cancel: CancellationToken) {
        let result = backoff.do_until_success(&cancel, move || self.attempt()).await;

        if let Err(CronError::Cancelled) = result {
            if self.take().is_some() {
                self.metrics.set_pending_runs(self.runs.len() as u64);
            }
            warn!(job = %self.key, "Interrupted while waiting to launch cron {}", self.key);
        }
    }

    /// One poll. `true` ends the retry loop.
    async fn attempt(&self) -> bool {
        match self.core.has_tasks(&self.query).await {
            Ok(true) => {
                info!(job = %self.key, "Not yet safe to run cron {}", self.key);
                false
            }
            Err(e) => {
                warn!(job = %self.key, "Failed to query tasks of {}, will retry: {}", self.key, e);
                false
            }
            Ok(false) => {
                let Some(run) = self.take() else {
                    debug!(job = %self.key, "Pending run for {} is gone", self.key);
                    return true;
                };
                self.metrics.set_pending_runs(self.runs.len() as u64);

                if !(self.is_live)(&self.key) {
                    info!(job = %self.key, "Cron job {} was deleted, dropping its pending run", self.key);
                    return true;
                }

                info!(job = %self.key, "Initiating delayed launch of cron {}", self.key);
                match self.core.launch(&run.job).await {
                    Ok(()) => self.metrics.record_launch(true),
                    Err(e) => {
                        self.metrics.record_abandoned();
                        error!(job = %self.key, "Delayed launch of cron {} failed: {}", self.key, e);
                    }
                }
                true
            }
        }
    }

    /// Remove this waiter's entry, leaving a newer waiter's entry alone.
    fn take(&self) -> Option<PendingRun> {
        self.runs
            .remove_if(&self.key, |_, run| run.waiter == self.waiter)
            .map(|(_, run)| run)
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
