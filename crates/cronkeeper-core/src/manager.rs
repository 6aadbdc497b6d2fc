//! The cron job manager.
//!
//! Composes the trigger registry, the collision resolver and the pending
//! runs with a persistent [`JobStore`]. Registration order for a new
//! definition is: schedule with the timer, persist, then record the handle.
//! Registrations and deletions of one key are serialized, so the recorded
//! handle always fires the definition that was persisted last.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cronkeeper_config::CronConfig;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffHelper;
use crate::error::{CronError, CronResult};
use crate::job::{JobDefinition, JobKey};
use crate::metrics::{CronMetrics, MetricsSnapshot};
use crate::pending::PendingRuns;
use crate::registry::TriggerRegistry;
use crate::resolver::{CollisionResolver, TriggerOutcome};
use crate::scheduler_core::SchedulerCore;
use crate::store::JobStore;
use crate::timer::{ScheduleHandle, TriggerCallback, TriggerTimer};

/// A pluggable job manager of the cluster scheduler.
///
/// Several managers may compete to accept a job; each namespaces its
/// persisted jobs under [`unique_manager_id`](JobManager::unique_manager_id).
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Identifier namespacing this manager's persisted jobs.
    fn unique_manager_id(&self) -> &str;

    /// Restore persisted jobs on process boot.
    async fn start(&self) -> CronResult<()>;

    /// Offer a job. Returns whether this manager accepted it.
    async fn receive_job(&self, job: JobDefinition) -> CronResult<bool>;

    /// Whether a job is persisted under `key`.
    async fn has_job(&self, key: &JobKey) -> CronResult<bool>;

    /// All persisted jobs.
    async fn get_jobs(&self) -> CronResult<Vec<JobDefinition>>;

    /// Remove a job. Returns whether it existed.
    async fn delete_job(&self, key: &JobKey) -> CronResult<bool>;
}

/// Job manager that runs jobs on cron schedules.
pub struct CronJobManager {
    manager_id: String,
    store: Arc<dyn JobStore>,
    registry: Arc<TriggerRegistry>,
    resolver: Arc<CollisionResolver>,
    pending: Arc<PendingRuns>,
    metrics: Arc<CronMetrics>,
    key_locks: DashMap<JobKey, Arc<Mutex<()>>>,
}

impl CronJobManager {
    /// Create a manager.
    pub fn new(
        config: &CronConfig,
        store: Arc<dyn JobStore>,
        core: Arc<dyn SchedulerCore>,
        timer: Arc<dyn TriggerTimer>,
    ) -> Self {
        let metrics = Arc::new(CronMetrics::new());
        let registry = Arc::new(TriggerRegistry::new(timer));

        // Weak, since the timer's callbacks reach back into the pending runs.
        let live: Weak<TriggerRegistry> = Arc::downgrade(&registry);
        let backoff = BackoffHelper::new(config.initial_backoff(), config.max_backoff());
        let pending = Arc::new(
            PendingRuns::new(core.clone(), backoff, metrics.clone()).with_liveness(Arc::new(
                move |key: &JobKey| live.upgrade().is_some_and(|r| r.lookup(key).is_some()),
            )),
        );
        let resolver = Arc::new(CollisionResolver::new(
            core,
            pending.clone(),
            metrics.clone(),
            config.cron_user.clone(),
        ));

        Self {
            manager_id: config.manager_id.clone(),
            store,
            registry,
            resolver,
            pending,
            metrics,
            key_locks: DashMap::new(),
        }
    }

    /// Resolve a trigger of `key` now, exactly as a timer firing would.
    pub async fn trigger_now(&self, key: &JobKey) -> CronResult<TriggerOutcome> {
        let job = self
            .store
            .fetch(&self.manager_id, key)
            .await?
            .ok_or_else(|| CronError::JobNotFound(key.clone()))?;

        info!(job = %key, "Manually triggering cron job {}", key);
        Ok(self.resolver.resolve(&job).await)
    }

    /// Whether `key` has a live schedule.
    pub fn is_scheduled(&self, key: &JobKey) -> bool {
        self.registry.lookup(key).is_some()
    }

    /// Number of live schedules.
    pub fn scheduled_jobs(&self) -> usize {
        self.registry.len()
    }

    /// Number of deferred runs waiting for a previous run to end.
    pub fn pending_runs(&self) -> usize {
        self.pending.len()
    }

    /// Point-in-time metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.set_pending_runs(self.pending.len() as u64);
        self.metrics.snapshot()
    }

    /// Stop every schedule and every waiter. Nothing is launched on the way out.
    pub async fn shutdown(&self) {
        info!("Shutting down cron job manager {}", self.manager_id);
        self.registry.cancel_all();
        self.pending.shutdown().await;
    }

    fn key_lock(&self, key: &JobKey) -> Arc<Mutex<()>> {
        self.key_locks.entry(key.clone()).or_default().clone()
    }

    fn schedule(&self, job: &JobDefinition) -> CronResult<ScheduleHandle> {
        let key = job.key();
        let expression = job
            .cron_schedule
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CronError::MissingSchedule(key.clone()))?;

        let resolver = self.resolver.clone();
        let trigger_job = job.clone();
        let callback: TriggerCallback = Arc::new(move || {
            let resolver = resolver.clone();
            let job = trigger_job.clone();
            async move {
                let outcome = resolver.resolve(&job).await;
                debug!(job = %job.key(), %outcome, "Cron trigger resolved");
            }
            .boxed()
        });

        self.registry.register(&key, expression, callback)
    }
}

#[async_trait]
impl JobManager for CronJobManager {
    fn unique_manager_id(&self) -> &str {
        &self.manager_id
    }

    async fn start(&self) -> CronResult<()> {
        info!("Loading stored cron jobs for {}", self.manager_id);
        let jobs = self.store.fetch_all(&self.manager_id).await?;

        let mut restored = 0usize;
        for job in jobs {
            match self.schedule(&job) {
                Ok(handle) => {
                    self.registry.record(job.key(), handle);
                    restored += 1;
                }
                Err(e) => {
                    error!(job = %job.key(), "While restoring state, failed to schedule {}: {}", job.key(), e);
                }
            }
        }

        info!("Restored {} cron jobs for {}", restored, self.manager_id);
        Ok(())
    }

    async fn receive_job(&self, job: JobDefinition) -> CronResult<bool> {
        let key = job.key();
        if !job.has_cron_schedule() {
            debug!(job = %key, "Job {} has no cron schedule, not accepting", key);
            return Ok(false);
        }

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let handle = self.schedule(&job)?;

        if let Err(e) = self.store.save(&self.manager_id, &job).await {
            self.registry.discard(&handle);
            warn!(job = %key, "Failed to persist cron job {}: {}", key, e);
            return Err(e);
        }

        self.registry.record(key.clone(), handle);
        info!(job = %key, %handle, "Accepted cron job {}", key);
        Ok(true)
    }

    async fn has_job(&self, key: &JobKey) -> CronResult<bool> {
        Ok(self.store.fetch(&self.manager_id, key).await?.is_some())
    }

    async fn get_jobs(&self) -> CronResult<Vec<JobDefinition>> {
        self.store.fetch_all(&self.manager_id).await
    }

    async fn delete_job(&self, key: &JobKey) -> CronResult<bool> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        if !self.has_job(key).await? {
            return Ok(false);
        }

        if !self.registry.cancel(key) {
            warn!(job = %key, "Cron job {} had no live schedule", key);
        }
        self.pending.abandon(key);
        self.store.remove(&self.manager_id, key).await?;

        info!(job = %key, "Successfully deleted cron job {}", key);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
