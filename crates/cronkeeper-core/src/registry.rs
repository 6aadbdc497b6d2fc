//! Job key to schedule handle mapping.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{CronError, CronResult};
use crate::job::JobKey;
use crate::timer::{ScheduleHandle, TriggerCallback, TriggerTimer};

/// Tracks which schedule handle belongs to which job.
///
/// A key is present exactly while its job is registered with the timer.
/// Only the latest handle per key is kept; recording a new handle
/// deschedules the one it displaces.
pub struct TriggerRegistry {
    timer: Arc<dyn TriggerTimer>,
    handles: DashMap<JobKey, ScheduleHandle>,
}

impl TriggerRegistry {
    /// Create a registry on top of a timer.
    pub fn new(timer: Arc<dyn TriggerTimer>) -> Self {
        Self {
            timer,
            handles: DashMap::new(),
        }
    }

    /// Check an expression's syntax.
    pub fn validate(&self, expression: &str) -> bool {
        self.timer.validate(expression)
    }

    /// Schedule `callback` for `expression` with the timer.
    ///
    /// The returned handle is not recorded yet; see [`record`](Self::record).
    pub fn register(
        &self,
        key: &JobKey,
        expression: &str,
        callback: TriggerCallback,
    ) -> CronResult<ScheduleHandle> {
        if !self.timer.validate(expression) {
            return Err(CronError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!("malformed recurrence expression for {}", key),
            });
        }

        let handle = self.timer.schedule(expression, callback)?;
        info!(job = %key, %handle, "Scheduling cron job {}: {}", key, expression);
        Ok(handle)
    }

    /// Record `handle` as the live schedule of `key`.
    pub fn record(&self, key: JobKey, handle: ScheduleHandle) {
        if let Some(previous) = self.handles.insert(key.clone(), handle) {
            if previous != handle {
                self.timer.deschedule(&previous);
                debug!(job = %key, %previous, "Replaced schedule handle");
            }
        }
    }

    /// Deschedule a handle that was registered but never recorded.
    pub fn discard(&self, handle: &ScheduleHandle) {
        self.timer.deschedule(handle);
    }

    /// The live handle of `key`, if any.
    pub fn lookup(&self, key: &JobKey) -> Option<ScheduleHandle> {
        self.handles.get(key).map(|h| *h)
    }

    /// Remove and deschedule the handle of `key`. Returns whether one existed.
    pub fn cancel(&self, key: &JobKey) -> bool {
        match self.handles.remove(key) {
            Some((_, handle)) => {
                self.timer.deschedule(&handle);
                debug!(job = %key, %handle, "Cancelled schedule");
                true
            }
            None => false,
        }
    }

    /// Cancel every schedule.
    pub fn cancel_all(&self) {
        let keys: Vec<JobKey> = self.handles.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    /// Number of scheduled jobs.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no job is scheduled.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
