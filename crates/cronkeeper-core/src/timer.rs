//! Cron trigger timer.
//!
//! [`TriggerTimer`] is the seam between the job manager and whatever fires
//! callbacks at cron instants. [`CronTimer`] is the tokio implementation:
//! one background task per schedule handle that sleeps until the next
//! matching instant and then spawns the callback.
//!
//! # Expression format
//!
//! Standard 5-field expressions (`minute hour day_of_month month day_of_week`)
//! are accepted and fire at second 0. The 6/7-field format of the `cron`
//! crate (leading seconds, optional trailing year) is passed through as is.
//!
//! - `"0 0 * * *"` - every day at midnight
//! - `"*/5 * * * *"` - every 5 minutes
//! - `"*/10 * * * * *"` - every 10 seconds

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CronError, CronResult};

/// Callback invoked at every matching instant.
pub type TriggerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Opaque token identifying one registration with a [`TriggerTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(Uuid);

impl ScheduleHandle {
    /// Create a new, unique handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScheduleHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sched_{}", self.0)
    }
}

/// Fires callbacks on a cron schedule.
pub trait TriggerTimer: Send + Sync {
    /// Check an expression's syntax without scheduling anything.
    fn validate(&self, expression: &str) -> bool;

    /// Invoke `callback` at every instant matching `expression`, until descheduled.
    fn schedule(&self, expression: &str, callback: TriggerCallback) -> CronResult<ScheduleHandle>;

    /// Stop invoking the callback registered under `handle`. Unknown handles are ignored.
    fn deschedule(&self, handle: &ScheduleHandle);
}

/// Parse a cron expression, accepting both 5-field and 6/7-field forms.
pub fn parse_schedule(expression: &str) -> CronResult<Schedule> {
    let trimmed = expression.trim();
    let normalized = match trimmed.split_whitespace().count() {
        5 => format!("0 {}", trimmed),
        6 | 7 => trimmed.to_string(),
        n => {
            return Err(CronError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!("expected 5 to 7 fields, got {}", n),
            });
        }
    };

    Schedule::from_str(&normalized).map_err(|e| CronError::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// The next `count` instants matching `expression`, starting now.
pub fn next_fire_times(expression: &str, count: usize) -> CronResult<Vec<DateTime<Utc>>> {
    let schedule = parse_schedule(expression)?;
    Ok(schedule.upcoming(Utc).take(count).collect())
}

/// Tokio-driven [`TriggerTimer`] built on the `cron` crate.
pub struct CronTimer {
    schedules: Mutex<HashMap<ScheduleHandle, CancellationToken>>,
    shutdown: CancellationToken,
    fire_count: Arc<AtomicU64>,
}

impl CronTimer {
    /// Create a new timer.
    pub fn new() -> Self {
        Self {
            schedules: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            fire_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of live schedules.
    pub fn active_schedules(&self) -> usize {
        self.schedules.lock().len()
    }

    /// Total callbacks fired across all schedules.
    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Relaxed)
    }

    /// Stop every schedule. Later calls to [`schedule`](TriggerTimer::schedule)
    /// still succeed but never fire.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.schedules.lock().clear();
        debug!("CronTimer shut down");
    }

    async fn drive(
        handle: ScheduleHandle,
        schedule: Schedule,
        callback: TriggerCallback,
        token: CancellationToken,
        fire_count: Arc<AtomicU64>,
    ) {
        let mut last = Utc::now();

        loop {
            // Instants missed while the process was busy are skipped, not replayed.
            let from = last.max(Utc::now());
            let Some(next) = schedule.after(&from).next() else {
                debug!("Schedule {} has no upcoming instant", handle);
                break;
            };

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            last = next;
            fire_count.fetch_add(1, Ordering::Relaxed);
            debug!("Schedule {} fired for {}", handle, next.to_rfc3339());
            tokio::spawn(callback());
        }
    }
}

impl Default for CronTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerTimer for CronTimer {
    fn validate(&self, expression: &str) -> bool {
        parse_schedule(expression).is_ok()
    }

    fn schedule(&self, expression: &str, callback: TriggerCallback) -> CronResult<ScheduleHandle> {
        let schedule = parse_schedule(expression)?;
        let handle = ScheduleHandle::new();
        let token = self.shutdown.child_token();

        self.schedules.lock().insert(handle, token.clone());
        tokio::spawn(Self::drive(
            handle,
            schedule,
            callback,
            token,
            self.fire_count.clone(),
        ));

        debug!("Scheduled {} for '{}'", handle, expression);
        Ok(handle)
    }

    fn deschedule(&self, handle: &ScheduleHandle) {
        match self.schedules.lock().remove(handle) {
            Some(token) => {
                token.cancel();
                debug!("Descheduled {}", handle);
            }
            None => warn!("Deschedule requested for unknown handle {}", handle),
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
