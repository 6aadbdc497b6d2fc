//! Cron manager metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cron manager metrics.
#[derive(Debug, Default)]
pub struct CronMetrics {
    /// Total triggers fired (timer firings and manual triggers).
    pub triggers_fired: AtomicU64,

    /// Total launches submitted to the scheduler core.
    pub launches: AtomicU64,

    /// Launches that happened after waiting for a previous run.
    pub deferred_launches: AtomicU64,

    /// Kill requests issued because of the collision policy.
    pub kills: AtomicU64,

    /// Triggers skipped by the collision policy.
    pub skipped: AtomicU64,

    /// Background waiters spawned.
    pub waiters_spawned: AtomicU64,

    /// Triggers absorbed by an already outstanding waiter.
    pub runs_absorbed: AtomicU64,

    /// Triggers abandoned because of an operational failure.
    pub abandoned: AtomicU64,

    /// Current number of pending runs.
    pub pending_runs: AtomicU64,
}

impl CronMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger.
    pub fn record_trigger(&self) {
        self.triggers_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a launch.
    pub fn record_launch(&self, deferred: bool) {
        self.launches.fetch_add(1, Ordering::Relaxed);
        if deferred {
            self.deferred_launches.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a kill request.
    pub fn record_kill(&self) {
        self.kills.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped trigger.
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a spawned waiter.
    pub fn record_waiter_spawned(&self) {
        self.waiters_spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a trigger absorbed by an outstanding waiter.
    pub fn record_absorbed(&self) {
        self.runs_absorbed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abandoned trigger.
    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the pending run gauge.
    pub fn set_pending_runs(&self, count: u64) {
        self.pending_runs.store(count, Ordering::Relaxed);
    }

    /// Total triggers fired so far.
    pub fn triggers_fired(&self) -> u64 {
        self.triggers_fired.load(Ordering::Relaxed)
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            launches: self.launches.load(Ordering::Relaxed),
            deferred_launches: self.deferred_launches.load(Ordering::Relaxed),
            kills: self.kills.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            waiters_spawned: self.waiters_spawned.load(Ordering::Relaxed),
            runs_absorbed: self.runs_absorbed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            pending_runs: self.pending_runs.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub triggers_fired: u64,
    pub launches: u64,
    pub deferred_launches: u64,
    pub kills: u64,
    pub skipped: u64,
    pub waiters_spawned: u64,
    pub runs_absorbed: u64,
    pub abandoned: u64,
    pub pending_runs: u64,
}
