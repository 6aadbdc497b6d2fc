//! In-process fakes for the scheduler core and the trigger timer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::{CronError, CronResult};
use crate::job::JobDefinition;
use crate::scheduler_core::SchedulerCore;
use crate::task::{TaskInstance, TaskQuery, TaskState};
use crate::timer::{parse_schedule, ScheduleHandle, TriggerCallback, TriggerTimer};

/// A callback that does nothing.
pub(crate) fn noop_callback() -> TriggerCallback {
    Arc::new(|| async {}.boxed())
}

/// What [`FakeSchedulerCore::kill`] does to matching tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KillBehavior {
    /// Tasks disappear immediately.
    Terminate,
    /// Tasks move to KILLING and stay active until finished explicitly.
    Drain,
    /// The kill request fails.
    Fail,
}

/// Scheduler core double that records every call.
pub(crate) struct FakeSchedulerCore {
    tasks: Mutex<Vec<TaskInstance>>,
    launched: Mutex<Vec<JobDefinition>>,
    kills: Mutex<Vec<(TaskQuery, String)>>,
    kill_behavior: Mutex<KillBehavior>,
    fail_queries: Mutex<u32>,
    fail_launches: Mutex<bool>,
    kill_gate: Mutex<Option<Arc<Semaphore>>>,
    queries: AtomicU64,
    next_task: AtomicU64,
}

impl FakeSchedulerCore {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            launched: Mutex::new(Vec::new()),
            kills: Mutex::new(Vec::new()),
            kill_behavior: Mutex::new(KillBehavior::Terminate),
            fail_queries: Mutex::new(0),
            fail_launches: Mutex::new(false),
            kill_gate: Mutex::new(None),
            queries: AtomicU64::new(0),
            next_task: AtomicU64::new(0),
        }
    }

    /// Add a live task for `owner/job_name`.
    pub(crate) fn add_task(&self, owner: &str, job_name: &str, state: TaskState) {
        let id = self.next_task.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().push(TaskInstance::new(
            format!("task-{}", id),
            owner,
            job_name,
            state,
        ));
    }

    /// Move every task of `owner/job_name` to FINISHED.
    pub(crate) fn finish_all(&self, owner: &str, job_name: &str) {
        for task in self.tasks.lock().iter_mut() {
            if task.owner == owner && task.job_name == job_name {
                task.state = TaskState::Finished;
            }
        }
    }

    pub(crate) fn set_kill_behavior(&self, behavior: KillBehavior) {
        *self.kill_behavior.lock() = behavior;
    }

    /// Fail the next `count` queries.
    pub(crate) fn fail_next_queries(&self, count: u32) {
        *self.fail_queries.lock() = count;
    }

    /// Make every kill wait for a permit of the returned semaphore. Kills are
    /// recorded before they block.
    pub(crate) fn hold_kills(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.kill_gate.lock() = Some(gate.clone());
        gate
    }

    pub(crate) fn set_fail_launches(&self, fail: bool) {
        *self.fail_launches.lock() = fail;
    }

    pub(crate) fn launched(&self) -> Vec<JobDefinition> {
        self.launched.lock().clone()
    }

    pub(crate) fn launch_count(&self) -> usize {
        self.launched.lock().len()
    }

    pub(crate) fn kills(&self) -> Vec<(TaskQuery, String)> {
        self.kills.lock().clone()
    }

    pub(crate) fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulerCore for FakeSchedulerCore {
    async fn launch(&self, job: &JobDefinition) -> CronResult<()> {
        if *self.fail_launches.lock() {
            return Err(CronError::Schedule(format!("launch of {} rejected", job.key())));
        }
        self.launched.lock().push(job.clone());
        Ok(())
    }

    async fn kill(&self, query: &TaskQuery, user: &str) -> CronResult<()> {
        self.kills.lock().push((query.clone(), user.to_string()));

        let gate = self.kill_gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| CronError::Schedule("kill gate closed".to_string()))?;
        }

        match *self.kill_behavior.lock() {
            KillBehavior::Terminate => {
                self.tasks.lock().retain(|task| !query.matches(task));
                Ok(())
            }
            KillBehavior::Drain => {
                for task in self.tasks.lock().iter_mut() {
                    if query.matches(task) {
                        task.state = TaskState::Killing;
                    }
                }
                Ok(())
            }
            KillBehavior::Fail => Err(CronError::Schedule("kill rejected".to_string())),
        }
    }

    async fn query(&self, query: &TaskQuery) -> CronResult<Vec<TaskInstance>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = self.fail_queries.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(CronError::Schedule("query unavailable".to_string()));
            }
        }

        Ok(self
            .tasks
            .lock()
            .iter()
            .filter(|task| query.matches(task))
            .cloned()
            .collect())
    }
}

/// Timer double whose schedules only fire when told to.
pub(crate) struct ManualTimer {
    schedules: Mutex<HashMap<ScheduleHandle, (String, TriggerCallback)>>,
    descheduled: Mutex<HashSet<ScheduleHandle>>,
}

impl ManualTimer {
    pub(crate) fn new() -> Self {
        Self {
            schedules: Mutex::new(HashMap::new()),
            descheduled: Mutex::new(HashSet::new()),
        }
    }

    /// Number of live schedules.
    pub(crate) fn active(&self) -> usize {
        self.schedules.lock().len()
    }

    pub(crate) fn expression(&self, handle: &ScheduleHandle) -> Option<String> {
        self.schedules.lock().get(handle).map(|(expr, _)| expr.clone())
    }

    pub(crate) fn was_descheduled(&self, handle: &ScheduleHandle) -> bool {
        self.descheduled.lock().contains(handle)
    }

    /// Run the callback of `handle` to completion. Returns false if the handle is not live.
    pub(crate) async fn fire(&self, handle: &ScheduleHandle) -> bool {
        let callback = self.schedules.lock().get(handle).map(|(_, cb)| cb.clone());
        match callback {
            Some(callback) => {
                callback().await;
                true
            }
            None => false,
        }
    }
}

impl TriggerTimer for ManualTimer {
    fn validate(&self, expression: &str) -> bool {
        parse_schedule(expression).is_ok()
    }

    fn schedule(&self, expression: &str, callback: TriggerCallback) -> CronResult<ScheduleHandle> {
        parse_schedule(expression)?;
        let handle = ScheduleHandle::new();
        self.schedules
            .lock()
            .insert(handle, (expression.to_string(), callback));
        Ok(handle)
    }

    fn deschedule(&self, handle: &ScheduleHandle) {
        if self.schedules.lock().remove(handle).is_some() {
            self.descheduled.lock().insert(*handle);
        }
    }
}
