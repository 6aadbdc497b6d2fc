//! Live task state as reported by the scheduler core.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::job::{JobDefinition, JobKey};

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Assigned,
    Starting,
    Running,
    Killing,
    Restarting,
    Updating,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    /// States counted as "still running or about to run".
    pub const ACTIVE: [TaskState; 7] = [
        TaskState::Pending,
        TaskState::Assigned,
        TaskState::Starting,
        TaskState::Running,
        TaskState::Killing,
        TaskState::Restarting,
        TaskState::Updating,
    ];

    /// Whether this state is one of the active states.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Assigned => "assigned",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Killing => "killing",
            TaskState::Restarting => "restarting",
            TaskState::Updating => "updating",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        };
        write!(f, "{s}")
    }
}

/// A predicate over the live task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    /// Owning role.
    pub owner: String,
    /// Job name.
    pub job_name: String,
    /// Matching states; empty matches every state.
    pub statuses: BTreeSet<TaskState>,
}

impl TaskQuery {
    /// Query for the active instances of a job.
    pub fn active_for(job: &JobDefinition) -> Self {
        Self {
            owner: job.role.clone(),
            job_name: job.name.clone(),
            statuses: TaskState::ACTIVE.into_iter().collect(),
        }
    }

    /// The job key this query targets.
    pub fn job_key(&self) -> JobKey {
        JobKey::new(self.owner.clone(), self.job_name.clone())
    }

    /// Whether a task satisfies this query.
    pub fn matches(&self, task: &TaskInstance) -> bool {
        task.owner == self.owner
            && task.job_name == self.job_name
            && (self.statuses.is_empty() || self.statuses.contains(&task.state))
    }
}

/// One live task instance of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub task_id: String,
    pub owner: String,
    pub job_name: String,
    pub state: TaskState,
}

impl TaskInstance {
    /// Create a task instance.
    pub fn new(
        task_id: impl Into<String>,
        owner: impl Into<String>,
        job_name: impl Into<String>,
        state: TaskState,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            owner: owner.into(),
            job_name: job_name.into(),
            state,
        }
    }
}
