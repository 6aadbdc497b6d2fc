//! Interface to the cluster scheduler core.

use async_trait::async_trait;

use crate::error::CronResult;
use crate::job::JobDefinition;
use crate::task::{TaskInstance, TaskQuery};

/// The cluster scheduler core: launches jobs, kills and queries tasks.
///
/// Owned outside this crate. The cron manager only ever talks to it through
/// this trait.
#[async_trait]
pub trait SchedulerCore: Send + Sync {
    /// Submit a job for immediate launch.
    async fn launch(&self, job: &JobDefinition) -> CronResult<()>;

    /// Kill every task matching the query on behalf of `user`.
    ///
    /// Fails with [`CronError::Schedule`](crate::CronError::Schedule) when the
    /// kill request could not be carried out.
    async fn kill(&self, query: &TaskQuery, user: &str) -> CronResult<()>;

    /// Return the live tasks matching the query.
    async fn query(&self, query: &TaskQuery) -> CronResult<Vec<TaskInstance>>;

    /// Whether any task matches the query.
    async fn has_tasks(&self, query: &TaskQuery) -> CronResult<bool> {
        Ok(!self.query(query).await?.is_empty())
    }
}
