use super::*;
use std::time::Duration;

use crate::backoff::BackoffHelper;
use crate::task::TaskState;
use crate::testing::{FakeSchedulerCore, KillBehavior};

struct Fixture {
    core: Arc<FakeSchedulerCore>,
    metrics: Arc<CronMetrics>,
    pending: Arc<PendingRuns>,
    resolver: CollisionResolver,
}

fn fixture() -> Fixture {
    let core = Arc::new(FakeSchedulerCore::new());
    let metrics = Arc::new(CronMetrics::new());
    let backoff = BackoffHelper::new(Duration::from_secs(1), Duration::from_secs(60));
    let pending = Arc::new(PendingRuns::new(core.clone(), backoff, metrics.clone()));
    let resolver = CollisionResolver::new(core.clone(), pending.clone(), metrics.clone(), "cron");
    Fixture {
        core,
        metrics,
        pending,
        resolver,
    }
}

fn job(policy: CollisionPolicy) -> JobDefinition {
    JobDefinition::new("www-data", "report", "*/5 * * * *").with_collision_policy(policy)
}

#[tokio::test]
async fn test_no_active_tasks_launches() {
    let f = fixture();
    let job = job(CollisionPolicy::CancelNew);

    assert_eq!(f.resolver.resolve(&job).await, TriggerOutcome::Launched);
    assert_eq!(f.core.launched(), vec![job]);
    assert!(f.core.kills().is_empty());
    assert_eq!(f.metrics.triggers_fired(), 1);
}

#[tokio::test]
async fn test_cancel_new_skips() {
    let f = fixture();
    f.core.add_task("www-data", "report", TaskState::Running);

    let outcome = f.resolver.resolve(&job(CollisionPolicy::CancelNew)).await;

    assert_eq!(outcome, TriggerOutcome::Skipped);
    assert_eq!(f.core.launch_count(), 0);
    assert!(f.core.kills().is_empty());
    assert_eq!(f.metrics.snapshot().skipped, 1);
}

#[tokio::test]
async fn test_run_overlap_launches_once() {
    let f = fixture();
    f.core.add_task("www-data", "report", TaskState::Running);

    let outcome = f.resolver.resolve(&job(CollisionPolicy::RunOverlap)).await;

    assert_eq!(outcome, TriggerOutcome::Launched);
    assert_eq!(f.core.launch_count(), 1);
    assert!(f.core.kills().is_empty());
}

#[tokio::test]
async fn test_kill_existing_with_immediate_termination() {
    let f = fixture();
    f.core.add_task("www-data", "report", TaskState::Running);
    let job = job(CollisionPolicy::KillExisting);

    let outcome = f.resolver.resolve(&job).await;

    assert_eq!(outcome, TriggerOutcome::KilledAndLaunched);
    let kills = f.core.kills();
    assert_eq!(kills.len(), 1);
    assert_eq!(kills[0].0, TaskQuery::active_for(&job));
    assert_eq!(kills[0].1, "cron");
    assert_eq!(f.core.launch_count(), 1);
    assert!(f.pending.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_kill_existing_defers_until_drained() {
    let f = fixture();
    f.core.set_kill_behavior(KillBehavior::Drain);
    f.core.add_task("www-data", "report", TaskState::Running);
    let job = job(CollisionPolicy::KillExisting);

    let outcome = f.resolver.resolve(&job).await;

    assert_eq!(outcome, TriggerOutcome::Deferred { waiter_spawned: true });
    assert_eq!(f.core.launch_count(), 0);
    assert!(f.pending.contains(&job.key()));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(f.core.launch_count(), 0);

    f.core.finish_all("www-data", "report");
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(f.core.launched(), vec![job]);
    assert!(f.pending.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_trigger_joins_pending_run() {
    let f = fixture();
    f.core.set_kill_behavior(KillBehavior::Drain);
    f.core.add_task("www-data", "report", TaskState::Running);
    let job = job(CollisionPolicy::KillExisting);

    let first = f.resolver.resolve(&job).await;
    let second = f.resolver.resolve(&job).await;

    assert_eq!(first, TriggerOutcome::Deferred { waiter_spawned: true });
    assert_eq!(second, TriggerOutcome::Deferred { waiter_spawned: false });
    assert_eq!(f.core.kills().len(), 2);
    assert_eq!(f.metrics.snapshot().waiters_spawned, 1);

    f.core.finish_all("www-data", "report");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(f.core.launch_count(), 1);
}

#[tokio::test]
async fn test_unset_policy_kills_existing() {
    let f = fixture();
    f.core.add_task("www-data", "report", TaskState::Starting);
    let job = JobDefinition::new("www-data", "report", "*/5 * * * *");

    assert_eq!(f.resolver.resolve(&job).await, TriggerOutcome::KilledAndLaunched);
    assert_eq!(f.core.kills().len(), 1);
}

#[tokio::test]
async fn test_unrecognized_policy_falls_back_to_kill_existing() {
    let f = fixture();
    f.core.add_task("www-data", "report", TaskState::Running);

    let outcome = f.resolver.resolve(&job(CollisionPolicy::Unrecognized)).await;

    assert_eq!(outcome, TriggerOutcome::KilledAndLaunched);
    assert_eq!(f.core.kills().len(), 1);
}

#[tokio::test]
async fn test_inactive_tasks_do_not_collide() {
    let f = fixture();
    f.core.add_task("www-data", "report", TaskState::Finished);
    f.core.add_task("www-data", "report", TaskState::Failed);

    let outcome = f.resolver.resolve(&job(CollisionPolicy::CancelNew)).await;
    assert_eq!(outcome, TriggerOutcome::Launched);
}

#[tokio::test]
async fn test_failed_kill_abandons_trigger() {
    let f = fixture();
    f.core.set_kill_behavior(KillBehavior::Fail);
    f.core.add_task("www-data", "report", TaskState::Running);

    let outcome = f.resolver.resolve(&job(CollisionPolicy::KillExisting)).await;

    assert_eq!(outcome, TriggerOutcome::Abandoned);
    assert_eq!(f.core.launch_count(), 0);
    assert!(f.pending.is_empty());
    assert_eq!(f.metrics.snapshot().abandoned, 1);
}

#[tokio::test]
async fn test_failed_query_abandons_trigger() {
    let f = fixture();
    f.core.fail_next_queries(1);

    let outcome = f.resolver.resolve(&job(CollisionPolicy::KillExisting)).await;

    assert_eq!(outcome, TriggerOutcome::Abandoned);
    assert_eq!(f.core.launch_count(), 0);
}

#[tokio::test]
async fn test_failed_launch_abandons_trigger() {
    let f = fixture();
    f.core.set_fail_launches(true);

    let outcome = f.resolver.resolve(&job(CollisionPolicy::KillExisting)).await;

    assert_eq!(outcome, TriggerOutcome::Abandoned);
    assert_eq!(f.metrics.snapshot().launches, 0);
}

#[test]
fn test_outcome_display() {
    assert_eq!(TriggerOutcome::Launched.to_string(), "launched");
    assert_eq!(
        TriggerOutcome::Deferred { waiter_spawned: false }.to_string(),
        "deferred (joined pending run)"
    );
}
