//! 그룹 스케줄러 — 자식 엔티티의 순차/병렬 실행과 상태 집계
//!
//! 자식은 웨이브(wave)로 나뉩니다. `parallel` 표시가 연속된 자식들은 하나의
//! 병렬 웨이브가 되어 자식마다 태스크 하나로 실행되고 [`LivenessMonitor`]가
//! 감시합니다. 나머지 자식은 호출자 흐름에서 하나씩 순차 실행됩니다.
//!
//! # 그룹 상태 집계 우선순위
//! 1. 자식 중 `ConfigError`, `Fail`, `Killed`, `Incomplete`가 있으면 `Fail`
//! 2. 자식 중 `NotRun`이 있으면 `Incomplete`
//! 3. 자식 중 `Running`이 있으면 `Incomplete`
//! 4. 그 외 `Pass`

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use rigcheck_core::error::PhaseError;
use rigcheck_core::metrics as m;
use rigcheck_core::status::TestStatus;

use crate::entity::{GroupSpec, TestEntity};
use crate::env::RunEnv;
use crate::monitor::{LivenessMonitor, MonitorOutcome, MonitoredTask};
use crate::phase::{ExecContext, PhaseRunner};
use crate::registry::{RunRegistry, TaskEntry};
use crate::task::{CancellableTask, TaskContext};

/// 자식 상태로부터 그룹 상태를 계산합니다.
///
/// 자식 상태의 순수 함수입니다. 자식이 없으면 `Pass`입니다.
pub fn aggregate_status<I>(children: I) -> TestStatus
where
    I: IntoIterator<Item = TestStatus>,
{
    let mut saw_not_run = false;
    let mut saw_running = false;
    for status in children {
        match status {
            TestStatus::ConfigError
            | TestStatus::Fail
            | TestStatus::Killed
            | TestStatus::Incomplete => return TestStatus::Fail,
            TestStatus::NotRun => saw_not_run = true,
            TestStatus::Running => saw_running = true,
            TestStatus::Pass | TestStatus::Configured | TestStatus::DeConfigured => {}
        }
    }
    if saw_not_run || saw_running {
        TestStatus::Incomplete
    } else {
        TestStatus::Pass
    }
}

// ─── 웨이브 ──────────────────────────────────────────────────────────

/// 스케줄링 단위
#[derive(Debug)]
pub enum Wave<'a> {
    /// 호출자 흐름에서 직접 실행
    Sequential(&'a Arc<TestEntity>),
    /// 자식마다 태스크 하나로 동시 실행
    Parallel(Vec<&'a Arc<TestEntity>>),
}

/// 자식을 웨이브로 나눕니다.
///
/// `parallel_enabled`가 `false`이면 모든 자식이 순차 웨이브가 됩니다.
pub fn plan_waves(children: &[Arc<TestEntity>], parallel_enabled: bool) -> Vec<Wave<'_>> {
    let mut waves = Vec::new();
    let mut batch: Vec<&Arc<TestEntity>> = Vec::new();
    for child in children {
        if parallel_enabled && child.is_parallel() {
            batch.push(child);
            continue;
        }
        if !batch.is_empty() {
            waves.push(Wave::Parallel(std::mem::take(&mut batch)));
        }
        waves.push(Wave::Sequential(child));
    }
    if !batch.is_empty() {
        waves.push(Wave::Parallel(batch));
    }
    waves
}

// ─── 스케줄러 ────────────────────────────────────────────────────────

/// 스케줄링 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// 병렬 웨이브에서 연쇄 종료가 발생했는지 여부
    pub cascaded: bool,
    /// stop-on-error로 남은 웨이브를 건너뛰게 만든 엔티티
    pub halted_by: Option<String>,
}

/// 한 레벨(루트 또는 그룹)의 자식 스케줄러
pub struct GroupScheduler<'a> {
    children: &'a [Arc<TestEntity>],
    registry: &'a Arc<RunRegistry>,
    env: &'a RunEnv,
}

impl<'a> GroupScheduler<'a> {
    /// 스케줄러를 생성합니다.
    pub fn new(
        children: &'a [Arc<TestEntity>],
        registry: &'a Arc<RunRegistry>,
        env: &'a RunEnv,
    ) -> Self {
        Self {
            children,
            registry,
            env,
        }
    }

    /// 모든 웨이브를 실행합니다.
    ///
    /// `parent`가 취소되면 남은 웨이브를 시작하지 않습니다.
    pub async fn run(&self, parent: &TaskContext) -> ScheduleOutcome {
        let level = self.registry.level();
        for child in self.children {
            self.registry.track(child.name());
        }

        let mut outcome = ScheduleOutcome::default();
        for wave in plan_waves(self.children, self.env.options.parallel) {
            if parent.is_cancelled() {
                info!(level, "scheduler cancelled, remaining waves skipped");
                break;
            }
            match wave {
                Wave::Sequential(child) => {
                    let exec = ExecContext::serial(parent.clone(), Some(Arc::clone(self.registry)));
                    if let Err(e) = child.run_phases(self.env, &exec).await {
                        debug!(level, entity = child.name(), error = %e, "entity ended with hook abort");
                    }
                    if self.env.options.stop_on_error && child.status().triggers_stop_on_error() {
                        warn!(
                            level,
                            entity = child.name(),
                            status = %child.status(),
                            "stop-on-error: remaining entities skipped"
                        );
                        outcome.halted_by = Some(child.name().to_owned());
                        break;
                    }
                }
                Wave::Parallel(batch) => {
                    let mut tasks = self.spawn_wave(parent, &batch);
                    let monitor = LivenessMonitor::new(self.registry, self.env, tasks.len());
                    if let MonitorOutcome::Cascaded { trigger } = monitor.watch(&mut tasks).await {
                        outcome.cascaded = true;
                        outcome.halted_by = Some(trigger);
                        break;
                    }
                }
            }
        }
        outcome
    }

    fn spawn_wave(&self, parent: &TaskContext, batch: &[&Arc<TestEntity>]) -> Vec<MonitoredTask> {
        let mut tasks = Vec::with_capacity(batch.len());
        for child in batch {
            let entity = Arc::clone(child);
            let env = self.env.clone();
            let registry = Arc::clone(self.registry);
            let mut task = CancellableTask::with_parent(parent, child.name(), move |ctx| async move {
                let exec = ExecContext::parallel(ctx, Some(registry));
                entity.run_phases(&env, &exec).await
            });

            let log_file = self
                .env
                .logs
                .log_file_name(task.id(), child.kind_tag(), child.name());
            self.registry.register_task(TaskEntry {
                task_id: task.id(),
                name: child.name().to_owned(),
                entity: Arc::clone(child),
                log_file,
                handle: task.handle(),
            });

            // start 실패는 두 번째 호출일 때뿐
            if let Err(e) = task.start() {
                warn!(entity = child.name(), error = %e, "task start rejected");
            }
            tasks.push(MonitoredTask {
                task,
                entity: Arc::clone(child),
            });
        }
        metrics::gauge!(m::TASKS_RUNNING).increment(tasks.len() as f64);
        tasks
    }
}

/// 그룹 엔티티를 실행합니다.
///
/// 자식을 스케줄링한 뒤 자식 상태를 집계해 그룹 상태로 기록합니다.
pub(crate) async fn run_group(
    entity: &TestEntity,
    group: &GroupSpec,
    env: &RunEnv,
    exec: &ExecContext,
) -> Result<TestStatus, PhaseError> {
    let runner = PhaseRunner::new(env, exec);
    let started = runner.begin(entity, "group");

    let outcome = GroupScheduler::new(group.children(), group.registry(), env)
        .run(exec.task())
        .await;

    let status = aggregate_status(group.children().iter().map(|child| child.status()));
    if let Err(e) = entity.record_outcome(status) {
        warn!(entity = entity.name(), error = %e, "group status not recorded");
    }
    if status == TestStatus::Fail {
        if let Some(reason) = failing_child(group) {
            entity.set_failure_reason(reason);
        }
    }
    if outcome.cascaded {
        env.flush_ledger();
    }

    runner.finish(entity, started);
    Ok(entity.status())
}

fn failing_child(group: &GroupSpec) -> Option<String> {
    group
        .children()
        .iter()
        .find(|child| {
            matches!(
                child.status(),
                TestStatus::ConfigError | TestStatus::Fail | TestStatus::Killed | TestStatus::Incomplete
            )
        })
        .map(|child| format!("Child: {}; Status: {}", child.name(), child.status()))
}

/// 레지스트리의 살아 있는 태스크를 모두 종료하고 종료한 수를 반환합니다.
///
/// 각 태스크마다 스냅샷을 `Killed`로 덮어쓰고, 중첩 그룹이면 그 안의
/// 태스크를 먼저 종료한 뒤 바깥 태스크를 종료합니다.
pub(crate) async fn kill_all_alive(registry: &RunRegistry, grace: Duration) -> usize {
    let alive = registry.alive_tasks();
    for entry in &alive {
        let state = entry.entity.state();
        registry.update_snapshot(
            &entry.name,
            TestStatus::Killed,
            state.start_time,
            Some(Utc::now()),
        );
        if entry.entity.is_group() {
            entry.entity.kill_all_alive_test_cases(grace).await;
        }
        entry.entity.force_kill();
        match entry.handle.kill(grace).await {
            Ok(outcome) => {
                metrics::counter!(m::TASKS_KILLED_TOTAL, m::LABEL_OUTCOME => outcome.as_str())
                    .increment(1);
                info!(
                    level = registry.level(),
                    entity = %entry.name,
                    task_id = %entry.task_id,
                    outcome = %outcome,
                    "task killed"
                );
            }
            Err(e) => warn!(entity = %entry.name, error = %e, "kill rejected"),
        }
        entry.entity.mark_running_descendants_killed();
    }
    alive.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::entity::TestCase;
    use crate::env::RunOptions;

    struct Noop;

    impl TestCase for Noop {
        async fn procedure(&self, _ctx: &TaskContext) -> Result<(), PhaseError> {
            Ok(())
        }
    }

    struct Boom;

    impl TestCase for Boom {
        async fn procedure(&self, _ctx: &TaskContext) -> Result<(), PhaseError> {
            Err(PhaseError::failure("boom"))
        }
    }

    fn entities(flags: &[bool]) -> Vec<Arc<TestEntity>> {
        flags
            .iter()
            .enumerate()
            .map(|(i, &p)| Arc::new(TestEntity::case(format!("e{i}"), Noop).parallel(p)))
            .collect()
    }

    fn shape(waves: &[Wave<'_>]) -> Vec<usize> {
        waves
            .iter()
            .map(|w| match w {
                Wave::Sequential(_) => 0,
                Wave::Parallel(batch) => batch.len(),
            })
            .collect()
    }

    // --- 집계 ---

    #[test]
    fn empty_group_passes() {
        assert_eq!(aggregate_status(std::iter::empty()), TestStatus::Pass);
    }

    #[test]
    fn failure_beats_not_run() {
        assert_eq!(
            aggregate_status([TestStatus::NotRun, TestStatus::Killed]),
            TestStatus::Fail
        );
    }

    #[test]
    fn incomplete_child_fails_group() {
        assert_eq!(
            aggregate_status([TestStatus::Pass, TestStatus::Incomplete]),
            TestStatus::Fail
        );
    }

    #[test]
    fn running_child_is_incomplete() {
        assert_eq!(
            aggregate_status([TestStatus::Pass, TestStatus::Running]),
            TestStatus::Incomplete
        );
    }

    #[test]
    fn configured_children_pass() {
        assert_eq!(
            aggregate_status([TestStatus::Configured, TestStatus::DeConfigured, TestStatus::Pass]),
            TestStatus::Pass
        );
    }

    // --- 웨이브 ---

    #[test]
    fn consecutive_parallel_children_share_a_wave() {
        let children = entities(&[false, true, true, false, true]);
        assert_eq!(shape(&plan_waves(&children, true)), [0, 2, 0, 1]);
    }

    #[test]
    fn disabled_parallelism_makes_every_wave_sequential() {
        let children = entities(&[true, true, false]);
        assert_eq!(shape(&plan_waves(&children, false)), [0, 0, 0]);
    }

    // --- 그룹 실행 ---

    #[tokio::test]
    async fn serial_group_without_stop_on_error_runs_every_child() {
        let group = TestEntity::group(
            "g",
            vec![
                TestEntity::case("a", Noop),
                TestEntity::case("b", Boom),
                TestEntity::case("c", Noop),
            ],
        );
        let env = RunEnv::new(RunOptions::default());
        let exec = ExecContext::serial(TaskContext::detached("root"), None);

        let status = group.run_phases(&env, &exec).await.unwrap();

        assert_eq!(status, TestStatus::Fail);
        let statuses: Vec<_> = group.children().iter().map(|c| c.status()).collect();
        assert_eq!(statuses, [TestStatus::Pass, TestStatus::Fail, TestStatus::Pass]);
        assert_eq!(group.counters().errors(), 1);
        assert_eq!(group.failure_reason().unwrap(), "Child: b; Status: Fail");
    }

    #[tokio::test]
    async fn serial_stop_on_error_leaves_rest_not_run() {
        let group = TestEntity::group(
            "g",
            vec![TestEntity::case("a", Boom), TestEntity::case("b", Noop)],
        );
        let env = RunEnv::new(RunOptions {
            stop_on_error: true,
            ..RunOptions::default()
        });
        let exec = ExecContext::serial(TaskContext::detached("root"), None);

        group.run_phases(&env, &exec).await.unwrap();

        assert_eq!(group.children()[1].status(), TestStatus::NotRun);
        assert_eq!(group.status(), TestStatus::Fail);
    }

    #[tokio::test]
    async fn group_snapshots_track_every_child() {
        let group = TestEntity::group(
            "g",
            vec![TestEntity::case("a", Noop), TestEntity::case("b", Noop)],
        );
        let env = RunEnv::new(RunOptions::default());
        let exec = ExecContext::serial(TaskContext::detached("root"), None);

        group.run_phases(&env, &exec).await.unwrap();

        let crate::entity::EntityKind::Group(spec) = group.kind() else {
            unreachable!()
        };
        let snaps = spec.registry().snapshots();
        assert_eq!(snaps.len(), 2);
        assert!(snaps.iter().all(|s| s.status == TestStatus::Pass));
    }
}
