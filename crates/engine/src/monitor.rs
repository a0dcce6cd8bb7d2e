//! 생존 감시 — 병렬 웨이브의 태스크 종료 감지와 stop-on-error 연쇄 종료
//!
//! 이벤트 기반이 아니라 고정 주기 폴링입니다. 태스크가 실제로 끝난 뒤
//! 감지되기까지 최대 폴링 간격만큼 지연이 있습니다.
//!
//! # 루프
//! ```text
//! loop {
//!     scan (역순) ──> 끝난 태스크 제거
//!                 ──> Running 그대로 : Fail로 마무리 (본문 밖 패닉, abort)
//!                 ──> NotRun + 에러  : 의존성 경고
//!                 ──> Fail/ConfigError + stop_on_error : cascade 후 종료
//!     스냅샷 주기 경과 시 타임라인 스냅샷
//!     sleep(poll_interval)
//! }
//! 모든 태스크 join ──> 요약 로그
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use rigcheck_core::ledger::{FIELD_END, FIELD_REASON, FIELD_STAGE, FIELD_STATUS, LedgerStage};
use rigcheck_core::metrics as m;
use rigcheck_core::status::TestStatus;

use crate::entity::TestEntity;
use crate::env::RunEnv;
use crate::phase::fields;
use crate::registry::RunRegistry;
use crate::task::CancellableTask;

/// 감시 대상 태스크와 그 엔티티
pub struct MonitoredTask {
    /// 엔티티를 실행하는 태스크
    pub task: CancellableTask<TestStatus>,
    /// 실행 중인 엔티티
    pub entity: Arc<TestEntity>,
}

/// 감시 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// 모든 태스크가 스스로 종료됨
    Completed,
    /// stop-on-error 연쇄 종료가 발생함
    Cascaded {
        /// 연쇄 종료를 유발한 엔티티
        trigger: String,
    },
}

/// 한 번의 스캔 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// 아직 실행 중인 태스크가 있음
    Continue,
    /// 실행 중인 태스크가 없음
    Drained,
    /// 인덱스의 태스크가 연쇄 종료를 유발함
    Cascade {
        /// 유발한 태스크 인덱스
        index: usize,
    },
}

/// 스케줄러 레벨 하나의 생존 감시자
pub struct LivenessMonitor<'a> {
    registry: &'a RunRegistry,
    env: &'a RunEnv,
    running: Vec<usize>,
    last_snapshot: Instant,
}

impl<'a> LivenessMonitor<'a> {
    /// `task_count`개의 태스크를 감시하는 감시자를 생성합니다.
    pub fn new(registry: &'a RunRegistry, env: &'a RunEnv, task_count: usize) -> Self {
        Self {
            registry,
            env,
            running: (0..task_count).collect(),
            last_snapshot: Instant::now(),
        }
    }

    /// 아직 실행 중으로 간주되는 태스크 수
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// 실행 중 집합을 역순으로 훑어 끝난 태스크를 제거합니다.
    ///
    /// 실행 중인 태스크가 없으면 아무것도 하지 않고 [`ScanStep::Drained`]를 반환합니다.
    pub fn scan(&mut self, tasks: &[MonitoredTask]) -> ScanStep {
        if self.running.is_empty() {
            return ScanStep::Drained;
        }

        let level = self.registry.level();
        let mut trigger = None;
        for pos in (0..self.running.len()).rev() {
            let index = self.running[pos];
            let Some(monitored) = tasks.get(index) else {
                self.running.remove(pos);
                continue;
            };
            if monitored.task.is_alive() {
                continue;
            }
            self.running.remove(pos);
            metrics::gauge!(m::TASKS_RUNNING).decrement(1.0);

            let error = monitored.task.error().unwrap_or_default();
            let mut status = monitored.entity.status();
            if status == TestStatus::Running {
                status = self.settle_unfinished(monitored, &error);
            }
            debug!(level, entity = monitored.entity.name(), status = %status, "task finished");

            if status == TestStatus::NotRun && !error.is_empty() {
                warn!(
                    level,
                    entity = monitored.entity.name(),
                    error = %error,
                    "entity did not run, likely a dependency or infrastructure failure"
                );
            }
            if self.env.options.stop_on_error
                && status.triggers_stop_on_error()
                && trigger.is_none()
            {
                trigger = Some(index);
            }
        }

        match trigger {
            Some(index) => ScanStep::Cascade { index },
            None if self.running.is_empty() => ScanStep::Drained,
            None => ScanStep::Continue,
        }
    }

    /// 상태를 남기지 못하고 끝난 태스크의 엔티티를 `Fail`로 마무리합니다.
    fn settle_unfinished(&self, monitored: &MonitoredTask, error: &str) -> TestStatus {
        let entity = &monitored.entity;
        let reason = if error.is_empty() {
            "task ended without a result"
        } else {
            error
        };
        if let Err(e) = entity.record_outcome(TestStatus::Fail) {
            warn!(entity = entity.name(), error = %e, "status not recorded");
        }
        entity.counters().add_error();
        entity.set_failure_reason(format!("Test Stage: task; Status: Failed; Reason: {reason}"));

        let end = Utc::now();
        let duration = entity
            .state()
            .start_time
            .and_then(|start| (end - start).to_std().ok())
            .unwrap_or_default();
        entity.mark_finished(end, duration);
        self.registry.sync_snapshot(entity);

        let status = entity.status();
        self.env.persist(
            entity,
            fields([
                (FIELD_STATUS, status.as_str().into()),
                (FIELD_STAGE, LedgerStage::Done.as_str().into()),
                (FIELD_END, end.to_rfc3339().into()),
                (FIELD_REASON, reason.into()),
            ]),
        );
        warn!(
            level = self.registry.level(),
            entity = entity.name(),
            reason,
            "task ended while its entity was still running"
        );
        status
    }

    /// 모든 태스크가 끝날 때까지 감시합니다.
    ///
    /// 반환 시점에는 모든 태스크가 join되어 있습니다.
    pub async fn watch(mut self, tasks: &mut [MonitoredTask]) -> MonitorOutcome {
        let mut outcome = MonitorOutcome::Completed;
        loop {
            match self.scan(tasks) {
                ScanStep::Drained => break,
                ScanStep::Cascade { index } => {
                    let trigger = tasks[index].entity.name().to_owned();
                    self.cascade(tasks, &trigger).await;
                    outcome = MonitorOutcome::Cascaded { trigger };
                    break;
                }
                ScanStep::Continue => {}
            }
            self.maybe_snapshot();
            tokio::time::sleep(self.env.options.poll_interval).await;
        }

        for monitored in tasks.iter_mut() {
            if let Err(e) = monitored.task.join(None).await {
                warn!(entity = monitored.entity.name(), error = %e, "task join failed");
            }
        }
        if matches!(outcome, MonitorOutcome::Cascaded { .. }) {
            self.env.flush_ledger();
        }
        self.log_summary(tasks);
        outcome
    }

    /// 실패한 태스크를 제외한 살아 있는 형제 태스크를 모두 종료합니다.
    async fn cascade(&mut self, tasks: &mut [MonitoredTask], trigger: &str) {
        let level = self.registry.level();
        let grace = self.env.options.kill_grace;
        metrics::counter!(m::CASCADES_TOTAL).increment(1);
        warn!(
            level,
            trigger,
            siblings = self.running.len(),
            "stop-on-error triggered, killing sibling tasks"
        );

        let victims = std::mem::take(&mut self.running);
        for &index in &victims {
            let monitored = &tasks[index];
            if !monitored.task.is_alive() {
                continue;
            }
            // 중첩 그룹의 태스크를 바깥 태스크보다 먼저 종료
            if monitored.entity.is_group() {
                monitored.entity.kill_all_alive_test_cases(grace).await;
            }
            let state = monitored.entity.state();
            self.registry.update_snapshot(
                monitored.entity.name(),
                TestStatus::Killed,
                state.start_time,
                Some(Utc::now()),
            );
            monitored.entity.force_kill();
            monitored.task.handle().cancel();
        }

        for &index in &victims {
            let monitored = &tasks[index];
            match monitored.task.kill(grace).await {
                Ok(outcome) => {
                    metrics::counter!(m::TASKS_KILLED_TOTAL, m::LABEL_OUTCOME => outcome.as_str())
                        .increment(1);
                    info!(level, entity = monitored.entity.name(), outcome = %outcome, "sibling stopped");
                }
                Err(e) => warn!(entity = monitored.entity.name(), error = %e, "kill rejected"),
            }
            metrics::gauge!(m::TASKS_RUNNING).decrement(1.0);
        }

        for &index in &victims {
            let monitored = &mut tasks[index];
            if let Err(e) = monitored.task.join(Some(grace)).await {
                warn!(entity = monitored.entity.name(), error = %e, "sibling did not join");
            }
            monitored.entity.mark_running_descendants_killed();
        }
    }

    fn maybe_snapshot(&mut self) {
        if self.last_snapshot.elapsed() >= self.env.options.snapshot_interval {
            self.env
                .timeline
                .snapshot(self.registry.level(), &self.registry.snapshots());
            self.last_snapshot = Instant::now();
        }
    }

    fn log_summary(&self, tasks: &[MonitoredTask]) {
        let level = self.registry.level();
        for monitored in tasks {
            let log = self
                .registry
                .task(monitored.task.id())
                .map(|entry| entry.log_file)
                .unwrap_or_default();
            info!(
                level,
                entity = monitored.entity.name(),
                status = %monitored.entity.status(),
                task_id = %monitored.task.id(),
                log = %log,
                "task summary"
            );
        }
    }
}
