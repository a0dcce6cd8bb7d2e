//! 단계 실행기 — 엔티티 하나를 pre → main → post 순서로 실행
//!
//! 각 단계는 `beforeX`/`afterX` 훅으로 감싸지며, 실패는 호출자에게
//! 전파되지 않고 상태와 실패 사유로 변환됩니다.
//!
//! | 단계 | 훅 실패 | 일반 실패 | 취소 |
//! |------|---------|-----------|------|
//! | pre  | `NotRun` | `ConfigError` | `Killed` |
//! | main | `NotRun` | `Fail` (+ 에러 카운트) | `Killed` |
//! | post | post `Fail` | post `Fail` | post `Fail` |
//! | configuration | `NotRun` | `ConfigError` | `Killed` |
//!
//! 본문의 패닉은 일반 실패, 훅의 패닉은 훅 실패로 취급합니다.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use rigcheck_core::error::{HookError, PhaseError};
use rigcheck_core::hooks::{HookStage, HookTarget};
use rigcheck_core::ledger::{
    FIELD_DURATION, FIELD_END, FIELD_POST_STATUS, FIELD_REASON, FIELD_STAGE, FIELD_START,
    FIELD_STATUS, LedgerFields, LedgerStage,
};
use rigcheck_core::metrics as m;
use rigcheck_core::status::{PostStatus, TestStatus};
use rigcheck_core::types::BoxFuture;

use crate::entity::{ConfigMode, DynConfiguration, DynTestCase, TestEntity};
use crate::env::RunEnv;
use crate::registry::RunRegistry;
use crate::task::{CatchUnwind, TaskContext};

/// 실행 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// 호출자 흐름 안에서 직접 실행. main 성공 즉시 `Pass` 기록
    Serial,
    /// 독립 태스크로 실행. `Pass`는 post 단계 이후 기록
    Parallel,
}

impl ExecMode {
    /// 모드 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Parallel => "parallel",
        }
    }
}

/// 엔티티 한 번의 실행에 필요한 컨텍스트
#[derive(Debug)]
pub struct ExecContext {
    task: TaskContext,
    mode: ExecMode,
    registry: Option<Arc<RunRegistry>>,
}

impl ExecContext {
    /// 순차 실행 컨텍스트
    pub fn serial(task: TaskContext, registry: Option<Arc<RunRegistry>>) -> Self {
        Self {
            task,
            mode: ExecMode::Serial,
            registry,
        }
    }

    /// 병렬 실행 컨텍스트
    pub fn parallel(task: TaskContext, registry: Option<Arc<RunRegistry>>) -> Self {
        Self {
            task,
            mode: ExecMode::Parallel,
            registry,
        }
    }

    /// 본문에 전달되는 태스크 컨텍스트
    pub fn task(&self) -> &TaskContext {
        &self.task
    }

    /// 실행 방식
    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    /// 스냅샷을 갱신할 레지스트리
    pub fn registry(&self) -> Option<&Arc<RunRegistry>> {
        self.registry.as_ref()
    }
}

pub(crate) fn fields<const N: usize>(pairs: [(&str, Value); N]) -> LedgerFields {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

/// 단계 실행기
#[derive(Clone, Copy)]
pub struct PhaseRunner<'a> {
    env: &'a RunEnv,
    exec: &'a ExecContext,
}

impl<'a> PhaseRunner<'a> {
    /// 실행기를 생성합니다.
    pub fn new(env: &'a RunEnv, exec: &'a ExecContext) -> Self {
        Self { env, exec }
    }

    /// 테스트 케이스를 pre → main → post 순서로 실행합니다.
    ///
    /// 훅 실패로 `NotRun`이 되었으면 `Err(PhaseError::Hook)`을 반환합니다.
    /// 그 외에는 최종 상태를 반환합니다.
    pub async fn run_case(
        self,
        entity: &TestEntity,
        body: &dyn DynTestCase,
    ) -> Result<TestStatus, PhaseError> {
        let ctx = self.exec.task();
        let target = entity.hook_target();
        let started = self.begin(entity, "pre-test");
        let mut hook_error = None;

        let pre = match ctx.checkpoint() {
            Ok(()) => {
                self.guarded(
                    &target,
                    HookStage::BeforePreTest,
                    body.pre_test_case(ctx),
                    HookStage::AfterPreTest,
                )
                .await
            }
            Err(e) => Err(e),
        };
        let pre_passed = match pre {
            Ok(()) => true,
            Err(e) => {
                hook_error = self.classify(entity, "pre", e, TestStatus::ConfigError);
                false
            }
        };

        let mut main_passed = false;
        if pre_passed {
            self.marker(entity, "procedure");
            let main = match ctx.checkpoint() {
                Ok(()) => {
                    self.guarded(
                        &target,
                        HookStage::BeforeProcedure,
                        body.procedure(ctx),
                        HookStage::AfterProcedure,
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            match main {
                Ok(()) => {
                    main_passed = true;
                    if self.exec.mode() == ExecMode::Serial {
                        self.record(entity, TestStatus::Pass);
                    }
                }
                Err(e) => hook_error = self.classify(entity, "main", e, TestStatus::Fail),
            }
        }

        // post 단계는 앞 단계 결과와 무관하게 실행
        self.marker(entity, "post-test");
        entity.set_post_status(PostStatus::Running);
        let post = self
            .guarded(
                &target,
                HookStage::BeforePostTest,
                body.post_test_case(ctx),
                HookStage::AfterPostTest,
            )
            .await;
        match post {
            Ok(()) => entity.set_post_status(PostStatus::Pass),
            Err(e) => {
                entity.set_post_status(PostStatus::Fail);
                entity.counters().add_warning();
                warn!(entity = entity.name(), error = %e, "post-test phase failed");
            }
        }
        self.env.persist(
            entity,
            fields([(FIELD_POST_STATUS, entity.post_status().as_str().into())]),
        );

        if main_passed && self.exec.mode() == ExecMode::Parallel {
            self.record(entity, TestStatus::Pass);
        }

        self.finish(entity, started);
        match hook_error {
            Some(e) => Err(PhaseError::Hook(e)),
            None => Ok(entity.status()),
        }
    }

    /// 설정 엔티티를 적용하거나 제거합니다.
    ///
    /// 성공하면 `Configured`/`DeConfigured`, 일반 실패는 pre 단계와 같이 `ConfigError`입니다.
    pub async fn run_configuration(
        self,
        entity: &TestEntity,
        body: &dyn DynConfiguration,
        mode: ConfigMode,
    ) -> Result<TestStatus, PhaseError> {
        let ctx = self.exec.task();
        let target = entity.hook_target();
        let started = self.begin(entity, mode.as_str());

        let work = match mode {
            ConfigMode::Config => body.run_configuration(ctx),
            ConfigMode::DeConfig => body.de_configuration(ctx),
        };
        let outcome = match ctx.checkpoint() {
            Ok(()) => {
                self.guarded(
                    &target,
                    HookStage::BeforeConfiguration,
                    work,
                    HookStage::AfterConfiguration,
                )
                .await
            }
            Err(e) => Err(e),
        };
        let hook_error = match outcome {
            Ok(()) => {
                self.record(entity, mode.success_status());
                None
            }
            Err(e) => self.classify(entity, "configuration", e, TestStatus::ConfigError),
        };

        self.finish(entity, started);
        match hook_error {
            Some(e) => Err(PhaseError::Hook(e)),
            None => Ok(entity.status()),
        }
    }

    // --- 공통 단계 ---

    /// 시작 시각 기록, `Running` 전이, 원장 갱신, 로그 전환을 수행합니다.
    pub(crate) fn begin(&self, entity: &TestEntity, marker: &str) -> Instant {
        let ctx = self.exec.task();
        let kind = entity.kind_tag();
        let log_file = match self.env.logs.change_log_file(ctx.id(), kind, entity.name()) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(entity = entity.name(), error = %e, "failed to open entity log");
                None
            }
        };

        let start = match entity.mark_started(ctx.id(), log_file) {
            Ok(start) => start,
            Err(e) => {
                warn!(entity = entity.name(), error = %e, "entity started from unexpected status");
                Utc::now()
            }
        };
        self.env.persist(
            entity,
            fields([
                (FIELD_STATUS, entity.status().as_str().into()),
                (FIELD_STAGE, LedgerStage::Running.as_str().into()),
                (FIELD_START, start.to_rfc3339().into()),
            ]),
        );
        self.sync_snapshot(entity);
        self.marker(entity, marker);

        info!(
            entity = entity.name(),
            kind = %kind,
            task_id = %ctx.id(),
            mode = self.exec.mode().as_str(),
            "entity started"
        );
        Instant::now()
    }

    /// 종료 시각과 소요 시간을 기록하고 로그 핸들을 해제합니다.
    pub(crate) fn finish(&self, entity: &TestEntity, started: Instant) {
        let duration = started.elapsed();
        entity.mark_finished(Utc::now(), duration);
        let state = entity.state();
        let kind = entity.kind_tag();

        let mut record = fields([
            (FIELD_STATUS, state.status.as_str().into()),
            (FIELD_STAGE, LedgerStage::Done.as_str().into()),
            (FIELD_DURATION, duration.as_secs_f64().into()),
            (FIELD_POST_STATUS, state.post_status.as_str().into()),
        ]);
        if let Some(end) = state.end_time {
            record.insert(FIELD_END.to_owned(), end.to_rfc3339().into());
        }
        if let Some(reason) = &state.failure_reason {
            record.insert(FIELD_REASON.to_owned(), reason.clone().into());
        }
        self.env.persist(entity, record);
        self.sync_snapshot(entity);

        self.marker(entity, &format!("result: {}", state.status));
        self.env.logs.release_file_handle(kind, entity.name());

        metrics::counter!(
            m::ENTITIES_COMPLETED_TOTAL,
            m::LABEL_STATUS => state.status.as_str(),
            m::LABEL_KIND => kind.as_str()
        )
        .increment(1);
        metrics::histogram!(m::ENTITY_DURATION_SECONDS, m::LABEL_KIND => kind.as_str())
            .record(duration.as_secs_f64());

        info!(
            entity = entity.name(),
            kind = %kind,
            status = %state.status,
            post_status = %state.post_status,
            duration_ms = duration.as_millis() as u64,
            task_id = ?state.task_id,
            log = state.log_file.as_deref().unwrap_or("-"),
            reason = state.failure_reason.as_deref().unwrap_or(""),
            "entity finished"
        );
    }

    pub(crate) fn sync_snapshot(&self, entity: &TestEntity) {
        if let Some(registry) = self.exec.registry() {
            registry.sync_snapshot(entity);
        }
    }

    pub(crate) fn marker(&self, entity: &TestEntity, text: &str) {
        self.env.logs.marker(
            entity.kind_tag(),
            entity.name(),
            &format!("===== {text}: {} =====", entity.name()),
        );
    }

    // --- 내부 ---

    /// before 훅, 본문, after 훅을 순서대로 실행합니다.
    ///
    /// before 훅이나 본문이 실패해도 after 훅은 로그 수집을 위해 한 번 더
    /// 시도하며, 그 실패는 기록만 하고 버립니다.
    async fn guarded(
        &self,
        target: &HookTarget,
        before: HookStage,
        body: BoxFuture<'_, Result<(), PhaseError>>,
        after: HookStage,
    ) -> Result<(), PhaseError> {
        if let Err(e) = self.hook(before, target).await {
            self.hook_failed(target, &e);
            self.after_hook_for_logs(target, after).await;
            return Err(PhaseError::Hook(e));
        }
        let outcome = match CatchUnwind::new(body).await {
            Ok(result) => result,
            Err(message) => {
                warn!(entity = %target.name, panic = %message, "phase body panicked");
                Err(PhaseError::failure(format!("panicked: {message}")))
            }
        };
        match outcome {
            Ok(()) => match self.hook(after, target).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.hook_failed(target, &e);
                    Err(PhaseError::Hook(e))
                }
            },
            Err(e) => {
                if let PhaseError::Hook(hook) = &e {
                    self.hook_failed(target, hook);
                }
                self.after_hook_for_logs(target, after).await;
                Err(e)
            }
        }
    }

    async fn after_hook_for_logs(&self, target: &HookTarget, after: HookStage) {
        if let Err(e) = self.hook(after, target).await {
            self.hook_failed(target, &e);
            debug!(entity = %target.name, stage = %after, "after-hook failure swallowed");
        }
    }

    /// 훅을 실행합니다. 훅의 패닉은 해당 단계의 [`HookError`]가 됩니다.
    async fn hook(&self, stage: HookStage, target: &HookTarget) -> Result<(), HookError> {
        CatchUnwind::new(self.env.hooks.run_hooks(stage, Some(target)))
            .await
            .unwrap_or_else(|message| {
                Err(HookError::new(stage.as_str(), format!("panicked: {message}")))
            })
    }

    fn hook_failed(&self, target: &HookTarget, error: &HookError) {
        metrics::counter!(m::HOOK_FAILURES_TOTAL).increment(1);
        warn!(entity = %target.name, stage = %error.stage, reason = %error.reason, "hook aborted");
    }

    /// 실패를 상태로 변환합니다. 훅 실패이면 그 에러를 돌려줍니다.
    fn classify(
        &self,
        entity: &TestEntity,
        stage: &str,
        error: PhaseError,
        on_failure: TestStatus,
    ) -> Option<HookError> {
        match error {
            PhaseError::Hook(hook) => {
                if self.record(entity, TestStatus::NotRun) {
                    entity.set_failure_reason(format!(
                        "Test Stage: {stage}; Status: NotRun; Reason: {hook}"
                    ));
                }
                Some(hook)
            }
            PhaseError::Failure(reason) => {
                // 에러 카운트는 main 단계 실패만 셈
                if stage == "main" {
                    entity.counters().add_error();
                }
                if self.record(entity, on_failure) {
                    entity.set_failure_reason(format!(
                        "Test Stage: {stage}; Status: Failed; Reason: {reason}"
                    ));
                }
                warn!(entity = entity.name(), stage, status = %on_failure, %reason, "phase failed");
                None
            }
            PhaseError::Cancelled => {
                if entity.force_kill() != TestStatus::Killed {
                    entity.set_failure_reason(format!(
                        "Test Stage: {stage}; Status: Killed; Reason: cancelled"
                    ));
                }
                info!(entity = entity.name(), stage, "phase cancelled");
                None
            }
        }
    }

    fn record(&self, entity: &TestEntity, status: TestStatus) -> bool {
        match entity.record_outcome(status) {
            Ok(changed) => changed,
            Err(e) => {
                warn!(entity = entity.name(), error = %e, "status not recorded");
                false
            }
        }
    }
}
