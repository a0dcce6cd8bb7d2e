//! 엔진 — 엔티티 트리 실행의 진입점
//!
//! 루트는 이름 없는 그룹처럼 동작합니다. 최상위 엔티티를 웨이브로 스케줄링하고,
//! 실행 전후에 `before_run`/`after_run` 훅을 호출합니다.
//!
//! 최상위 레벨에서 stop-on-error가 발동하면 원장을 flush하고 전체 상태 표를
//! 로그로 남긴 뒤 `RunReport::aborted = true`로 반환합니다. 프로세스 종료는
//! 호출자(CLI)의 몫입니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use rigcheck_core::error::{HookError, RigcheckError, ValidationError};
use rigcheck_core::hooks::HookStage;
use rigcheck_core::status::TestStatus;

use crate::entity::TestEntity;
use crate::env::{RunEnv, RunOptions};
use crate::group::{self, GroupScheduler, aggregate_status};
use crate::registry::RunRegistry;
use crate::report::{RunReport, collect_reports, render_status_table};
use crate::task::{CatchUnwind, TaskContext, TaskHandle};

/// 루트 레지스트리 레벨 이름
pub const ROOT_LEVEL: &str = "root";

/// 테스트 실행 엔진
pub struct Engine {
    env: RunEnv,
    registry: Arc<RunRegistry>,
    roots: Vec<Arc<TestEntity>>,
    index: HashMap<String, Arc<TestEntity>>,
    root_ctx: TaskContext,
}

impl Engine {
    /// 실행 환경으로 엔진을 생성합니다.
    pub fn new(env: RunEnv) -> Self {
        Self {
            env,
            registry: Arc::new(RunRegistry::new(ROOT_LEVEL)),
            roots: Vec::new(),
            index: HashMap::new(),
            root_ctx: TaskContext::detached(ROOT_LEVEL),
        }
    }

    /// 엔티티 트리의 이름을 검증합니다.
    ///
    /// # Errors
    ///
    /// 빈 이름은 [`ValidationError::EmptyName`], 트리 전체에서 중복된 이름은
    /// [`ValidationError::DuplicateName`]을 반환합니다.
    pub fn validate(entities: &[TestEntity]) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for entity in entities.iter().flat_map(TestEntity::walk) {
            if entity.name().trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
            if !seen.insert(entity.name()) {
                return Err(ValidationError::DuplicateName {
                    name: entity.name().to_owned(),
                });
            }
        }
        Ok(())
    }

    /// 엔티티 트리를 실행합니다.
    ///
    /// 단계 실패와 훅 실패는 상태로 변환되며 에러로 반환되지 않습니다.
    ///
    /// # Errors
    ///
    /// 이름 검증 실패 시 아무것도 실행하지 않고 [`RigcheckError::Validation`]을 반환합니다.
    pub async fn run(
        &mut self,
        entities: Vec<TestEntity>,
        options: RunOptions,
    ) -> Result<RunReport, RigcheckError> {
        Self::validate(&entities)?;

        self.env.options = options;
        self.registry = Arc::new(RunRegistry::new(ROOT_LEVEL));
        if self.root_ctx.is_cancelled() {
            self.root_ctx = TaskContext::detached(ROOT_LEVEL);
        }
        self.roots = entities.into_iter().map(Arc::new).collect();
        self.index.clear();
        for root in &self.roots {
            index_tree(root, &mut self.index);
        }
        for entity in self.roots.iter().flat_map(|root| root.walk()) {
            self.env.register_entity(entity);
        }

        let started_at = Utc::now();
        info!(
            entities = self.index.len(),
            stop_on_error = self.env.options.stop_on_error,
            parallel = self.env.options.parallel,
            "run started"
        );

        if let Err(e) = self.run_hook(HookStage::BeforeRun).await {
            error!(error = %e, "before_run hook aborted, nothing was executed");
            self.env.flush_ledger();
            return Ok(self.report(started_at, true, Some(HookStage::BeforeRun.as_str().to_owned())));
        }

        let outcome = GroupScheduler::new(&self.roots, &self.registry, &self.env)
            .run(&self.root_ctx)
            .await;

        if let Err(e) = self.run_hook(HookStage::AfterRun).await {
            warn!(error = %e, "after_run hook aborted");
        }

        let aborted = outcome.halted_by.is_some();
        self.env.flush_ledger();
        let report = self.report(started_at, aborted, outcome.halted_by);

        if aborted {
            error!(
                trigger = report.trigger.as_deref().unwrap_or(""),
                "stop-on-error at top level, run aborted\n{}",
                render_status_table(&report.entities)
            );
        }
        info!(
            status = %report.status,
            aborted = report.aborted,
            duration_secs = report.duration_secs(),
            "run finished"
        );
        Ok(report)
    }

    async fn run_hook(&self, stage: HookStage) -> Result<(), HookError> {
        CatchUnwind::new(self.env.hooks.run_hooks(stage, None))
            .await
            .unwrap_or_else(|message| {
                Err(HookError::new(stage.as_str(), format!("panicked: {message}")))
            })
    }

    fn report(
        &self,
        started_at: chrono::DateTime<Utc>,
        aborted: bool,
        trigger: Option<String>,
    ) -> RunReport {
        RunReport {
            status: self.aggregate_status(),
            aborted,
            trigger,
            started_at,
            finished_at: Utc::now(),
            entities: collect_reports(&self.roots),
        }
    }

    /// 이름으로 엔티티 상태를 조회합니다 (중첩 엔티티 포함).
    pub fn status_of(&self, name: &str) -> Option<TestStatus> {
        self.index.get(name).map(|entity| entity.status())
    }

    /// 이름으로 엔티티를 조회합니다.
    pub fn entity(&self, name: &str) -> Option<&Arc<TestEntity>> {
        self.index.get(name)
    }

    /// 최상위 엔티티
    pub fn roots(&self) -> &[Arc<TestEntity>] {
        &self.roots
    }

    /// 최상위 엔티티의 현재 상태 집계
    pub fn aggregate_status(&self) -> TestStatus {
        aggregate_status(self.roots.iter().map(|root| root.status()))
    }

    /// 루트 레지스트리
    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// 루트 취소 핸들
    ///
    /// `run()` 전에 얻은 핸들도 다음 실행에 유효합니다. 이미 취소된 컨텍스트는
    /// 다음 `run()`에서 새로 만들어집니다. 취소하면 순차 실행 중인 엔티티가 취소를 관찰하고 남은 웨이브는 시작되지 않습니다.
    pub fn cancel_handle(&self) -> TaskHandle {
        self.root_ctx.handle()
    }

    /// 최상위 레벨의 살아 있는 태스크를 모두 종료합니다.
    pub async fn kill_all_alive_test_cases(&self) -> usize {
        group::kill_all_alive(&self.registry, self.env.options.kill_grace).await
    }
}

fn index_tree(entity: &Arc<TestEntity>, index: &mut HashMap<String, Arc<TestEntity>>) {
    index.insert(entity.name().to_owned(), Arc::clone(entity));
    for child in entity.children() {
        index_tree(child, index);
    }
}
