//! 테스트 엔티티 — 케이스, 그룹, 설정 엔티티와 상태 기계
//!
//! [`TestEntity`]는 종류를 닫힌 합 타입 [`EntityKind`]로 보관하고
//! [`TestEntity::run_phases`] 하나로 실행을 분기합니다.
//! 스케줄러는 엔티티 종류를 검사하지 않습니다.
//!
//! # 상태 기록 API
//! - [`TestEntity::record_outcome`]: 일반 경로. 고착 상태(`Fail`,
//!   `ConfigError`, `Killed`)에서는 아무것도 바꾸지 않습니다.
//! - [`TestEntity::force_kill`]: 연쇄 종료 전용. 어떤 상태에서든 `Killed`로 덮어씁니다.
//! - `force_fail`: 그룹의 `kill_all_alive_test_cases` 전용.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use rigcheck_core::error::{PhaseError, ValidationError};
use rigcheck_core::hooks::HookTarget;
use rigcheck_core::status::{PostStatus, TestStatus};
use rigcheck_core::types::{BoxFuture, EntityKindTag, TaskId};

use crate::env::RunEnv;
use crate::group;
use crate::phase::{ExecContext, PhaseRunner};
use crate::registry::RunRegistry;
use crate::task::TaskContext;

// ─── 본문 trait ──────────────────────────────────────────────────────

/// 테스트 케이스 본문
///
/// 각 단계는 [`PhaseError`]로 실패를 보고합니다.
/// - `PhaseError::Hook` → 인프라 중단
/// - `PhaseError::Failure` → 테스트 실패
/// - `PhaseError::Cancelled` → 취소 관측
///
/// # 구현 예시
/// ```ignore
/// struct Ping;
///
/// impl TestCase for Ping {
///     async fn procedure(&self, ctx: &TaskContext) -> Result<(), PhaseError> {
///         ctx.checkpoint()?;
///         send_echo().await.map_err(|e| PhaseError::failure(e.to_string()))
///     }
/// }
/// ```
pub trait TestCase: Send + Sync + 'static {
    /// 준비 단계. 실패하면 본문은 건너뜁니다.
    fn pre_test_case(
        &self,
        _ctx: &TaskContext,
    ) -> impl Future<Output = Result<(), PhaseError>> + Send {
        async { Ok(()) }
    }

    /// 본문
    fn procedure(&self, ctx: &TaskContext) -> impl Future<Output = Result<(), PhaseError>> + Send;

    /// 정리 단계. 앞 단계 결과와 관계없이 항상 실행됩니다.
    fn post_test_case(
        &self,
        _ctx: &TaskContext,
    ) -> impl Future<Output = Result<(), PhaseError>> + Send {
        async { Ok(()) }
    }
}

/// dyn-compatible 테스트 케이스 trait
///
/// `TestCase`는 RPITIT를 사용하므로 `dyn TestCase`가 불가합니다.
/// `TestCase`를 구현한 타입은 자동으로 이 trait도 구현됩니다.
pub trait DynTestCase: Send + Sync {
    /// 준비 단계
    fn pre_test_case<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), PhaseError>>;
    /// 본문
    fn procedure<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), PhaseError>>;
    /// 정리 단계
    fn post_test_case<'a>(&'a self, ctx: &'a TaskContext)
    -> BoxFuture<'a, Result<(), PhaseError>>;
}

impl<T: TestCase> DynTestCase for T {
    fn pre_test_case<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), PhaseError>> {
        Box::pin(TestCase::pre_test_case(self, ctx))
    }

    fn procedure<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), PhaseError>> {
        Box::pin(TestCase::procedure(self, ctx))
    }

    fn post_test_case<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<(), PhaseError>> {
        Box::pin(TestCase::post_test_case(self, ctx))
    }
}

/// 설정 엔티티 본문 (환경 적용/제거)
pub trait Configuration: Send + Sync + 'static {
    /// 설정을 적용합니다.
    fn run_configuration(
        &self,
        ctx: &TaskContext,
    ) -> impl Future<Output = Result<(), PhaseError>> + Send;

    /// 설정을 제거합니다.
    fn de_configuration(
        &self,
        ctx: &TaskContext,
    ) -> impl Future<Output = Result<(), PhaseError>> + Send;
}

/// dyn-compatible 설정 trait
pub trait DynConfiguration: Send + Sync {
    /// 설정을 적용합니다.
    fn run_configuration<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<(), PhaseError>>;
    /// 설정을 제거합니다.
    fn de_configuration<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<(), PhaseError>>;
}

impl<T: Configuration> DynConfiguration for T {
    fn run_configuration<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<(), PhaseError>> {
        Box::pin(Configuration::run_configuration(self, ctx))
    }

    fn de_configuration<'a>(
        &'a self,
        ctx: &'a TaskContext,
    ) -> BoxFuture<'a, Result<(), PhaseError>> {
        Box::pin(Configuration::de_configuration(self, ctx))
    }
}

/// 설정 엔티티 실행 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    /// 적용 (성공 시 `Configured`)
    Config,
    /// 제거 (성공 시 `DeConfigured`)
    DeConfig,
}

impl ConfigMode {
    /// 성공 시 기록할 상태
    pub fn success_status(self) -> TestStatus {
        match self {
            Self::Config => TestStatus::Configured,
            Self::DeConfig => TestStatus::DeConfigured,
        }
    }

    /// 모드 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::DeConfig => "deconfig",
        }
    }
}

impl fmt::Display for ConfigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── 엔티티 종류 ─────────────────────────────────────────────────────

/// 그룹 엔티티 구성
pub struct GroupSpec {
    children: Vec<Arc<TestEntity>>,
    registry: Arc<RunRegistry>,
}

impl GroupSpec {
    /// 자식 엔티티 (선언 순서)
    pub fn children(&self) -> &[Arc<TestEntity>] {
        &self.children
    }

    /// 이 그룹 레벨의 실행 레지스트리
    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }
}

/// 엔티티 종류
pub enum EntityKind {
    /// 개별 테스트 케이스
    Case(Box<dyn DynTestCase>),
    /// 자식 엔티티 묶음
    Group(GroupSpec),
    /// 환경 적용/제거
    Configuration {
        /// 설정 본문
        body: Box<dyn DynConfiguration>,
        /// 적용/제거 모드
        mode: ConfigMode,
    },
}

impl EntityKind {
    /// 종류 태그
    pub fn tag(&self) -> EntityKindTag {
        match self {
            Self::Case(_) => EntityKindTag::Case,
            Self::Group(_) => EntityKindTag::Group,
            Self::Configuration { .. } => EntityKindTag::Configuration,
        }
    }
}

// ─── 상태 ────────────────────────────────────────────────────────────

/// 엔티티의 가변 상태
#[derive(Debug, Clone, Serialize)]
pub struct EntityState {
    /// 현재 상태
    pub status: TestStatus,
    /// post 단계 상태
    pub post_status: PostStatus,
    /// 시작 시각
    pub start_time: Option<DateTime<Utc>>,
    /// 종료 시각
    pub end_time: Option<DateTime<Utc>>,
    /// 소요 시간
    pub duration: Option<Duration>,
    /// 마지막 실패 사유
    pub failure_reason: Option<String>,
    /// 마지막으로 이 엔티티를 실행한 태스크
    pub task_id: Option<TaskId>,
    /// 엔티티 로그 파일
    pub log_file: Option<String>,
}

impl Default for EntityState {
    fn default() -> Self {
        Self {
            status: TestStatus::NotRun,
            post_status: PostStatus::NotRun,
            start_time: None,
            end_time: None,
            duration: None,
            failure_reason: None,
            task_id: None,
            log_file: None,
        }
    }
}

/// 에러/경고 카운터
///
/// 증가분은 부모 그룹의 카운터로 루트까지 전파됩니다.
#[derive(Debug, Default)]
pub struct Counters {
    errors: AtomicU64,
    warnings: AtomicU64,
    parent: OnceLock<Arc<Counters>>,
}

impl Counters {
    fn chain(&self) -> impl Iterator<Item = &Counters> {
        std::iter::successors(Some(self), |c| c.parent.get().map(Arc::as_ref))
    }

    /// 에러 수를 1 증가시킵니다 (조상 포함).
    pub fn add_error(&self) {
        for c in self.chain() {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 경고 수를 1 증가시킵니다 (조상 포함).
    pub fn add_warning(&self) {
        for c in self.chain() {
            c.warnings.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 누적 에러 수
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// 누적 경고 수
    pub fn warnings(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}

// ─── TestEntity ──────────────────────────────────────────────────────

/// 테스트 엔티티
pub struct TestEntity {
    name: String,
    kind: EntityKind,
    parallel: bool,
    state: Mutex<EntityState>,
    counters: Arc<Counters>,
    status_uuid: OnceLock<String>,
}

impl TestEntity {
    fn with_kind(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parallel: false,
            state: Mutex::new(EntityState::default()),
            counters: Arc::new(Counters::default()),
            status_uuid: OnceLock::new(),
        }
    }

    /// 테스트 케이스 엔티티를 생성합니다.
    pub fn case(name: impl Into<String>, body: impl TestCase) -> Self {
        Self::with_kind(name, EntityKind::Case(Box::new(body)))
    }

    /// 그룹 엔티티를 생성합니다. 자식 카운터는 이 그룹으로 연결됩니다.
    pub fn group(name: impl Into<String>, children: Vec<TestEntity>) -> Self {
        let name = name.into();
        let counters = Arc::new(Counters::default());
        let children: Vec<Arc<TestEntity>> = children
            .into_iter()
            .map(|child| {
                let _ = child.counters.parent.set(Arc::clone(&counters));
                Arc::new(child)
            })
            .collect();
        let registry = Arc::new(RunRegistry::new(format!("group:{name}")));
        Self {
            counters,
            ..Self::with_kind(name, EntityKind::Group(GroupSpec { children, registry }))
        }
    }

    /// 설정 엔티티를 생성합니다.
    pub fn configuration(
        name: impl Into<String>,
        body: impl Configuration,
        mode: ConfigMode,
    ) -> Self {
        Self::with_kind(
            name,
            EntityKind::Configuration {
                body: Box::new(body),
                mode,
            },
        )
    }

    /// 인접한 병렬 형제와 동시에 실행될 수 있는지 지정합니다.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    // --- 조회 ---

    /// 엔티티 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 엔티티 종류
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// 종류 태그
    pub fn kind_tag(&self) -> EntityKindTag {
        self.kind.tag()
    }

    /// 그룹 여부
    pub fn is_group(&self) -> bool {
        matches!(self.kind, EntityKind::Group(_))
    }

    /// 병렬 실행 대상 여부
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// 그룹의 자식 엔티티. 그룹이 아니면 빈 슬라이스입니다.
    pub fn children(&self) -> &[Arc<TestEntity>] {
        match &self.kind {
            EntityKind::Group(group) => group.children(),
            _ => &[],
        }
    }

    /// 자신과 모든 자손을 전위 순회합니다.
    pub fn walk(&self) -> Vec<&TestEntity> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.walk());
        }
        out
    }

    /// 훅 대상 정보
    pub fn hook_target(&self) -> HookTarget {
        HookTarget {
            name: self.name.clone(),
            kind: self.kind_tag(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EntityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 현재 상태의 복사본
    pub fn state(&self) -> EntityState {
        self.lock_state().clone()
    }

    /// 현재 상태
    pub fn status(&self) -> TestStatus {
        self.lock_state().status
    }

    /// post 단계 상태
    pub fn post_status(&self) -> PostStatus {
        self.lock_state().post_status
    }

    /// 마지막 실패 사유
    pub fn failure_reason(&self) -> Option<String> {
        self.lock_state().failure_reason.clone()
    }

    /// 에러/경고 카운터
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// 원장 레코드 uuid
    pub fn status_uuid(&self) -> Option<&str> {
        self.status_uuid.get().map(String::as_str)
    }

    /// 원장 레코드 uuid를 지정합니다. 이미 지정되어 있으면 `false`.
    pub fn assign_status_uuid(&self, uuid: String) -> bool {
        self.status_uuid.set(uuid).is_ok()
    }

    // --- 상태 기록 ---

    /// 일반 경로로 결과를 기록합니다.
    ///
    /// 고착 상태에서는 아무것도 바꾸지 않고 `Ok(false)`를 반환합니다.
    /// 같은 상태 기록도 `Ok(false)`입니다.
    ///
    /// # Errors
    ///
    /// 허용되지 않는 전이는 [`ValidationError::InvalidTransition`]을 반환합니다.
    pub fn record_outcome(&self, next: TestStatus) -> Result<bool, ValidationError> {
        let mut state = self.lock_state();
        let current = state.status;
        if current.is_sticky() {
            if current != next {
                debug!(entity = %self.name, current = %current, ignored = %next, "sticky status kept");
            }
            return Ok(false);
        }
        if current == next {
            return Ok(false);
        }
        if !current.can_transition_to(next) {
            return Err(ValidationError::InvalidTransition {
                entity: self.name.clone(),
                from: current,
                to: next,
            });
        }
        state.status = next;
        Ok(true)
    }

    /// 상태 토큰 문자열로 결과를 기록합니다.
    ///
    /// # Errors
    ///
    /// 알 수 없는 토큰은 [`ValidationError::UnknownStatus`]를 반환합니다.
    pub fn set_status(&self, token: &str) -> Result<bool, ValidationError> {
        let next: TestStatus = token.parse()?;
        self.record_outcome(next)
    }

    /// 어떤 상태에서든 `Killed`로 덮어쓰고 이전 상태를 반환합니다.
    pub fn force_kill(&self) -> TestStatus {
        let mut state = self.lock_state();
        let previous = state.status;
        state.status = TestStatus::Killed;
        if state.start_time.is_some() && state.end_time.is_none() {
            state.end_time = Some(Utc::now());
        }
        if state.failure_reason.is_none() {
            state.failure_reason = Some(format!("Status: Killed; Previous: {previous}"));
        }
        previous
    }

    /// 어떤 상태에서든 `Fail`로 덮어씁니다.
    pub(crate) fn force_fail(&self) -> TestStatus {
        let mut state = self.lock_state();
        std::mem::replace(&mut state.status, TestStatus::Fail)
    }

    /// 실행 중인 자손을 모두 `Killed`로 표시하고 개수를 반환합니다.
    ///
    /// `NotRun` 자손은 그대로 둡니다.
    pub fn mark_running_descendants_killed(&self) -> usize {
        let mut marked = 0;
        for child in self.children() {
            if child.status() == TestStatus::Running {
                child.force_kill();
                marked += 1;
            }
            marked += child.mark_running_descendants_killed();
        }
        marked
    }

    pub(crate) fn set_post_status(&self, post: PostStatus) {
        self.lock_state().post_status = post;
    }

    pub(crate) fn set_failure_reason(&self, reason: String) {
        self.lock_state().failure_reason = Some(reason);
    }

    /// 실행 시작을 기록합니다. `NotRun → Running` 전이를 포함합니다.
    pub(crate) fn mark_started(
        &self,
        task_id: TaskId,
        log_file: Option<String>,
    ) -> Result<DateTime<Utc>, ValidationError> {
        let now = Utc::now();
        {
            let mut state = self.lock_state();
            state.start_time = Some(now);
            state.end_time = None;
            state.task_id = Some(task_id);
            state.log_file = log_file;
        }
        self.record_outcome(TestStatus::Running)?;
        Ok(now)
    }

    pub(crate) fn mark_finished(&self, end: DateTime<Utc>, duration: Duration) {
        let mut state = self.lock_state();
        state.end_time = Some(end);
        state.duration = Some(duration);
    }

    // --- 실행 ---

    /// 엔티티 종류에 맞는 단계 실행기를 호출합니다.
    ///
    /// 반환 에러는 이미 상태로 분류된 뒤이며, 태스크 에러 슬롯에 남기기 위한 것입니다.
    pub fn run_phases<'a>(
        &'a self,
        env: &'a RunEnv,
        exec: &'a ExecContext,
    ) -> BoxFuture<'a, Result<TestStatus, PhaseError>> {
        let runner = PhaseRunner::new(env, exec);
        match &self.kind {
            EntityKind::Case(body) => Box::pin(runner.run_case(self, body.as_ref())),
            EntityKind::Group(group) => Box::pin(group::run_group(self, group, env, exec)),
            EntityKind::Configuration { body, mode } => {
                Box::pin(runner.run_configuration(self, body.as_ref(), *mode))
            }
        }
    }

    /// 그룹의 살아 있는 자식 태스크를 모두 종료하고 그룹 상태를 `Fail`로 강제합니다.
    ///
    /// 그룹이 아니면 아무것도 하지 않습니다. 종료한 태스크 수를 반환합니다.
    pub fn kill_all_alive_test_cases(&self, grace: Duration) -> BoxFuture<'_, usize> {
        match &self.kind {
            EntityKind::Group(group) => Box::pin(async move {
                let killed = group::kill_all_alive(group.registry(), grace).await;
                self.force_fail();
                killed
            }),
            _ => Box::pin(async { 0 }),
        }
    }
}

impl fmt::Debug for TestEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestEntity")
            .field("name", &self.name)
            .field("kind", &self.kind_tag())
            .field("parallel", &self.parallel)
            .field("status", &self.status())
            .field("children", &self.children().len())
            .finish()
    }
}
