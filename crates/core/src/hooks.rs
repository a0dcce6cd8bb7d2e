//! 훅 — 단계 전후에 주입되는 교차 관심사 콜백
//!
//! 훅 실패([`HookError`])는 인프라 수준의 중단으로 취급되며
//! 테스트 결함으로 집계되지 않습니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HookError;
use crate::types::{BoxFuture, EntityKindTag};

/// 훅 주입 지점
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStage {
    /// 전체 실행 시작 전 (엔티티 없음)
    BeforeRun,
    /// 전체 실행 종료 후 (엔티티 없음)
    AfterRun,
    /// pre 단계 전
    BeforePreTest,
    /// pre 단계 후
    AfterPreTest,
    /// main 단계 전
    BeforeProcedure,
    /// main 단계 후
    AfterProcedure,
    /// post 단계 전
    BeforePostTest,
    /// post 단계 후
    AfterPostTest,
    /// 설정 적용/제거 전
    BeforeConfiguration,
    /// 설정 적용/제거 후
    AfterConfiguration,
}

impl HookStage {
    /// 훅 단계 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeRun => "before_run",
            Self::AfterRun => "after_run",
            Self::BeforePreTest => "before_pre_test",
            Self::AfterPreTest => "after_pre_test",
            Self::BeforeProcedure => "before_procedure",
            Self::AfterProcedure => "after_procedure",
            Self::BeforePostTest => "before_post_test",
            Self::AfterPostTest => "after_post_test",
            Self::BeforeConfiguration => "before_configuration",
            Self::AfterConfiguration => "after_configuration",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 훅이 호출되는 대상 엔티티 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookTarget {
    /// 엔티티 이름
    pub name: String,
    /// 엔티티 종류
    pub kind: EntityKindTag,
}

/// 훅 실행기 trait
///
/// `entity`가 `None`이면 실행 단위 전체에 대한 훅입니다.
pub trait HookRunner: Send + Sync {
    /// 지정 단계의 훅을 실행합니다.
    fn run_hooks<'a>(
        &'a self,
        stage: HookStage,
        entity: Option<&'a HookTarget>,
    ) -> BoxFuture<'a, Result<(), HookError>>;
}

/// 아무것도 하지 않는 훅 실행기
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl HookRunner for NoopHooks {
    fn run_hooks<'a>(
        &'a self,
        _stage: HookStage,
        _entity: Option<&'a HookTarget>,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async { Ok(()) })
    }
}

/// 동기 클로저를 훅 실행기로 감싸는 어댑터
///
/// ```
/// use rigcheck_core::error::HookError;
/// use rigcheck_core::hooks::{FnHooks, HookStage};
///
/// let hooks = FnHooks::new(|stage, _target| {
///     if stage == HookStage::BeforeRun {
///         Err(HookError::new(stage.as_str(), "lab power is off"))
///     } else {
///         Ok(())
///     }
/// });
/// # let _ = hooks;
/// ```
pub struct FnHooks<F> {
    f: F,
}

impl<F> FnHooks<F>
where
    F: Fn(HookStage, Option<&HookTarget>) -> Result<(), HookError> + Send + Sync,
{
    /// 클로저로 훅 실행기를 생성합니다.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> HookRunner for FnHooks<F>
where
    F: Fn(HookStage, Option<&HookTarget>) -> Result<(), HookError> + Send + Sync,
{
    fn run_hooks<'a>(
        &'a self,
        stage: HookStage,
        entity: Option<&'a HookTarget>,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async move { (self.f)(stage, entity) })
    }
}
