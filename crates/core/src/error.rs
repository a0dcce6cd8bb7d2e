//! 에러 타입 — 도메인별 에러 정의
//!
//! 실행 엔진의 에러는 두 부류로 나뉩니다.
//!
//! - 호출 시점에 즉시 실패하는 에러: [`ValidationError`], [`ConfigError`], [`TaskError`]
//! - 엔티티 실행 중 발생하여 상태로 변환되는 에러: [`HookError`], [`PhaseError`]
//!
//! 두 번째 부류는 `PhaseRunner`가 로컬에서 잡아 상태와 실패 사유로 바꾸며,
//! `run()` 밖으로 전파되지 않습니다.

use crate::status::TestStatus;
use crate::types::TaskId;

/// rigcheck 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum RigcheckError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 입력 검증 에러
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// 태스크 제어 에러
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// 상태 원장 에러
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 호출 시점 검증 에러
///
/// 잘못된 상태 토큰, 허용되지 않는 상태 전이, 중복 엔티티 이름 등
/// 실행을 시작하기 전에 거부해야 하는 입력을 표현합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// 인식할 수 없는 상태 토큰
    #[error("unknown status token '{token}'")]
    UnknownStatus { token: String },

    /// 허용되지 않는 상태 전이
    #[error("entity '{entity}': transition {from} -> {to} is not allowed")]
    InvalidTransition {
        /// 엔티티 이름
        entity: String,
        /// 현재 상태
        from: TestStatus,
        /// 요청된 상태
        to: TestStatus,
    },

    /// 실행 단위 내 이름 중복
    #[error("duplicate entity name '{name}'")]
    DuplicateName { name: String },

    /// 빈 엔티티 이름
    #[error("entity name must not be empty")]
    EmptyName,

    /// 유효하지 않은 파라미터
    #[error("invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },
}

/// 태스크 제어 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// 시작되지 않은 태스크에 대한 kill/join 요청
    #[error("task {id} was never started")]
    NotStarted { id: TaskId },

    /// 이미 시작된 태스크에 대한 start 요청
    #[error("task {id} already started")]
    AlreadyStarted { id: TaskId },

    /// join 타임아웃
    #[error("task {id} did not finish within {timeout_ms}ms")]
    JoinTimeout { id: TaskId, timeout_ms: u128 },
}

/// 상태 원장 에러
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// 존재하지 않는 레코드
    #[error("unknown ledger record: {0}")]
    UnknownRecord(String),

    /// 저장소 쓰기 실패
    #[error("ledger write failed: {0}")]
    Write(String),

    /// 직렬화 실패
    #[error("ledger serialize failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 훅 실행 실패
///
/// 인프라 수준의 중단을 의미하며 테스트 결함으로 집계되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hook '{stage}' aborted: {reason}")]
pub struct HookError {
    /// 실패한 훅 단계 이름
    pub stage: String,
    /// 실패 사유
    pub reason: String,
}

impl HookError {
    /// 새 훅 에러를 생성합니다.
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// 단계(pre/main/post) 본문 실행 에러
///
/// 엔티티 본문은 이 타입으로 실패를 보고합니다.
/// - `Hook` → 인프라 문제 (`NotRun`으로 분류)
/// - `Failure` → 일반 테스트 실패 (`ConfigError`/`Fail`로 분류)
/// - `Cancelled` → 취소 토큰 관측 (`Killed`로 분류)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    /// 훅 수준 중단
    #[error("{0}")]
    Hook(#[from] HookError),

    /// 일반 실패
    #[error("{0}")]
    Failure(String),

    /// 취소됨
    #[error("cancelled")]
    Cancelled,
}

impl PhaseError {
    /// 일반 실패를 생성합니다.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    /// 훅 수준 실패 여부
    pub fn is_hook(&self) -> bool {
        matches!(self, Self::Hook(_))
    }

    /// 취소 여부
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_error_display_includes_stage() {
        let err = HookError::new("before_pre_test", "console unreachable");
        assert_eq!(
            err.to_string(),
            "hook 'before_pre_test' aborted: console unreachable"
        );
    }

    #[test]
    fn phase_error_classification() {
        let hook: PhaseError = HookError::new("after_procedure", "x").into();
        assert!(hook.is_hook());
        assert!(!hook.is_cancelled());

        let fail = PhaseError::failure("link down");
        assert!(!fail.is_hook());
        assert_eq!(fail.to_string(), "link down");

        assert!(PhaseError::Cancelled.is_cancelled());
    }

    #[test]
    fn validation_error_converts_to_top_level() {
        let err: RigcheckError = ValidationError::DuplicateName {
            name: "ping".to_owned(),
        }
        .into();
        assert!(matches!(err, RigcheckError::Validation(_)));
        assert!(err.to_string().contains("ping"));
    }

    #[test]
    fn invalid_transition_display() {
        let err = ValidationError::InvalidTransition {
            entity: "io-read".to_owned(),
            from: TestStatus::NotRun,
            to: TestStatus::Pass,
        };
        assert_eq!(
            err.to_string(),
            "entity 'io-read': transition NotRun -> Pass is not allowed"
        );
    }

    #[test]
    fn task_error_display() {
        let err = TaskError::NotStarted { id: TaskId::new(42) };
        assert_eq!(err.to_string(), "task 42 was never started");
    }
}
