//! 상태 모델 — 테스트 엔티티의 상태 토큰과 전이 규칙
//!
//! # 상태 전이
//! ```text
//! NotRun ──> Running ──> Pass | Fail | ConfigError | NotRun | Killed
//!                        | Configured | DeConfigured | Incomplete
//! ```
//!
//! `Fail`, `ConfigError`, `Killed`는 고착(sticky) 상태입니다. 한번 기록되면
//! 일반 기록 경로로는 바뀌지 않으며, 명시적인 강제 경로(cascade kill)만
//! 상태를 `Killed`로 옮길 수 있습니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// 테스트 엔티티 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    /// 실행되지 않음 (초기 상태, 또는 훅 실패로 정상 시작하지 못함)
    NotRun,
    /// 실행 중
    Running,
    /// 통과
    Pass,
    /// 본문 실패
    Fail,
    /// pre 단계 또는 설정 적용 실패
    ConfigError,
    /// 취소됨
    Killed,
    /// 설정 적용 완료
    Configured,
    /// 설정 제거 완료
    DeConfigured,
    /// 그룹 전용 파생 상태 — 일부 자식이 완료되지 않음
    Incomplete,
}

impl TestStatus {
    /// 인식되는 모든 상태 토큰
    pub const ALL: [TestStatus; 9] = [
        Self::NotRun,
        Self::Running,
        Self::Pass,
        Self::Fail,
        Self::ConfigError,
        Self::Killed,
        Self::Configured,
        Self::DeConfigured,
        Self::Incomplete,
    ];

    /// 상태 토큰 문자열
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRun => "NotRun",
            Self::Running => "Running",
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::ConfigError => "ConfigError",
            Self::Killed => "Killed",
            Self::Configured => "Configured",
            Self::DeConfigured => "DeConfigured",
            Self::Incomplete => "Incomplete",
        }
    }

    /// 종료 상태 여부
    ///
    /// `NotRun`, `Running`, `Incomplete`는 종료 상태가 아닙니다.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::NotRun | Self::Running | Self::Incomplete)
    }

    /// 고착 상태 여부 (`Fail`, `ConfigError`, `Killed`)
    pub fn is_sticky(self) -> bool {
        matches!(self, Self::Fail | Self::ConfigError | Self::Killed)
    }

    /// stop-on-error 연쇄 종료를 유발하는 상태인지 여부
    pub fn triggers_stop_on_error(self) -> bool {
        matches!(self, Self::Fail | Self::ConfigError)
    }

    /// 통과 계열 상태 여부
    pub fn is_success(self) -> bool {
        matches!(self, Self::Pass | Self::Configured | Self::DeConfigured)
    }

    /// 일반 기록 경로에서 `self -> next` 전이가 허용되는지 확인합니다.
    ///
    /// 같은 상태로의 기록은 항상 허용됩니다(no-op).
    pub fn can_transition_to(self, next: TestStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::NotRun => next == Self::Running,
            Self::Running => next != Self::Running,
            _ => false,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownStatus {
                token: s.to_owned(),
            })
    }
}

/// post 단계 상태
///
/// 전체 상태와 별도로 post 단계의 진행을 추적합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostStatus {
    /// 실행되지 않음
    #[default]
    NotRun,
    /// 실행 중
    Running,
    /// 통과
    Pass,
    /// 실패
    Fail,
}

impl PostStatus {
    /// 상태 토큰 문자열
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRun => "NotRun",
            Self::Running => "Running",
            Self::Pass => "Pass",
            Self::Fail => "Fail",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
