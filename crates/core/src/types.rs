//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 엔진과 외부 협력자(원장, 로그 싱크, 타임라인)가 공유하는 데이터 구조를 정의합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::TestStatus;

/// `Send` 가능한 boxed future
///
/// dyn-compatible trait에서 비동기 메서드를 표현할 때 사용합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 태스크 식별자
///
/// OS 스레드 ID와 별개인 프로세스 고유 번호입니다.
/// 엔티티별 로그 파일은 이 값으로 연결됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// 원시 값으로 식별자를 생성합니다.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 원시 값을 반환합니다.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 엔티티 종류 태그
///
/// 원장의 `_what` 필드와 로그 파일 분류에 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKindTag {
    /// 개별 테스트 케이스
    Case,
    /// 자식 엔티티 묶음
    Group,
    /// 환경 적용/제거
    Configuration,
}

impl EntityKindTag {
    /// 원장/로그에 쓰이는 문자열 표현
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Group => "group",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for EntityKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 엔티티 상태 스냅샷
///
/// 엔티티 객체를 직접 건드리지 않고 다른 태스크에서 상태를 폴링할 때 사용합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// 엔티티 이름
    pub name: String,
    /// 마지막으로 관측된 상태
    pub status: TestStatus,
    /// 시작 시각
    pub start_time: Option<DateTime<Utc>>,
    /// 종료 시각
    pub end_time: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// 아직 실행되지 않은 엔티티의 스냅샷을 생성합니다.
    pub fn not_run(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TestStatus::NotRun,
            start_time: None,
            end_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_display_is_raw_number() {
        assert_eq!(TaskId::new(918_273).to_string(), "918273");
        assert_eq!(TaskId::new(7).get(), 7);
    }

    #[test]
    fn kind_tag_serializes_lowercase() {
        let json = serde_json::to_string(&EntityKindTag::Configuration).unwrap();
        assert_eq!(json, "\"configuration\"");
        assert_eq!(EntityKindTag::Group.to_string(), "group");
    }

    #[test]
    fn snapshot_not_run_has_no_timestamps() {
        let snap = StatusSnapshot::not_run("ping");
        assert_eq!(snap.status, TestStatus::NotRun);
        assert!(snap.start_time.is_none());
        assert!(snap.end_time.is_none());
    }
}
