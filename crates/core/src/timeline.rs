//! 타임라인 스냅샷 싱크
//!
//! 생존 감시 루프가 주기적으로 현재 상태 스냅샷을 내보냅니다.
//! 보고서 렌더링은 이 trait의 구현체가 담당합니다.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::types::StatusSnapshot;

/// 타임라인 스냅샷 수신자
pub trait TimelineSink: Send + Sync {
    /// 스케줄러 레벨(`level`)의 상태 스냅샷을 받습니다.
    fn snapshot(&self, level: &str, entries: &[StatusSnapshot]);
}

/// 스냅샷을 `tracing` 로그로 남기는 기본 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTimeline;

impl TimelineSink for TracingTimeline {
    fn snapshot(&self, level: &str, entries: &[StatusSnapshot]) {
        for entry in entries {
            info!(
                level,
                entity = %entry.name,
                status = %entry.status,
                start = ?entry.start_time,
                end = ?entry.end_time,
                "timeline snapshot"
            );
        }
    }
}

/// 받은 스냅샷을 메모리에 쌓아두는 싱크 (테스트/보고서 후처리용)
#[derive(Debug, Default)]
pub struct RecordingTimeline {
    snapshots: Mutex<Vec<(String, Vec<StatusSnapshot>)>>,
}

impl RecordingTimeline {
    /// 빈 싱크를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 받은 스냅샷 횟수
    pub fn count(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 마지막 스냅샷
    pub fn last(&self) -> Option<(String, Vec<StatusSnapshot>)> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl TimelineSink for RecordingTimeline {
    fn snapshot(&self, level: &str, entries: &[StatusSnapshot]) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level.to_owned(), entries.to_vec()));
    }
}
