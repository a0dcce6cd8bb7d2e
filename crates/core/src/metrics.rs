//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다.
//! 엔진은 이 상수로 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다. 레코더가 설치되지 않으면
//! 기록은 무시됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `rigcheck_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 최종 상태 레이블 키 (Pass, Fail, ...)
pub const LABEL_STATUS: &str = "status";

/// 엔티티 종류 레이블 키 (case, group, configuration)
pub const LABEL_KIND: &str = "kind";

/// kill 결과 레이블 키 (cooperative, aborted, unresponsive)
pub const LABEL_OUTCOME: &str = "outcome";

// ─── 엔진 메트릭 ───────────────────────────────────────────────────

/// 최종 상태에 도달한 엔티티 수 (counter, labels: status, kind)
pub const ENTITIES_COMPLETED_TOTAL: &str = "rigcheck_entities_completed_total";

/// 엔티티 실행 시간 (histogram, 초, label: kind)
pub const ENTITY_DURATION_SECONDS: &str = "rigcheck_entity_duration_seconds";

/// 현재 실행 중인 태스크 수 (gauge)
pub const TASKS_RUNNING: &str = "rigcheck_tasks_running";

/// stop-on-error 연쇄 종료 발생 횟수 (counter)
pub const CASCADES_TOTAL: &str = "rigcheck_cascades_total";

/// 연쇄 종료로 kill된 태스크 수 (counter, label: outcome)
pub const TASKS_KILLED_TOTAL: &str = "rigcheck_tasks_killed_total";

/// 훅 실패 횟수 (counter)
pub const HOOK_FAILURES_TOTAL: &str = "rigcheck_hook_failures_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        ENTITIES_COMPLETED_TOTAL,
        "Test entities that reached a final status"
    );
    describe_histogram!(
        ENTITY_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock duration of one entity lifecycle"
    );
    describe_gauge!(TASKS_RUNNING, "Entity tasks currently alive");
    describe_counter!(CASCADES_TOTAL, "Stop-on-error cascades triggered");
    describe_counter!(TASKS_KILLED_TOTAL, "Entity tasks killed by a cascade");
    describe_counter!(HOOK_FAILURES_TOTAL, "Hook invocations that aborted");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            ENTITIES_COMPLETED_TOTAL,
            ENTITY_DURATION_SECONDS,
            TASKS_RUNNING,
            CASCADES_TOTAL,
            TASKS_KILLED_TOTAL,
            HOOK_FAILURES_TOTAL,
        ] {
            assert!(name.starts_with("rigcheck_"), "{name}");
        }
    }

    #[test]
    fn describe_without_recorder_is_noop() {
        describe_all();
    }
}
