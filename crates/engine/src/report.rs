//! 실행 보고서 — 엔티티별 결과와 상태 표

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use rigcheck_core::status::{PostStatus, TestStatus};
use rigcheck_core::types::{EntityKindTag, TaskId};

use crate::entity::TestEntity;

/// 엔티티 하나의 결과
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    /// 엔티티 이름
    pub name: String,
    /// 엔티티 종류
    pub kind: EntityKindTag,
    /// 트리 깊이 (최상위 = 0)
    pub depth: usize,
    /// 최종 상태
    pub status: TestStatus,
    /// post 단계 상태
    pub post_status: PostStatus,
    /// 실행한 태스크
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// 엔티티 로그 파일
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    /// 실패 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// 소요 시간 (초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// 시작 시각
    pub start_time: Option<DateTime<Utc>>,
    /// 종료 시각
    pub end_time: Option<DateTime<Utc>>,
    /// 누적 에러 수 (자손 포함)
    pub errors: u64,
    /// 누적 경고 수 (자손 포함)
    pub warnings: u64,
}

impl EntityReport {
    /// 엔티티의 현재 상태로 보고서 항목을 만듭니다.
    pub fn from_entity(entity: &TestEntity, depth: usize) -> Self {
        let state = entity.state();
        Self {
            name: entity.name().to_owned(),
            kind: entity.kind_tag(),
            depth,
            status: state.status,
            post_status: state.post_status,
            task_id: state.task_id,
            log_file: state.log_file,
            failure_reason: state.failure_reason,
            duration_secs: state.duration.map(|d| d.as_secs_f64()),
            start_time: state.start_time,
            end_time: state.end_time,
            errors: entity.counters().errors(),
            warnings: entity.counters().warnings(),
        }
    }
}

/// 엔티티 트리를 전위 순회하며 보고서 항목을 만듭니다.
pub fn collect_reports(roots: &[Arc<TestEntity>]) -> Vec<EntityReport> {
    fn visit(entity: &TestEntity, depth: usize, out: &mut Vec<EntityReport>) {
        out.push(EntityReport::from_entity(entity, depth));
        for child in entity.children() {
            visit(child, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    for root in roots {
        visit(root, 0, &mut out);
    }
    out
}

/// 실행 전체의 결과
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// 최상위 엔티티 집계 상태
    pub status: TestStatus,
    /// 최상위 stop-on-error로 실행이 중단되었는지 여부
    pub aborted: bool,
    /// 중단을 유발한 엔티티 (또는 훅 단계)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// 실행 시작 시각
    pub started_at: DateTime<Utc>,
    /// 실행 종료 시각
    pub finished_at: DateTime<Utc>,
    /// 전위 순서의 엔티티별 결과
    pub entities: Vec<EntityReport>,
}

impl RunReport {
    /// 전체 실행 시간 (초)
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }

    /// 중단 없이 `Pass`로 끝났는지 여부
    pub fn is_success(&self) -> bool {
        !self.aborted && self.status == TestStatus::Pass
    }

    /// 이름으로 엔티티 결과를 찾습니다.
    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// 상태별 엔티티 수
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entity in &self.entities {
            *counts.entry(entity.status.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// 상태 표를 렌더링합니다.
    pub fn status_table(&self) -> String {
        render_status_table(&self.entities)
    }
}

/// 엔티티 결과를 고정폭 상태 표로 렌더링합니다.
///
/// 자식 엔티티는 깊이만큼 들여쓰기 됩니다.
pub fn render_status_table(entities: &[EntityReport]) -> String {
    let names: Vec<String> = entities
        .iter()
        .map(|e| format!("{}{}", "  ".repeat(e.depth), e.name))
        .collect();
    let name_width = names.iter().map(String::len).max().unwrap_or(0).max(6);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:<13}  {:<12}  {:<7}  {:>9}  Reason",
        "Entity", "Kind", "Status", "Post", "Duration"
    );
    let _ = writeln!(out, "{}", "-".repeat(name_width + 56));
    for (entity, name) in entities.iter().zip(&names) {
        let duration = entity
            .duration_secs
            .map(|s| format!("{s:.2}s"))
            .unwrap_or_else(|| "-".to_owned());
        let _ = writeln!(
            out,
            "{:<name_width$}  {:<13}  {:<12}  {:<7}  {:>9}  {}",
            name,
            entity.kind.as_str(),
            entity.status.as_str(),
            entity.post_status.as_str(),
            duration,
            entity.failure_reason.as_deref().unwrap_or("")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcheck_core::error::PhaseError;

    use crate::entity::TestCase;
    use crate::task::TaskContext;

    struct Noop;

    impl TestCase for Noop {
        async fn procedure(&self, _ctx: &TaskContext) -> Result<(), PhaseError> {
            Ok(())
        }
    }

    fn tree() -> Vec<Arc<TestEntity>> {
        vec![
            Arc::new(TestEntity::group(
                "io",
                vec![TestEntity::case("io-read", Noop), TestEntity::case("io-write", Noop)],
            )),
            Arc::new(TestEntity::case("ping", Noop)),
        ]
    }

    #[test]
    fn collect_walks_preorder_with_depth() {
        let reports = collect_reports(&tree());
        let shape: Vec<(&str, usize)> = reports.iter().map(|r| (r.name.as_str(), r.depth)).collect();
        assert_eq!(shape, [("io", 0), ("io-read", 1), ("io-write", 1), ("ping", 0)]);
    }

    #[test]
    fn table_indents_children() {
        let table = render_status_table(&collect_reports(&tree()));
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("Entity"));
        assert!(lines[2].starts_with("io "));
        assert!(lines[3].starts_with("  io-read"));
        assert!(lines[4].starts_with("  io-write"));
        assert!(lines[5].starts_with("ping"));
    }

    #[test]
    fn counts_group_by_status() {
        let now = Utc::now();
        let report = RunReport {
            status: TestStatus::Incomplete,
            aborted: false,
            trigger: None,
            started_at: now,
            finished_at: now,
            entities: collect_reports(&tree()),
        };
        assert_eq!(report.counts()["NotRun"], 4);
        assert!(!report.is_success());
        assert_eq!(report.entity("ping").unwrap().kind, EntityKindTag::Case);
        assert_eq!(report.duration_secs(), 0.0);
    }
}
