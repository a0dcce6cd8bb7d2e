//! 실행 레지스트리 — 스케줄러 레벨별 태스크와 상태 스냅샷
//!
//! 태스크 ID에서 엔티티 이름, 엔티티 객체, 로그 파일, 제어 핸들로의 대응과
//! 엔티티 이름별 상태 스냅샷을 보관합니다. 읽기/쓰기는 모두 `RwLock`을 거칩니다.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use rigcheck_core::status::TestStatus;
use rigcheck_core::types::{StatusSnapshot, TaskId};

use crate::entity::TestEntity;
use crate::task::TaskHandle;

/// 등록된 태스크 정보
#[derive(Clone)]
pub struct TaskEntry {
    /// 태스크 ID
    pub task_id: TaskId,
    /// 엔티티 이름
    pub name: String,
    /// 엔티티
    pub entity: Arc<TestEntity>,
    /// 엔티티 로그 파일 이름
    pub log_file: String,
    /// 태스크 제어 핸들
    pub handle: TaskHandle,
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, TaskEntry>,
    snapshot_order: Vec<String>,
    snapshots: HashMap<String, StatusSnapshot>,
}

/// 스케줄러 레벨 하나의 실행 레지스트리
pub struct RunRegistry {
    level: String,
    inner: RwLock<RegistryInner>,
}

impl RunRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// 레벨 이름 (`root`, `group:<name>`)
    pub fn level(&self) -> &str {
        &self.level
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- 태스크 ---

    /// 태스크를 등록합니다.
    pub fn register_task(&self, entry: TaskEntry) {
        let mut inner = self.write();
        if !inner.tasks.contains_key(&entry.task_id) {
            inner.order.push(entry.task_id);
        }
        inner.tasks.insert(entry.task_id, entry);
    }

    /// 태스크 정보를 조회합니다.
    pub fn task(&self, task_id: TaskId) -> Option<TaskEntry> {
        self.read().tasks.get(&task_id).cloned()
    }

    /// 등록 순서대로 모든 태스크
    pub fn tasks(&self) -> Vec<TaskEntry> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    /// 아직 살아 있는 태스크
    pub fn alive_tasks(&self) -> Vec<TaskEntry> {
        self.tasks()
            .into_iter()
            .filter(|entry| entry.handle.is_alive())
            .collect()
    }

    /// 등록된 태스크 수
    pub fn task_count(&self) -> usize {
        self.read().tasks.len()
    }

    // --- 스냅샷 ---

    /// 엔티티를 `NotRun` 스냅샷으로 추적 시작합니다. 이미 있으면 무시합니다.
    pub fn track(&self, name: &str) {
        let mut inner = self.write();
        if !inner.snapshots.contains_key(name) {
            inner.snapshot_order.push(name.to_owned());
            inner
                .snapshots
                .insert(name.to_owned(), StatusSnapshot::not_run(name));
        }
    }

    /// 스냅샷을 갱신합니다. 추적 중이 아니면 새로 추가합니다.
    pub fn update_snapshot(
        &self,
        name: &str,
        status: TestStatus,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) {
        let mut inner = self.write();
        if !inner.snapshots.contains_key(name) {
            inner.snapshot_order.push(name.to_owned());
        }
        inner.snapshots.insert(
            name.to_owned(),
            StatusSnapshot {
                name: name.to_owned(),
                status,
                start_time,
                end_time,
            },
        );
    }

    /// 엔티티 상태를 그대로 스냅샷에 반영합니다.
    pub fn sync_snapshot(&self, entity: &TestEntity) {
        let state = entity.state();
        self.update_snapshot(entity.name(), state.status, state.start_time, state.end_time);
    }

    /// 이름으로 스냅샷을 조회합니다.
    pub fn snapshot(&self, name: &str) -> Option<StatusSnapshot> {
        self.read().snapshots.get(name).cloned()
    }

    /// 추적 순서대로 모든 스냅샷
    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        let inner = self.read();
        inner
            .snapshot_order
            .iter()
            .filter_map(|name| inner.snapshots.get(name).cloned())
            .collect()
    }
}

impl std::fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("RunRegistry")
            .field("level", &self.level)
            .field("tasks", &inner.tasks.len())
            .field("snapshots", &inner.snapshots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcheck_core::error::PhaseError;

    use crate::entity::TestCase;
    use crate::task::{CancellableTask, TaskContext};

    struct Noop;

    impl TestCase for Noop {
        async fn procedure(&self, _ctx: &TaskContext) -> Result<(), PhaseError> {
            Ok(())
        }
    }

    #[test]
    fn track_keeps_first_snapshot() {
        let registry = RunRegistry::new("root");
        registry.track("a");
        registry.update_snapshot("a", TestStatus::Running, Some(Utc::now()), None);
        registry.track("a");
        registry.track("b");

        let all = registry.snapshots();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, TestStatus::Running);
        assert_eq!(all[1], StatusSnapshot::not_run("b"));
    }

    #[test]
    fn sync_snapshot_copies_entity_state() {
        let registry = RunRegistry::new("root");
        let entity = TestEntity::case("ping", Noop);
        entity.record_outcome(TestStatus::Running).unwrap();
        registry.sync_snapshot(&entity);
        assert_eq!(registry.snapshot("ping").unwrap().status, TestStatus::Running);
    }

    #[tokio::test]
    async fn tasks_are_listed_in_registration_order() {
        let registry = RunRegistry::new("group:io");
        let mut ids = Vec::new();
        for name in ["first", "second", "third"] {
            let task = CancellableTask::new(name, |_ctx| async { Ok::<_, String>(()) });
            ids.push(task.id());
            registry.register_task(TaskEntry {
                task_id: task.id(),
                name: name.to_owned(),
                entity: Arc::new(TestEntity::case(name, Noop)),
                log_file: format!("case_{name}.log"),
                handle: task.handle(),
            });
        }

        let listed: Vec<TaskId> = registry.tasks().iter().map(|e| e.task_id).collect();
        assert_eq!(listed, ids);
        assert_eq!(registry.task_count(), 3);
        // 시작하지 않은 태스크는 살아 있지 않음
        assert!(registry.alive_tasks().is_empty());
        assert_eq!(registry.task(ids[1]).unwrap().name, "second");
    }
}
