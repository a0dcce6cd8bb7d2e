//! rigcheck 실행 엔진
//!
//! 테스트 엔티티 트리를 스케줄링하고 실행합니다.
//!
//! # 구성
//! - [`task`]: 취소 가능한 태스크 ([`CancellableTask`], [`TaskContext`], [`TaskHandle`])
//! - [`entity`]: 엔티티 상태 기계와 본문 trait ([`TestEntity`], [`TestCase`], [`Configuration`])
//! - [`phase`]: pre → main → post 단계 실행기 ([`PhaseRunner`])
//! - [`group`]: 웨이브 스케줄링과 그룹 상태 집계 ([`GroupScheduler`], [`aggregate_status`])
//! - [`monitor`]: 생존 감시와 stop-on-error 연쇄 종료 ([`LivenessMonitor`])
//! - [`registry`]: 레벨별 태스크/스냅샷 레지스트리 ([`RunRegistry`])
//! - [`engine`]: 실행 진입점 ([`Engine`])
//! - [`report`]: 실행 결과와 상태 표 ([`RunReport`])
//!
//! # 사용 예시
//! ```no_run
//! use rigcheck_engine::{Engine, RunEnv, RunOptions, TaskContext, TestCase, TestEntity};
//! use rigcheck_core::error::PhaseError;
//!
//! struct Ping;
//!
//! impl TestCase for Ping {
//!     async fn procedure(&self, ctx: &TaskContext) -> Result<(), PhaseError> {
//!         ctx.checkpoint()
//!     }
//! }
//!
//! # async fn demo() -> Result<(), rigcheck_core::error::RigcheckError> {
//! let mut engine = Engine::new(RunEnv::new(RunOptions::default()));
//! let report = engine
//!     .run(vec![TestEntity::case("ping", Ping)], RunOptions::default())
//!     .await?;
//! println!("{}", report.status_table());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod entity;
pub mod env;
pub mod group;
pub mod monitor;
pub mod phase;
pub mod registry;
pub mod report;
pub mod task;

pub use engine::Engine;
pub use entity::{
    ConfigMode, Configuration, DynConfiguration, DynTestCase, EntityKind, EntityState, TestCase,
    TestEntity,
};
pub use env::{RunEnv, RunOptions};
pub use group::{GroupScheduler, ScheduleOutcome, aggregate_status};
pub use monitor::{LivenessMonitor, MonitorOutcome, MonitoredTask, ScanStep};
pub use phase::{ExecContext, ExecMode, PhaseRunner};
pub use registry::{RunRegistry, TaskEntry};
pub use report::{EntityReport, RunReport, render_status_table};
pub use task::{CancellableTask, KillOutcome, TaskContext, TaskHandle, allocate_task_id};
