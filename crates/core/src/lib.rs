//! rigcheck 공통 크레이트
//!
//! 테스트 실행 엔진과 그 협력자들이 공유하는 타입을 정의합니다.
//!
//! - [`status`]: 상태 토큰과 전이 규칙
//! - [`error`]: 에러 분류 (검증, 훅, 단계, 태스크, 원장)
//! - [`config`]: `rigcheck.toml` 설정
//! - [`hooks`], [`ledger`], [`logsink`], [`timeline`]: 외부 협력자 trait과 기본 구현
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod logsink;
pub mod metrics;
pub mod status;
pub mod timeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ConfigError, HookError, LedgerError, PhaseError, RigcheckError, TaskError, ValidationError,
};

// 설정
pub use config::RigcheckConfig;

// 상태
pub use status::{PostStatus, TestStatus};

// 협력자
pub use hooks::{FnHooks, HookRunner, HookStage, HookTarget, NoopHooks};
pub use ledger::{JsonlLedger, LedgerFields, LedgerStage, MemoryLedger, StatusLedger};
pub use logsink::{FileLogSink, LogSink, TracingLogSink};
pub use timeline::{RecordingTimeline, TimelineSink, TracingTimeline};

// 도메인 타입
pub use types::{BoxFuture, EntityKindTag, StatusSnapshot, TaskId};
