//! 실행 환경 — 실행 옵션과 외부 협력자 묶음

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use rigcheck_core::config::RunConfig;
use rigcheck_core::hooks::{HookRunner, NoopHooks};
use rigcheck_core::ledger::{
    FIELD_NAME, FIELD_STAGE, FIELD_STATUS, FIELD_WHAT, LedgerFields, LedgerStage, MemoryLedger,
    StatusLedger,
};
use rigcheck_core::logsink::{LogSink, TracingLogSink};
use rigcheck_core::timeline::{TimelineSink, TracingTimeline};

use crate::entity::TestEntity;

/// 실행 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// 첫 `Fail`/`ConfigError`에서 형제를 종료하고 남은 실행을 건너뜀
    pub stop_on_error: bool,
    /// `false`이면 병렬 표시된 엔티티도 순차 실행
    pub parallel: bool,
    /// 생존 감시 폴링 간격
    pub poll_interval: Duration,
    /// 타임라인 스냅샷 간격
    pub snapshot_interval: Duration,
    /// kill 시 협조적 종료를 기다리는 시간
    pub kill_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            parallel: true,
            poll_interval: Duration::from_secs(1),
            snapshot_interval: Duration::from_secs(300),
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl From<&RunConfig> for RunOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            stop_on_error: config.stop_on_error,
            parallel: config.parallel,
            poll_interval: config.poll_interval(),
            snapshot_interval: config.snapshot_interval(),
            kill_grace: config.kill_grace(),
        }
    }
}

/// 엔진과 단계 실행기가 공유하는 실행 환경
///
/// 협력자는 모두 `Arc`로 보관되어 태스크마다 저렴하게 복제됩니다.
#[derive(Clone)]
pub struct RunEnv {
    /// 훅 실행기
    pub hooks: Arc<dyn HookRunner>,
    /// 상태 원장
    pub ledger: Arc<dyn StatusLedger>,
    /// 엔티티 로그 싱크
    pub logs: Arc<dyn LogSink>,
    /// 타임라인 싱크
    pub timeline: Arc<dyn TimelineSink>,
    /// 실행 옵션
    pub options: RunOptions,
}

impl RunEnv {
    /// 기본 협력자(`NoopHooks`, `MemoryLedger`, `TracingLogSink`, `TracingTimeline`)로 생성합니다.
    pub fn new(options: RunOptions) -> Self {
        Self {
            hooks: Arc::new(NoopHooks),
            ledger: Arc::new(MemoryLedger::new()),
            logs: Arc::new(TracingLogSink),
            timeline: Arc::new(TracingTimeline),
            options,
        }
    }

    /// 훅 실행기를 교체합니다.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn HookRunner>) -> Self {
        self.hooks = hooks;
        self
    }

    /// 상태 원장을 교체합니다.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn StatusLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// 로그 싱크를 교체합니다.
    #[must_use]
    pub fn with_log_sink(mut self, logs: Arc<dyn LogSink>) -> Self {
        self.logs = logs;
        self
    }

    /// 타임라인 싱크를 교체합니다.
    #[must_use]
    pub fn with_timeline(mut self, timeline: Arc<dyn TimelineSink>) -> Self {
        self.timeline = timeline;
        self
    }

    /// 실행 옵션을 교체합니다.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// 엔티티를 `init_case` 단계로 원장에 등록하고 uuid를 연결합니다.
    pub(crate) fn register_entity(&self, entity: &TestEntity) {
        if entity.status_uuid().is_some() {
            return;
        }
        let mut fields = LedgerFields::new();
        fields.insert(FIELD_NAME.to_owned(), entity.name().into());
        fields.insert(FIELD_WHAT.to_owned(), entity.kind_tag().as_str().into());
        fields.insert(FIELD_STATUS.to_owned(), entity.status().as_str().into());
        fields.insert(FIELD_STAGE.to_owned(), LedgerStage::InitCase.as_str().into());
        match self.ledger.save(fields) {
            Ok(uuid) => {
                entity.assign_status_uuid(uuid);
            }
            Err(e) => warn!(entity = entity.name(), error = %e, "failed to register entity in ledger"),
        }
    }

    /// 원장 레코드를 갱신합니다. 실패는 경고로만 남깁니다.
    pub(crate) fn persist(&self, entity: &TestEntity, fields: LedgerFields) {
        if entity.status_uuid().is_none() {
            self.register_entity(entity);
        }
        let Some(uuid) = entity.status_uuid() else {
            return;
        };
        if let Err(e) = self.ledger.update(uuid, fields) {
            warn!(entity = entity.name(), error = %e, "failed to update ledger record");
        }
    }

    /// 원장을 flush합니다. 실패는 경고로만 남깁니다.
    pub(crate) fn flush_ledger(&self) {
        if let Err(e) = self.ledger.flush() {
            warn!(error = %e, "failed to flush status ledger");
        }
    }
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

    #[test]
    fn options_follow_run_config() {
        let config = RunConfig {
            stop_on_error: true,
            parallel: false,
            poll_interval_ms: 250,
            snapshot_interval_secs: 60,
            kill_grace_ms: 100,
        };
        let options = RunOptions::from(&config);
        assert!(options.stop_on_error);
        assert!(!options.parallel);
        assert_eq!(options.poll_interval, Duration::from_millis(250));
        assert_eq!(options.snapshot_interval, Duration::from_secs(60));
        assert_eq!(options.kill_grace, Duration::from_millis(100));
    }

    #[test]
    fn default_options_match_config_defaults() {
        assert_eq!(RunOptions::default(), RunOptions::from(&RunConfig::default()));
    }

    #[test]
    fn register_then_persist_merges_fields() {
        let ledger = Arc::new(MemoryLedger::new());
        let env = RunEnv::new(RunOptions::default()).with_ledger(ledger.clone());
        let entity = TestEntity::case("ping", Noop);

        env.register_entity(&entity);
        let uuid = entity.status_uuid().unwrap().to_owned();
        let record = ledger.get(&uuid).unwrap();
        assert_eq!(record[FIELD_STAGE], "init_case");
        assert_eq!(record[FIELD_WHAT], "case");

        let mut fields = LedgerFields::new();
        fields.insert(FIELD_STATUS.to_owned(), "Running".into());
        env.persist(&entity, fields);
        let record = ledger.get(&uuid).unwrap();
        assert_eq!(record[FIELD_STATUS], "Running");
        assert_eq!(record[FIELD_NAME], "ping");
        assert_eq!(ledger.len(), 1);
    }
}
