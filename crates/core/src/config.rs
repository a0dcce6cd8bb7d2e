//! 설정 관리 — rigcheck.toml 파싱 및 런타임 설정
//!
//! [`RigcheckConfig`]는 로깅, 실행 정책, 상태 원장 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`RIGCHECK_RUN_STOP_ON_ERROR=true` 형식)
//! 3. 설정 파일 (`rigcheck.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), rigcheck_core::error::RigcheckError> {
//! use rigcheck_core::config::RigcheckConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = RigcheckConfig::load("rigcheck.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = RigcheckConfig::parse("[run]\nstop_on_error = true")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, RigcheckError};

/// rigcheck 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigcheckConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 실행 정책 설정
    #[serde(default)]
    pub run: RunConfig,
    /// 상태 원장 설정
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl RigcheckConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RigcheckError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RigcheckError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RigcheckError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                RigcheckError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, RigcheckError> {
        toml::from_str(toml_str).map_err(|e| {
            RigcheckError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `RIGCHECK_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "RIGCHECK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "RIGCHECK_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.log_dir, "RIGCHECK_GENERAL_LOG_DIR");

        // Run
        override_bool(&mut self.run.stop_on_error, "RIGCHECK_RUN_STOP_ON_ERROR");
        override_bool(&mut self.run.parallel, "RIGCHECK_RUN_PARALLEL");
        override_u64(
            &mut self.run.poll_interval_ms,
            "RIGCHECK_RUN_POLL_INTERVAL_MS",
        );
        override_u64(
            &mut self.run.snapshot_interval_secs,
            "RIGCHECK_RUN_SNAPSHOT_INTERVAL_SECS",
        );
        override_u64(&mut self.run.kill_grace_ms, "RIGCHECK_RUN_KILL_GRACE_MS");

        // Ledger
        override_string(&mut self.ledger.backend, "RIGCHECK_LEDGER_BACKEND");
        override_string(&mut self.ledger.path, "RIGCHECK_LEDGER_PATH");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RigcheckError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.run.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "run.poll_interval_ms".to_owned(),
                reason: "must be greater than zero".to_owned(),
            }
            .into());
        }

        if self.run.snapshot_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "run.snapshot_interval_secs".to_owned(),
                reason: "must be greater than zero".to_owned(),
            }
            .into());
        }

        let valid_backends = ["memory", "jsonl"];
        if !valid_backends.contains(&self.ledger.backend.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "ledger.backend".to_owned(),
                reason: format!("must be one of: {}", valid_backends.join(", ")),
            }
            .into());
        }

        if self.ledger.backend == "jsonl" && self.ledger.path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ledger.path".to_owned(),
                reason: "path must not be empty when backend is jsonl".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 엔티티별 로그 파일 디렉토리 (비어 있으면 파일을 만들지 않음)
    pub log_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            log_dir: String::new(),
        }
    }
}

/// 실행 정책 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 첫 실패 시 나머지 작업을 모두 종료
    pub stop_on_error: bool,
    /// parallel 플래그가 붙은 엔티티의 병렬 실행 허용
    pub parallel: bool,
    /// 생존 감시 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 타임라인 스냅샷 주기 (초)
    pub snapshot_interval_secs: u64,
    /// kill 시 협조적 취소를 기다리는 시간 (밀리초)
    pub kill_grace_ms: u64,
}

impl RunConfig {
    /// 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 스냅샷 주기
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    /// kill 유예 시간
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            parallel: true,
            poll_interval_ms: 1_000,
            snapshot_interval_secs: 300,
            kill_grace_ms: 5_000,
        }
    }
}

/// 상태 원장 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// 백엔드 (memory, jsonl)
    pub backend: String,
    /// jsonl 백엔드 파일 경로
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            path: String::new(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
