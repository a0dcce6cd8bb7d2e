//! rigcheck.toml 통합 설정 테스트
//!
//! - rigcheck.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use std::time::Duration;

use rigcheck_core::config::RigcheckConfig;
use rigcheck_core::error::{ConfigError, RigcheckError};

const EXAMPLE: &str = include_str!("../../../rigcheck.toml.example");

// =============================================================================
// rigcheck.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = RigcheckConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert!(config.general.log_dir.is_empty());
}

#[test]
fn example_config_passes_validation() {
    let config = RigcheckConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let from_file = RigcheckConfig::parse(EXAMPLE).expect("should parse");
    let from_code = RigcheckConfig::default();

    // 예시 파일의 모든 값이 코드 Default 구현과 일치하는지 확인
    assert_eq!(from_file.general.log_level, from_code.general.log_level);
    assert_eq!(from_file.general.log_format, from_code.general.log_format);
    assert_eq!(from_file.general.log_dir, from_code.general.log_dir);

    assert_eq!(from_file.run.stop_on_error, from_code.run.stop_on_error);
    assert_eq!(from_file.run.parallel, from_code.run.parallel);
    assert_eq!(from_file.run.poll_interval_ms, from_code.run.poll_interval_ms);
    assert_eq!(
        from_file.run.snapshot_interval_secs,
        from_code.run.snapshot_interval_secs
    );
    assert_eq!(from_file.run.kill_grace_ms, from_code.run.kill_grace_ms);

    assert_eq!(from_file.ledger.backend, from_code.ledger.backend);
    assert_eq!(from_file.ledger.path, from_code.ledger.path);
}

#[test]
fn example_config_durations() {
    let config = RigcheckConfig::parse(EXAMPLE).expect("should parse");

    assert_eq!(config.run.poll_interval(), Duration::from_secs(1));
    assert_eq!(config.run.snapshot_interval(), Duration::from_secs(300));
    assert_eq!(config.run.kill_grace(), Duration::from_secs(5));
}

// =============================================================================
// 부분 설정 로딩 테스트
// =============================================================================

#[test]
fn partial_config_run_only() {
    let toml = r#"
[run]
stop_on_error = true
parallel = false
kill_grace_ms = 200
"#;
    let config = RigcheckConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert!(config.run.stop_on_error);
    assert!(!config.run.parallel);
    assert_eq!(config.run.kill_grace(), Duration::from_millis(200));
    // 나머지는 기본값
    assert_eq!(config.run.poll_interval_ms, 1_000);
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.ledger.backend, "memory");
}

#[test]
fn partial_config_jsonl_ledger() {
    let toml = r#"
[ledger]
backend = "jsonl"
path = "/var/lib/rigcheck/ledger.jsonl"
"#;
    let config = RigcheckConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.ledger.backend, "jsonl");
    assert_eq!(config.ledger.path, "/var/lib/rigcheck/ledger.jsonl");
}

#[test]
fn jsonl_ledger_without_path_fails_validation() {
    let config = RigcheckConfig::parse("[ledger]\nbackend = \"jsonl\"\n").expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("ledger.path"));
}

#[test]
fn zero_poll_interval_fails_validation() {
    let config = RigcheckConfig::parse("[run]\npoll_interval_ms = 0\n").expect("should parse");
    assert!(matches!(
        config.validate(),
        Err(RigcheckError::Config(ConfigError::InvalidValue { ref field, .. }))
            if field == "run.poll_interval_ms"
    ));
}

#[test]
fn unknown_log_format_fails_validation() {
    let config =
        RigcheckConfig::parse("[general]\nlog_format = \"xml\"\n").expect("should parse");
    assert!(config.validate().is_err());
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

/// 환경변수를 설정한 상태로 `f`를 실행하고 원래 값을 복원합니다.
fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var(key, value);
    }

    let result = f();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let result = with_env("RIGCHECK_GENERAL_LOG_LEVEL", "error", || {
        let mut config = RigcheckConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let result = with_env("RIGCHECK_RUN_STOP_ON_ERROR", "true", || {
        let mut config = RigcheckConfig::default();
        config.apply_env_overrides();
        config.run.stop_on_error
    });

    assert!(result);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let result = with_env("RIGCHECK_RUN_KILL_GRACE_MS", "750", || {
        let mut config = RigcheckConfig::default();
        config.apply_env_overrides();
        config.run.kill_grace_ms
    });

    assert_eq!(result, 750);
}

#[test]
#[serial_test::serial]
fn env_override_unparsable_value_is_ignored() {
    let result = with_env("RIGCHECK_RUN_POLL_INTERVAL_MS", "fast", || {
        let mut config = RigcheckConfig::parse("[run]\npoll_interval_ms = 20\n").expect("parse");
        config.apply_env_overrides();
        config.run.poll_interval_ms
    });

    assert_eq!(result, 20);
}

// =============================================================================
// 빈 파일 / 잘못된 형식 에러 테스트
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = RigcheckConfig::parse("").expect("empty should parse");
    assert_eq!(config.general.log_level, "info");
    assert!(config.run.parallel);
}

#[test]
fn comments_only_parses_with_defaults() {
    let config = RigcheckConfig::parse("# nothing here\n# at all\n").expect("should parse");
    assert_eq!(config.run.kill_grace_ms, 5_000);
}

#[test]
fn malformed_toml_returns_parse_error() {
    let result = RigcheckConfig::parse("[run\nparallel = true");
    assert!(matches!(
        result,
        Err(RigcheckError::Config(ConfigError::ParseFailed { .. }))
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let result = RigcheckConfig::parse("[run]\npoll_interval_ms = \"soon\"\n");
    assert!(result.is_err(), "string for u64 should fail");
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = RigcheckConfig::from_file("/nonexistent/rigcheck.toml").await;
    assert!(matches!(
        result,
        Err(RigcheckError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[tokio::test]
async fn load_config_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rigcheck.toml");
    tokio::fs::write(&path, "[run]\nstop_on_error = true\n")
        .await
        .expect("write config");

    let config = RigcheckConfig::from_file(&path).await.expect("should load");
    assert!(config.run.stop_on_error);
}

// =============================================================================
// 직렬화 라운드트립 테스트
// =============================================================================

#[test]
fn serialize_and_reparse_keeps_values() {
    let mut config = RigcheckConfig::default();
    config.run.stop_on_error = true;
    config.ledger.backend = "jsonl".to_owned();
    config.ledger.path = "ledger.jsonl".to_owned();

    let text = toml::to_string_pretty(&config).expect("serialize");
    let reparsed = RigcheckConfig::parse(&text).expect("reparse");

    assert!(reparsed.run.stop_on_error);
    assert_eq!(reparsed.ledger.path, "ledger.jsonl");
    reparsed.validate().expect("still valid");
}
