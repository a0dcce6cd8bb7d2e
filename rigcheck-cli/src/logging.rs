//! Process-wide log output for `rigcheck`.
//!
//! Run logs (entity started/finished, cascades, hook failures) are written
//! to stderr so that stdout carries only the rendered report. Per-entity
//! log files are a separate concern handled by the engine's log sink.

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rigcheck_core::config::GeneralConfig;

/// Shape of run log lines on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for CI log collectors.
    Json,
    /// Multi-line colored events, for a developer watching a run.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
        }
    }
}

/// Level filter for run logs.
///
/// `RUST_LOG` wins when set, so a single run can be made noisier
/// without editing `rigcheck.toml`.
fn level_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'")),
    }
}

/// Install the global subscriber from `[general] log_level / log_format`.
///
/// Call once, after the configuration is loaded and before a command runs.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format: LogFormat = config.log_format.parse()?;
    let filter = level_filter(&config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.with_context(|| format!("failed to install {format:?} log subscriber"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_known_names() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("JSON".parse::<LogFormat>().is_err());
    }

    #[test]
    fn unknown_format_is_rejected_before_install() {
        let config = GeneralConfig {
            log_format: "xml".to_owned(),
            ..GeneralConfig::default()
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(err.to_string().contains("unknown log format 'xml'"));
    }
}
