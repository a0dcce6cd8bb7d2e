//! Command handlers -- one module per subcommand

pub mod config;
pub mod run;
pub mod validate;

use std::path::Path;

use rigcheck_core::config::RigcheckConfig;

use crate::cli::Commands;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Effective configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RigcheckConfig,
    /// Config file path, or `None` when only defaults and env were used.
    pub source: Option<String>,
}

impl LoadedConfig {
    pub fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or("(defaults)")
    }
}

/// Load the effective configuration.
///
/// A missing file falls back to defaults with environment overrides applied.
/// `log_level` (from `--log-level`) wins over both file and environment.
pub async fn load_config(path: &Path, log_level: Option<&str>) -> Result<LoadedConfig, CliError> {
    let (mut config, source) = if tokio::fs::try_exists(path).await? {
        (
            RigcheckConfig::load(path).await?,
            Some(path.display().to_string()),
        )
    } else {
        let mut config = RigcheckConfig::default();
        config.apply_env_overrides();
        (config, None)
    };

    if let Some(level) = log_level {
        config.general.log_level = level.to_owned();
    }
    config.validate()?;
    Ok(LoadedConfig { config, source })
}

/// Dispatch a parsed subcommand.
pub async fn dispatch(
    command: Commands,
    loaded: LoadedConfig,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match command {
        Commands::Run(args) => run::execute(args, &loaded.config, writer).await,
        Commands::Validate(args) => validate::execute(args, writer).await,
        Commands::Config(args) => config::execute(args, &loaded, config_path, writer).await,
    }
}
