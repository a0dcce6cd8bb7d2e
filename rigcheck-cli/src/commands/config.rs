//! `rigcheck config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::commands::LoadedConfig;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Sections accepted by `config show --section`.
const SECTIONS: [&str; 3] = ["general", "run", "ledger"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    loaded: &LoadedConfig,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(loaded, writer),
        ConfigAction::Show { section } => execute_show(loaded, config_path, section, writer),
    }
}

/// Report a configuration that already passed loading and validation.
fn execute_validate(loaded: &LoadedConfig, writer: &OutputWriter) -> Result<(), CliError> {
    info!(source = loaded.source_label(), "configuration is valid");
    writer.render(&ConfigValidationReport {
        source: loaded.source_label().to_owned(),
        valid: true,
        errors: Vec::new(),
    })
}

/// Render the failure report for `config validate` and return the error to exit with.
///
/// Called before logging is initialized, since the configuration that
/// drives logging is the thing that failed.
pub fn report_invalid(config_path: &Path, error: CliError, writer: &OutputWriter) -> CliError {
    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: false,
        errors: vec![error.to_string()],
    };
    match writer.render(&report) {
        Ok(()) => CliError::Config("configuration is invalid".to_owned()),
        Err(render_error) => render_error,
    }
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults).
///
/// # Errors
///
/// Returns `CliError::Command` if the section name is invalid.
fn execute_show(
    loaded: &LoadedConfig,
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "showing configuration");
    let config = &loaded.config;

    let config_toml = match section.as_deref() {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("run") => toml::to_string_pretty(&config.run),
        Some("ledger") => toml::to_string_pretty(&config.ledger),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    }
    .unwrap_or_else(|e| format!("(serialization error: {})", e));

    writer.render(&ConfigReport {
        source: loaded.source_label().to_owned(),
        section,
        config_toml,
    })
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path, or `(defaults)`
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
