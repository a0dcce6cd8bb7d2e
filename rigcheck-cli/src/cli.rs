//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// rigcheck -- concurrent test-bench orchestrator.
///
/// Use `rigcheck <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "rigcheck", version, about, long_about = None)]
pub struct Cli {
    /// Path to the rigcheck.toml configuration file.
    #[arg(short, long, default_value = "rigcheck.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a test plan.
    Run(RunArgs),

    /// Check a test plan without running it.
    Validate(ValidateArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Execute a test plan and print the status table.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the TOML test plan.
    pub plan: PathBuf,

    /// Kill siblings and skip remaining entities on the first failure.
    #[arg(long)]
    pub stop_on_error: bool,

    /// Allow or forbid concurrent execution of `parallel` entities.
    #[arg(long)]
    pub parallel: Option<bool>,
}

// ---- validate ----

/// Parse a test plan, check names and required fields, and print the tree.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the TOML test plan.
    pub plan: PathBuf,
}

// ---- config ----

/// Manage rigcheck configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, run, ledger).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::try_parse_from(["rigcheck", "run", "plan.toml"]).expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("rigcheck.toml"));
        assert_eq!(cli.output, OutputFormat::Text);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.plan, PathBuf::from("plan.toml"));
                assert!(!args.stop_on_error, "stop_on_error should default to false");
                assert!(args.parallel.is_none(), "parallel should defer to config");
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "rigcheck",
            "run",
            "plan.toml",
            "--stop-on-error",
            "--parallel",
            "false",
            "--output",
            "json",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert!(args.stop_on_error);
                assert_eq!(args.parallel, Some(false));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_requires_plan() {
        let result = Cli::try_parse_from(["rigcheck", "run"]);
        assert!(result.is_err(), "run without a plan should be rejected");
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["rigcheck", "validate", "bench.toml"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Validate(args) => assert_eq!(args.plan, PathBuf::from("bench.toml")),
            _ => panic!("expected Validate command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from([
            "rigcheck",
            "-c",
            "/etc/rigcheck.toml",
            "config",
            "show",
            "--section",
            "run",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/etc/rigcheck.toml"));
        match cli.command {
            Commands::Config(ConfigArgs {
                action: ConfigAction::Show { section },
            }) => assert_eq!(section.as_deref(), Some("run")),
            _ => panic!("expected Config Show command"),
        }
    }

    #[test]
    fn test_cli_parse_global_log_level_after_subcommand() {
        let cli = Cli::try_parse_from(["rigcheck", "config", "validate", "--log-level", "debug"])
            .expect("parse succeeded");
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_rejects_unknown_output_format() {
        let result = Cli::try_parse_from(["rigcheck", "--output", "yaml", "validate", "p.toml"]);
        assert!(result.is_err(), "unknown output format should be rejected");
    }
}
