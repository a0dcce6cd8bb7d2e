//! `rigcheck run` command handler

use std::io::Write;
use std::sync::Arc;

use tracing::{info, warn};

use rigcheck_core::config::RigcheckConfig;
use rigcheck_core::error::RigcheckError;
use rigcheck_core::ledger::{JsonlLedger, MemoryLedger, StatusLedger};
use rigcheck_core::logsink::{FileLogSink, LogSink, TracingLogSink};
use rigcheck_engine::{Engine, RunEnv, RunOptions, RunReport};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, paint_status};
use crate::plan::RunPlan;

/// Execute the `run` command.
///
/// Ctrl-C cancels the root context: running entities observe cancellation,
/// their post phases still run, and remaining entities are skipped.
pub async fn execute(
    args: RunArgs,
    config: &RigcheckConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let plan = RunPlan::load(&args.plan).await?;
    let entities = plan.build()?;
    let hooks = plan.hooks()?;
    let options = run_options(config, &args);

    info!(
        plan = %args.plan.display(),
        entities = plan.entity_count(),
        hooks = hooks.len(),
        "plan loaded"
    );

    let env = build_env(config, options.clone())?.with_hooks(Arc::new(hooks));
    let mut engine = Engine::new(env);

    let cancel = engine.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });
    let result = engine.run(entities, options).await;
    interrupt.abort();

    let report = result?;
    writer.render(&report)?;
    outcome(&report)
}

/// Merge CLI flags over the `[run]` section.
pub fn run_options(config: &RigcheckConfig, args: &RunArgs) -> RunOptions {
    let mut options = RunOptions::from(&config.run);
    if args.stop_on_error {
        options.stop_on_error = true;
    }
    if let Some(parallel) = args.parallel {
        options.parallel = parallel;
    }
    options
}

/// Build the execution environment from `[general]` and `[ledger]`.
pub fn build_env(config: &RigcheckConfig, options: RunOptions) -> Result<RunEnv, CliError> {
    let ledger: Arc<dyn StatusLedger> = match config.ledger.backend.as_str() {
        "jsonl" => Arc::new(JsonlLedger::open(&config.ledger.path).map_err(RigcheckError::from)?),
        _ => Arc::new(MemoryLedger::new()),
    };
    let logs: Arc<dyn LogSink> = if config.general.log_dir.is_empty() {
        Arc::new(TracingLogSink)
    } else {
        Arc::new(FileLogSink::new(&config.general.log_dir)?)
    };
    Ok(RunEnv::new(options).with_ledger(ledger).with_log_sink(logs))
}

/// Map a finished run to the command result.
pub fn outcome(report: &RunReport) -> Result<(), CliError> {
    if report.aborted {
        return Err(CliError::Aborted(
            report.trigger.clone().unwrap_or_else(|| "unknown".to_owned()),
        ));
    }
    if !report.is_success() {
        return Err(CliError::RunFailed(report.status));
    }
    Ok(())
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        write!(w, "{}", self.status_table())?;
        writeln!(w)?;

        let counts = self
            .counts()
            .into_iter()
            .map(|(status, count)| format!("{status}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            w,
            "Result: {} in {:.2}s ({})",
            paint_status(self.status),
            self.duration_secs(),
            counts
        )?;
        if self.aborted {
            writeln!(
                w,
                "{} stop-on-error triggered by {}",
                "ABORTED:".red().bold(),
                self.trigger.as_deref().unwrap_or("unknown")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::Utc;
    use rigcheck_core::status::TestStatus;

    fn report(status: TestStatus, aborted: bool, trigger: Option<&str>) -> RunReport {
        let started_at = Utc::now();
        RunReport {
            status,
            aborted,
            trigger: trigger.map(str::to_owned),
            started_at,
            finished_at: started_at + chrono::Duration::seconds(2),
            entities: Vec::new(),
        }
    }

    fn args(stop_on_error: bool, parallel: Option<bool>) -> RunArgs {
        RunArgs {
            plan: PathBuf::from("plan.toml"),
            stop_on_error,
            parallel,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = RigcheckConfig::default();
        config.run.parallel = true;
        config.run.kill_grace_ms = 250;

        let options = run_options(&config, &args(true, Some(false)));
        assert!(options.stop_on_error);
        assert!(!options.parallel);
        assert_eq!(options.kill_grace.as_millis(), 250);

        let options = run_options(&config, &args(false, None));
        assert!(!options.stop_on_error);
        assert!(options.parallel);
    }

    #[test]
    fn test_outcome_maps_report() {
        assert!(outcome(&report(TestStatus::Pass, false, None)).is_ok());
        assert!(matches!(
            outcome(&report(TestStatus::Incomplete, false, None)),
            Err(CliError::RunFailed(TestStatus::Incomplete))
        ));
        assert!(matches!(
            outcome(&report(TestStatus::Fail, true, Some("ping"))),
            Err(CliError::Aborted(trigger)) if trigger == "ping"
        ));
    }

    #[test]
    fn test_render_text_summary_line() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        report(TestStatus::Fail, true, Some("ping"))
            .render_text(&mut buffer)
            .unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("Result: Fail in 2.00s"), "output: {output}");
        assert!(output.contains("ABORTED: stop-on-error triggered by ping"));
    }

    #[test]
    fn test_jsonl_backend_opens_ledger_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RigcheckConfig::default();
        config.ledger.backend = "jsonl".to_owned();
        config.ledger.path = dir.path().join("ledger.jsonl").display().to_string();
        config.general.log_dir = dir.path().join("logs").display().to_string();

        build_env(&config, RunOptions::default()).expect("env should build");
        assert!(dir.path().join("logs").is_dir());
    }
}
