//! Shell-command entity bodies and hooks
//!
//! Each command line runs under `sh -c` with `kill_on_drop`, raced against the
//! owning task's cancellation token. Cancelling drops the child future, which
//! kills the process.

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use rigcheck_core::error::{HookError, PhaseError};
use rigcheck_core::hooks::{HookRunner, HookStage, HookTarget};
use rigcheck_core::types::BoxFuture;
use rigcheck_engine::{Configuration, TaskContext, TestCase};

/// Max bytes of stderr carried into a failure reason.
const STDERR_TAIL: usize = 512;

/// A single shell command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    line: String,
}

/// Why a shell command did not succeed.
#[derive(Debug)]
enum ShellFailure {
    Cancelled,
    Failed(String),
}

impl ShellCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    fn command(&self, envs: &[(&str, &str)]) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.line)
            .envs(envs.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run to completion, or until `cancelled` resolves.
    async fn execute(
        &self,
        envs: &[(&str, &str)],
        cancelled: impl Future<Output = ()>,
    ) -> Result<(), ShellFailure> {
        let child = self
            .command(envs)
            .spawn()
            .map_err(|e| ShellFailure::Failed(format!("failed to spawn `{}`: {e}", self.line)))?;

        tokio::select! {
            biased;
            () = cancelled => Err(ShellFailure::Cancelled),
            output = child.wait_with_output() => {
                let output = output
                    .map_err(|e| ShellFailure::Failed(format!("failed to wait for `{}`: {e}", self.line)))?;
                debug!(
                    command = %self.line,
                    status = %output.status,
                    stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
                    "command finished"
                );
                if output.status.success() {
                    Ok(())
                } else {
                    Err(ShellFailure::Failed(describe_failure(&self.line, &output)))
                }
            }
        }
    }

    /// Run as an entity phase body.
    pub async fn run(&self, ctx: &TaskContext, envs: &[(&str, &str)]) -> Result<(), PhaseError> {
        ctx.checkpoint()?;
        self.execute(envs, ctx.cancelled()).await.map_err(|e| match e {
            ShellFailure::Cancelled => PhaseError::Cancelled,
            ShellFailure::Failed(reason) => PhaseError::failure(reason),
        })
    }
}

fn describe_failure(line: &str, output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
        Some((idx, _)) => &stderr[idx..],
        None => stderr,
    };
    if tail.is_empty() {
        format!("`{line}` exited with {}", output.status)
    } else {
        format!("`{line}` exited with {}: {tail}", output.status)
    }
}

async fn run_optional(
    command: Option<&ShellCommand>,
    ctx: &TaskContext,
    name: &str,
) -> Result<(), PhaseError> {
    match command {
        Some(command) => command.run(ctx, &[("RIGCHECK_ENTITY", name)]).await,
        None => Ok(()),
    }
}

// ---- entity bodies ----

/// Test case whose phases are shell commands.
#[derive(Debug, Clone)]
pub struct ShellCase {
    pub name: String,
    pub pre: Option<ShellCommand>,
    pub procedure: ShellCommand,
    pub post: Option<ShellCommand>,
}

impl TestCase for ShellCase {
    async fn pre_test_case(&self, ctx: &TaskContext) -> Result<(), PhaseError> {
        run_optional(self.pre.as_ref(), ctx, &self.name).await
    }

    async fn procedure(&self, ctx: &TaskContext) -> Result<(), PhaseError> {
        run_optional(Some(&self.procedure), ctx, &self.name).await
    }

    async fn post_test_case(&self, ctx: &TaskContext) -> Result<(), PhaseError> {
        run_optional(self.post.as_ref(), ctx, &self.name).await
    }
}

/// Configuration whose apply/remove steps are shell commands.
#[derive(Debug, Clone)]
pub struct ShellConfiguration {
    pub name: String,
    pub apply: Option<ShellCommand>,
    pub remove: Option<ShellCommand>,
}

impl Configuration for ShellConfiguration {
    async fn run_configuration(&self, ctx: &TaskContext) -> Result<(), PhaseError> {
        run_optional(self.apply.as_ref(), ctx, &self.name).await
    }

    async fn de_configuration(&self, ctx: &TaskContext) -> Result<(), PhaseError> {
        run_optional(self.remove.as_ref(), ctx, &self.name).await
    }
}

// ---- hooks ----

/// Hook runner mapping stages to shell commands.
///
/// The command sees `RIGCHECK_HOOK_STAGE`, and for entity-level stages also
/// `RIGCHECK_ENTITY` and `RIGCHECK_ENTITY_KIND`.
#[derive(Debug, Clone, Default)]
pub struct ShellHooks {
    commands: BTreeMap<&'static str, ShellCommand>,
}

impl ShellHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, stage: HookStage, command: ShellCommand) -> Self {
        self.commands.insert(stage.as_str(), command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl HookRunner for ShellHooks {
    fn run_hooks<'a>(
        &'a self,
        stage: HookStage,
        entity: Option<&'a HookTarget>,
    ) -> BoxFuture<'a, Result<(), HookError>> {
        Box::pin(async move {
            let Some(command) = self.commands.get(stage.as_str()) else {
                return Ok(());
            };
            let mut envs = vec![("RIGCHECK_HOOK_STAGE", stage.as_str())];
            if let Some(target) = entity {
                envs.push(("RIGCHECK_ENTITY", target.name.as_str()));
                envs.push(("RIGCHECK_ENTITY_KIND", target.kind.as_str()));
            }
            command
                .execute(&envs, std::future::pending())
                .await
                .map_err(|e| match e {
                    ShellFailure::Failed(reason) => HookError::new(stage.as_str(), reason),
                    ShellFailure::Cancelled => HookError::new(stage.as_str(), "cancelled"),
                })
        })
    }
}
