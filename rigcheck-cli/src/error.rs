//! CLI-specific error types and exit code mapping

use rigcheck_core::error::RigcheckError;
use rigcheck_core::status::TestStatus;

use crate::plan::PlanError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The test plan could not be loaded or is malformed.
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    /// The run finished but did not pass.
    #[error("run finished with status {0}")]
    RunFailed(TestStatus),

    /// Stop-on-error fired at the top level.
    #[error("run aborted by stop-on-error (trigger: {0})")]
    Aborted(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from rigcheck-core.
    #[error("{0}")]
    Core(#[from] RigcheckError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | Run failed, aborted, or command error    |
    /// | 2    | Configuration error                      |
    /// | 3    | Test plan error                          |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(RigcheckError::Config(_)) => 2,
            Self::Plan(_) | Self::Core(RigcheckError::Validation(_)) => 3,
            Self::Io(_) | Self::Core(RigcheckError::Io(_)) => 10,
            Self::RunFailed(_)
            | Self::Aborted(_)
            | Self::Command(_)
            | Self::JsonSerialize(_)
            | Self::Core(_) => 1,
        }
    }
}
