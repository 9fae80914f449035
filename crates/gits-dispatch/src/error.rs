// error.rs - Error types for dispatch and single invocations.
//
// DispatchError is fatal and raised before anything is spawned.
// InvokeError belongs to one target and is recorded, never propagated.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use gits_policy::PolicyError;
use thiserror::Error;

/// Errors that abort a whole dispatch up front.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The command was rejected by the allow-list.
    #[error(transparent)]
    PolicyViolation(#[from] PolicyError),

    /// The configured executable could not be found on PATH.
    #[error("executable '{program}' not found: {source}")]
    ExecutableNotFound {
        program: String,
        source: which::Error,
    },
}

/// Errors from a single process invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The process did not finish before its deadline and was killed.
    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The process ran and exited unsuccessfully.
    #[error("{status}")]
    Exit { status: ExitStatus },

    /// The process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    /// Waiting on the process or writing its output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The worker running this invocation panicked.
    #[error("invocation panicked")]
    Panicked,
}

/// One target's failure within a dispatch.
#[derive(Debug, Error)]
#[error("[{target}]: {error}")]
pub struct TargetFailure {
    pub target: String,
    #[source]
    pub error: InvokeError,
}
