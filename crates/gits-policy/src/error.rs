// error.rs - Error types for the policy subsystem.

use thiserror::Error;

/// Errors raised when a command fails the policy check.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// No command was supplied at all.
    #[error("no command given")]
    EmptyCommand,

    /// The first argument is not on the allow-list.
    #[error("command '{command}' is not allowed (allowed: {allowed})")]
    NotAllowed { command: String, allowed: String },
}
