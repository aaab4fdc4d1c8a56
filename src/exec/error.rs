//! Failure taxonomy for the usage fetch pipeline.
//!
//! Every variant is recoverable at the poll-loop level: the monitor classifies
//! the failure, records it, and schedules a retry. Nothing here is fatal.

use thiserror::Error;

/// Errors produced while resolving, running, or decoding a usage fetch
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The command could not be resolved to an executable file
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// The command ran but exited with a non-zero status
    #[error("command exited with status {0}")]
    ExecutionFailed(i32),

    /// The command could not be executed due to missing permissions
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The command exited successfully but produced no stdout
    #[error("command produced no output")]
    NoOutput,

    /// The command did not exit within the configured timeout
    #[error("command timed out after {0}s")]
    Timeout(u64),

    /// stdout was empty or whitespace-only
    #[error("empty response")]
    EmptyResponse,

    /// stdout was not valid JSON (includes truncated output)
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A usage fetch was already in flight; concurrent calls are rejected
    #[error("a usage fetch is already in progress")]
    ExecutionInProgress,
}
