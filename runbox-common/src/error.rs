//! Sandbox error taxonomy
//!
//! Everything that can go wrong inside one execution is folded into the
//! aggregated output and a non-zero exit code; only validation and setup
//! errors escape an `execute_code_blocks` call as these variants.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// Malformed request: missing fields, bad package name, unsupported
    /// language. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Virtual environment creation or setup failed. Fatal for the working
    /// directory until fixed (baseline package installs are not: those are
    /// logged and swallowed).
    #[error("environment error: {0}")]
    Environment(String),

    /// A block exceeded its wall-clock budget. Callers map this to exit
    /// code 124.
    #[error("execution timed out after {0} seconds")]
    Timeout(u64),

    /// The interpreter or shell itself could not be launched.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Distinguished "not found" condition for workspace file reads.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// Whether this error belongs to the 400 class (caller mistake, not
    /// retryable) rather than the sandbox's own failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, SandboxError::Validation(_))
    }
}
