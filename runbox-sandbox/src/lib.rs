//! Runbox sandbox - local code execution for remote AI agents
//!
//! Executes agent-generated Python and Bash code blocks inside an isolated
//! per-working-directory virtual environment, tracking filesystem side
//! effects and persisting execution lifecycle across restarts.

pub mod environment;
pub mod executor;
pub mod fsdiff;
pub mod language;
pub mod ledger;
pub mod naming;
pub mod runner;
pub mod workspace;

pub use environment::{InstallReport, PythonEnv};
pub use executor::{validate_request, CodeExecutor, DEFAULT_TIMEOUT_SECS};
pub use fsdiff::{diff, snapshot, FileMeta, Snapshot};
pub use language::Language;
pub use ledger::{ExecutionLedger, LedgerStats};
pub use runner::{CommandRunner, OutputChunk, RunOutcome};
pub use workspace::WorkspaceFiles;

/// Re-export the shared data model and error types
pub use runbox_common::{
    CodeBlock, ExecutionId, ExecutionResult, ExecutionStatus, FileInfo, PendingExecution, Result,
    SandboxError,
};
