//! Core data model for sandbox execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique execution identifier, assigned per request and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of agent-submitted source code plus its language tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeBlock {
    pub code: String,
    pub language: String,
}

impl CodeBlock {
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
        }
    }
}

/// A file created or modified by an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the working directory root
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// MIME type looked up from the extension
    pub mime: String,

    /// md5 hex digest, populated only for binary extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Result of one `execute_code_blocks` call (covers all blocks up to the
/// first failure, or all of them on success)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code of the last attempted block (0 = success, 124 = timeout)
    pub exit_code: i32,

    /// Interleaved stdout+stderr of all executed blocks, in order
    pub output: String,

    /// Source file of the last attempted block
    pub code_file: PathBuf,

    /// New or modified files detected after the run
    pub files_created: Vec<FileInfo>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execution lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Durable record of one execution, keyed by its id in the ledger.
///
/// Lifecycle: created `pending` when the request is accepted, `running` once
/// the first block starts, then exactly one terminal transition to
/// `completed` (with `result`) or `failed` (with `error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingExecution {
    pub execution_id: ExecutionId,
    pub task_id: String,
    pub work_dir: PathBuf,
    pub code_blocks: Vec<CodeBlock>,
    pub timeout_secs: u64,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PendingExecution {
    pub fn new(
        execution_id: ExecutionId,
        task_id: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        code_blocks: Vec<CodeBlock>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            execution_id,
            task_id: task_id.into(),
            work_dir: work_dir.into(),
            code_blocks,
            timeout_secs,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Whether the record has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed
        )
    }
}
