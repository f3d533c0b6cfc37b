//! Duplex channel wire messages
//!
//! JSON messages exchanged with the remote agent backend over the
//! WebSocket. The backend drives execution; the sandbox answers every
//! `execute_code` with exactly one of `execution_result` or
//! `execution_error` per execution id.

use crate::types::{CodeBlock, ExecutionId, ExecutionResult, FileInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    // Backend -> sandbox
    ExecuteCode {
        execution_id: ExecutionId,
        task_id: String,
        work_dir: String,
        code_blocks: Vec<CodeBlock>,
        /// Wall-clock budget in seconds for the whole request
        timeout: u64,
    },
    WriteFile {
        work_dir: String,
        path: String,
        content: String,
    },
    InstallPackages {
        work_dir: String,
        packages: Vec<String>,
    },
    Ping,

    // Sandbox -> backend
    /// Sent immediately on receipt of `execute_code`, before any work starts
    ExecutionAck {
        execution_id: ExecutionId,
    },
    ExecutionResult {
        execution_id: ExecutionId,
        result: ExecutionResult,
    },
    FilesCreated {
        execution_id: ExecutionId,
        files: Vec<FileInfo>,
    },
    ExecutionError {
        execution_id: ExecutionId,
        error: String,
    },
    InstallComplete {
        packages: Vec<String>,
        success: bool,
        failed: Vec<String>,
    },
    Pong,
}
