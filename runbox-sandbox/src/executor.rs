//! Execution orchestrator
//!
//! Runs an ordered list of code blocks strictly sequentially (later blocks
//! may depend on files produced by earlier ones), stops at the first
//! failure, and brackets the run with filesystem snapshots so partial
//! artifacts are reported even when a block fails.

use crate::environment::PythonEnv;
use crate::fsdiff;
use crate::language::Language;
use crate::naming;
use crate::runner::{CommandRunner, OutputChunk};
use runbox_common::{CodeBlock, ExecutionResult, Result, SandboxError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{info, instrument};

/// Default wall-clock budget for one request: 24 hours
pub const DEFAULT_TIMEOUT_SECS: u64 = 86_400;

/// Validate the local invocation surface: non-empty work dir, a non-empty
/// block list, and every block carrying both code and language.
pub fn validate_request(work_dir: &str, blocks: &[CodeBlock]) -> Result<()> {
    if work_dir.trim().is_empty() {
        return Err(SandboxError::Validation("workDir is required".into()));
    }
    if blocks.is_empty() {
        return Err(SandboxError::Validation(
            "codeBlocks array is required".into(),
        ));
    }
    for block in blocks {
        if block.code.is_empty() || block.language.is_empty() {
            return Err(SandboxError::Validation(
                "each code block must have code and language".into(),
            ));
        }
    }
    Ok(())
}

/// Orchestrates execution of code blocks for one working directory.
///
/// The working directory and its venv are exclusively owned by this
/// executor for the duration of one `execute_code_blocks` call; overlapping
/// calls against the same directory must be serialized by the caller.
pub struct CodeExecutor {
    env: PythonEnv,
    runner: CommandRunner,
}

impl CodeExecutor {
    pub fn new(work_dir: impl AsRef<str>) -> Self {
        let env = PythonEnv::new(work_dir);
        let runner = CommandRunner::new(&env);
        Self { env, runner }
    }

    pub fn work_dir(&self) -> &Path {
        self.env.work_dir()
    }

    pub fn env(&self) -> &PythonEnv {
        &self.env
    }

    /// Execute the blocks in order, stopping at the first non-zero exit.
    ///
    /// Per-block failures (script exit, timeout mapped to 124, spawn
    /// errors) are folded into the aggregated output and exit code so the
    /// caller always gets a well-formed result; only validation and
    /// environment-setup errors reject the call itself.
    #[instrument(skip_all, fields(work_dir = %self.env.work_dir().display(), blocks = blocks.len()))]
    pub async fn execute_code_blocks(
        &self,
        blocks: &[CodeBlock],
        timeout: Duration,
        live: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<ExecutionResult> {
        self.env.ensure_ready().await?;

        let before = fsdiff::snapshot(self.work_dir());

        let mut output = String::new();
        let mut exit_code = 0;
        let mut code_file = PathBuf::new();

        for block in blocks {
            let filename = naming::resolve(
                &block.code,
                &block.language,
                chrono::Utc::now().timestamp_millis(),
            );
            code_file = self.work_dir().join("codebase").join(&filename);
            fs::write(&code_file, &block.code).await?;

            let Some(language) = Language::parse(&block.language) else {
                output.push_str(&format!("Unsupported language: {}\n", block.language));
                exit_code = 1;
                break;
            };

            let program = language.interpreter(&self.env);
            info!(file = %code_file.display(), ?language, "executing block");

            match self
                .runner
                .run(&program, &[code_file.clone()], timeout, live.clone())
                .await
            {
                Ok(outcome) => {
                    output.push_str(&outcome.output);
                    exit_code = outcome.exit_code;
                    if exit_code != 0 {
                        break;
                    }
                }
                Err(SandboxError::Timeout(secs)) => {
                    output.push_str(&format!("\nExecution timed out after {secs} seconds"));
                    exit_code = 124;
                    break;
                }
                Err(err) => {
                    output.push_str(&format!("\nExecution error: {err}"));
                    exit_code = 1;
                    break;
                }
            }
        }

        // Always diff, even after a failure: partial artifacts are reported
        let after = fsdiff::snapshot(self.work_dir());
        let files_created = fsdiff::diff(&before, &after, self.work_dir());

        info!(exit_code, files = files_created.len(), "execution finished");

        Ok(ExecutionResult {
            exit_code,
            output,
            code_file,
            files_created,
        })
    }

    /// Delete user files older than `max_age_days`. The venv and the other
    /// denylisted directories are never touched; deletion errors on
    /// individual files are ignored. Returns the number of files removed.
    pub async fn cleanup(&self, max_age_days: u64) -> usize {
        let max_age = Duration::from_secs(max_age_days * 86_400);
        let now = std::time::SystemTime::now();
        let mut deleted = 0;
        for (path, meta) in fsdiff::snapshot(self.work_dir()) {
            let stale = now
                .duration_since(meta.mtime)
                .is_ok_and(|age| age > max_age);
            if stale && fs::remove_file(&path).await.is_ok() {
                deleted += 1;
            }
        }
        deleted
    }
}
