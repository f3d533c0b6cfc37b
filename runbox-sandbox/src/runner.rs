//! Process runner for single code blocks
//!
//! Spawns the interpreter rooted at the working directory with the venv's
//! executables first on the search path, streams stdout and stderr as they
//! arrive, and enforces a wall-clock timeout: SIGTERM at the deadline,
//! SIGKILL five seconds later if the process is still alive.

use crate::environment::PythonEnv;
use runbox_common::{Result, SandboxError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Grace period between the termination signal and the hard kill
const KILL_GRACE: Duration = Duration::from_secs(5);

/// One streamed chunk of child output, for live display
#[derive(Debug, Clone)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

impl OutputChunk {
    pub fn text(&self) -> &str {
        match self {
            OutputChunk::Stdout(s) | OutputChunk::Stderr(s) => s,
        }
    }
}

/// Normal completion of one child process
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub output: String,
}

/// Runs interpreter processes for one working directory
#[derive(Debug, Clone)]
pub struct CommandRunner {
    work_dir: PathBuf,
    venv_path: PathBuf,
    bin_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(env: &PythonEnv) -> Self {
        Self {
            work_dir: env.work_dir().to_path_buf(),
            venv_path: env.venv_path().to_path_buf(),
            bin_dir: env.bin_dir(),
        }
    }

    /// Execute `program args` with a bounded lifetime.
    ///
    /// stdout and stderr are interleaved, in arrival order per stream, into
    /// the returned output buffer; each chunk is also forwarded to the
    /// optional live channel. A timeout resolves as
    /// `SandboxError::Timeout`, a spawn failure as `SandboxError::Spawn`;
    /// both are distinct from a script's own non-zero exit.
    pub async fn run(
        &self,
        program: &Path,
        args: &[PathBuf],
        timeout: Duration,
        live: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<RunOutcome> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.work_dir)
            .env("PATH", self.search_path())
            .env("PYTHONUNBUFFERED", "1")
            .env("MPLBACKEND", "Agg")
            .env("VIRTUAL_ENV", &self.venv_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                command: program.display().to_string(),
                source,
            })?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<OutputChunk>(128);

        if let Some(stdout) = child.stdout.take() {
            let tx = chunk_tx.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(mut line)) = reader.next_line().await {
                    line.push('\n');
                    if tx.send(OutputChunk::Stdout(line)).await.is_err() {
                        break;
                    }
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let tx = chunk_tx.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(mut line)) = reader.next_line().await {
                    line.push('\n');
                    if tx.send(OutputChunk::Stderr(line)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(chunk_tx);

        let collector = tokio::spawn(async move {
            let mut buf = String::new();
            while let Some(chunk) = chunk_rx.recv().await {
                buf.push_str(chunk.text());
                if let Some(tx) = &live {
                    let _ = tx.send(chunk).await;
                }
            }
            buf
        });

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                warn!(%err, "wait on child process failed");
                return Err(err.into());
            }
            Err(_) => {
                self.terminate(&mut child).await;
                None
            }
        };

        // Readers finish once the pipes close
        let output = collector.await.unwrap_or_default();

        match status {
            Some(status) => {
                let exit_code = status.code().unwrap_or(1);
                debug!(exit_code, "process finished");
                Ok(RunOutcome { exit_code, output })
            }
            None => Err(SandboxError::Timeout(timeout.as_secs())),
        }
    }

    /// Venv executables shadow the system ones for child processes.
    fn search_path(&self) -> std::ffi::OsString {
        let current = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![self.bin_dir.clone()];
        paths.extend(std::env::split_paths(&current));
        std::env::join_paths(paths).unwrap_or(current)
    }

    /// Graceful termination, then a hard kill after the grace period.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                return;
            }
            warn!(pid, "process ignored SIGTERM; sending SIGKILL");
        }

        let _ = child.kill().await;
    }
}
