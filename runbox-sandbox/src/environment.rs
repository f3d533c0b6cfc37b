//! Per-working-directory Python environment
//!
//! Each working directory owns exactly one virtual environment at
//! `<work_dir>/.venv`, created on first use (the existence check makes the
//! setup idempotent) along with the fixed `codebase/`, `data/` and `chats/`
//! subdirectories.

use regex::Regex;
use runbox_common::{Result, SandboxError};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Packages installed into every fresh environment. Install failure here is
/// non-fatal: the venv stays usable for code that doesn't need them.
const BASELINE_PACKAGES: [&str; 4] = ["numpy", "matplotlib", "pandas", "scipy"];

/// Per-package pip install budget
const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Conservative shape for names handed to pip: bare name, optional extras,
/// optional version constraint. Anything else is rejected before any
/// installer process is spawned.
fn package_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]+(\[.+\])?([<>=!]+[A-Za-z0-9._-]+)?$").unwrap()
    })
}

/// Outcome of a batch package install
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub success: bool,
    pub output: String,
    pub failed: Vec<String>,
}

/// Manages the virtual environment for one working directory
#[derive(Debug, Clone)]
pub struct PythonEnv {
    work_dir: PathBuf,
    venv_path: PathBuf,
}

impl PythonEnv {
    /// Create a handle for `work_dir`, expanding a leading `~`.
    pub fn new(work_dir: impl AsRef<str>) -> Self {
        let work_dir = expand_home(work_dir.as_ref());
        let venv_path = work_dir.join(".venv");
        Self {
            work_dir,
            venv_path,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn venv_path(&self) -> &Path {
        &self.venv_path
    }

    /// Directory holding the venv's executables
    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_path.join("Scripts")
        } else {
            self.venv_path.join("bin")
        }
    }

    pub fn python_path(&self) -> PathBuf {
        self.bin_dir().join(if cfg!(windows) {
            "python.exe"
        } else {
            "python"
        })
    }

    pub fn pip_path(&self) -> PathBuf {
        self.bin_dir().join(if cfg!(windows) { "pip.exe" } else { "pip" })
    }

    /// Create the working directory tree and the virtual environment.
    ///
    /// Idempotent: directories are created recursively and the venv only
    /// when absent. Venv creation failure is an `Environment` error;
    /// baseline package failure is logged and swallowed.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.ensure_dirs().await?;

        if !self.venv_path.exists() {
            info!(venv = %self.venv_path.display(), "creating Python virtual environment");
            let output = Command::new("python3")
                .arg("-m")
                .arg("venv")
                .arg(&self.venv_path)
                .output()
                .await
                .map_err(|e| {
                    SandboxError::Environment(format!("failed to run python3: {e}"))
                })?;

            if !output.status.success() {
                return Err(SandboxError::Environment(format!(
                    "venv creation failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            if let Err(err) = self.bootstrap_packages().await {
                warn!(%err, "baseline package install failed; continuing");
            }
        }

        Ok(())
    }

    /// Create the working directory and its fixed subdirectories.
    pub async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.work_dir).await?;
        for sub in ["codebase", "data", "chats"] {
            fs::create_dir_all(self.work_dir.join(sub)).await?;
        }
        Ok(())
    }

    async fn bootstrap_packages(&self) -> Result<()> {
        self.run_pip(&["install", "--upgrade", "pip"]).await?;
        let mut args = vec!["install"];
        args.extend(BASELINE_PACKAGES);
        self.run_pip(&args).await?;
        info!("baseline packages installed");
        Ok(())
    }

    async fn run_pip(&self, args: &[&str]) -> Result<String> {
        let pip = self.pip_path();
        debug!(?args, "running pip");
        let run = Command::new(&pip)
            .args(args)
            .current_dir(&self.work_dir)
            .output();
        let output = tokio::time::timeout(INSTALL_TIMEOUT, run)
            .await
            .map_err(|_| SandboxError::Timeout(INSTALL_TIMEOUT.as_secs()))?
            .map_err(|source| SandboxError::Spawn {
                command: pip.display().to_string(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(text)
        } else {
            Err(SandboxError::Environment(text))
        }
    }

    /// Install packages one at a time; one failure does not abort the rest.
    ///
    /// Every name is validated against the conservative pattern first; any
    /// non-matching entry rejects the whole request before a single
    /// installer process is spawned.
    pub async fn install_packages(&self, names: &[String]) -> Result<InstallReport> {
        for name in names {
            if !package_name_pattern().is_match(name) {
                return Err(SandboxError::Validation(format!(
                    "invalid package name: {name}"
                )));
            }
        }

        let mut output = String::new();
        let mut failed = Vec::new();
        for name in names {
            match self.run_pip(&["install", name]).await {
                Ok(text) => output.push_str(&text),
                Err(err) => {
                    warn!(package = %name, %err, "package install failed");
                    output.push_str(&format!("{err}\n"));
                    failed.push(name.clone());
                }
            }
            output.push('\n');
        }

        Ok(InstallReport {
            success: failed.is_empty(),
            output,
            failed,
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}
