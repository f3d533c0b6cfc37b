//! Scoped file access under one working directory
//!
//! Backs the backend's `write_file` requests and the front-end's file
//! browser. Every relative path is normalized and bound-checked against the
//! root; anything that would escape it is rejected up front.

use runbox_common::{Result, SandboxError};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// File read/write/list scoped strictly under a working directory
#[derive(Debug, Clone)]
pub struct WorkspaceFiles {
    root: PathBuf,
}

impl WorkspaceFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied relative path, rejecting absolute paths
    /// and any `..` traversal out of the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel.is_absolute() {
            return Err(SandboxError::Validation(format!(
                "absolute paths are not allowed: {relative}"
            )));
        }

        let mut resolved = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(SandboxError::Validation(format!(
                        "path escapes the working directory: {relative}"
                    )))
                }
            }
        }
        Ok(resolved)
    }

    /// Write `content`, creating parent directories as needed.
    pub async fn write_file(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content).await?;
        Ok(())
    }

    /// Read a file; a missing file is the distinguished `NotFound` error.
    pub async fn read_file(&self, relative: &str) -> Result<String> {
        let path = self.resolve(relative)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SandboxError::NotFound(path))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// List files under `subdir` (relative paths, dot-directories skipped).
    /// A missing subdirectory lists as empty rather than erroring.
    pub async fn list_files(&self, subdir: &str) -> Result<Vec<String>> {
        let dir = self.resolve(subdir)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let root = self.root.clone();
        let mut files: Vec<String> = WalkDir::new(&dir)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && e.file_name().to_str().is_some_and(|n| n.starts_with('.')))
            })
            .flatten()
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(&root)
                    .unwrap_or(e.path())
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        files.sort();
        Ok(files)
    }
}
