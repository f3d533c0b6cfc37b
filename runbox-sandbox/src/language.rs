//! Closed language table for interpreter dispatch

use crate::environment::PythonEnv;
use std::path::PathBuf;

/// Languages the sandbox can execute. Adding one is a variant plus its
/// `parse`/`extension`/`interpreter` table entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Bash,
}

impl Language {
    /// Map a case-insensitive language tag to a known language. Unknown
    /// tags are a terminal error for the block that carries them.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Self::Python),
            "bash" | "sh" | "shell" => Some(Self::Bash),
            _ => None,
        }
    }

    /// File extension for generated filenames; unknown tags fall back to
    /// `txt` (the file is still written for inspection).
    pub fn extension(tag: &str) -> &'static str {
        match Self::parse(tag) {
            Some(Self::Python) => "py",
            Some(Self::Bash) => "sh",
            None => "txt",
        }
    }

    /// The interpreter to run a block with: the venv's python for Python,
    /// the system bash for shell blocks.
    pub fn interpreter(&self, env: &PythonEnv) -> PathBuf {
        match self {
            Self::Python => env.python_path(),
            Self::Bash => PathBuf::from("bash"),
        }
    }
}
