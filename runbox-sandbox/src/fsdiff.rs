//! Filesystem diff engine
//!
//! Snapshots the working directory before and after execution and reports
//! the files an execution created or touched, with size, MIME type, and a
//! checksum for binary types (text changes always move mtime; binaries get
//! a checksum to defend against coarse mtime granularity).

use md5::{Digest, Md5};
use runbox_common::FileInfo;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// Directories never reported as user artifacts
const SKIP_DIRS: [&str; 4] = [".venv", "node_modules", "__pycache__", ".git"];

/// Extensions that get an md5 checksum in the report
const BINARY_EXTS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "pdf", "npy", "fits", "pkl"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub mtime: SystemTime,
    pub size: u64,
}

pub type Snapshot = HashMap<PathBuf, FileMeta>;

fn is_skipped(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

/// Recursively collect file metadata under `root`, skipping the denylisted
/// directories. Unreadable entries are silently skipped.
pub fn snapshot(root: &Path) -> Snapshot {
    let mut files = Snapshot::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| !is_skipped(e));
    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(mtime) = meta.modified() {
                files.insert(
                    entry.into_path(),
                    FileMeta {
                        mtime,
                        size: meta.len(),
                    },
                );
            }
        }
    }
    files
}

/// Files new in `after`, or present in both snapshots with a strictly newer
/// mtime. Paths are reported relative to `root`.
pub fn diff(before: &Snapshot, after: &Snapshot, root: &Path) -> Vec<FileInfo> {
    let mut created = Vec::new();

    for (path, meta) in after {
        let changed = match before.get(path) {
            None => true,
            // Strict inequality: equal mtimes count as unchanged even when
            // the size differs. Known limitation on filesystems with coarse
            // mtime resolution.
            Some(prev) => prev.mtime < meta.mtime,
        };
        if !changed {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let checksum = if BINARY_EXTS.contains(&ext.as_str()) {
            std::fs::read(path)
                .ok()
                .map(|bytes| format!("{:x}", Md5::digest(&bytes)))
        } else {
            None
        };

        created.push(FileInfo {
            path: relative.to_string_lossy().into_owned(),
            size: meta.size,
            mime: mime_for(&ext).to_string(),
            checksum,
        });
    }

    created.sort_by(|a, b| a.path.cmp(&b.path));
    created
}

fn mime_for(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "json" => "application/json",
        "txt" => "text/plain",
        "py" => "text/x-python",
        "sh" => "text/x-shellscript",
        "md" => "text/markdown",
        "html" => "text/html",
        "fits" => "application/fits",
        _ => "application/octet-stream",
    }
}
