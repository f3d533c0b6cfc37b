//! Filename resolution for submitted code blocks
//!
//! Agents may pin a block to a file by putting a directive like
//! `# filename:step_1.py` on the first line; otherwise a generated name is
//! derived from the submission time and a hash of the source, so distinct
//! code submitted in the same millisecond cannot collide.

use crate::language::Language;
use md5::{Digest, Md5};
use regex::Regex;
use std::sync::OnceLock;

fn directive_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // HTML comment
            Regex::new(r"^<!--\s*(filename:)?(.+?)\s*-->$").unwrap(),
            // C-style comment
            Regex::new(r"^/\*\s*(filename:)?(.+?)\s*\*/$").unwrap(),
            // C++ style comment
            Regex::new(r"^//\s*(filename:)?(.+?)$").unwrap(),
            // Python/shell comment
            Regex::new(r"^#\s*(filename:)?(.+?)$").unwrap(),
        ]
    })
}

/// Extract a filename directive from the first line of `code`, if any.
///
/// A candidate is accepted only if it has no spaces and contains a `.`.
/// A `codebase/` prefix is stripped (the result is always relative to the
/// codebase subdirectory), as are any remaining path components.
pub fn filename_from_directive(code: &str) -> Option<String> {
    let first_line = code.lines().next().unwrap_or("").trim();

    for pattern in directive_patterns() {
        if let Some(caps) = pattern.captures(first_line) {
            let mut candidate = caps.get(2).map_or("", |m| m.as_str()).trim();
            if candidate.is_empty() || candidate.contains(' ') || !candidate.contains('.') {
                continue;
            }
            candidate = candidate.strip_prefix("codebase/").unwrap_or(candidate);
            let basename = candidate.rsplit('/').next().unwrap_or(candidate);
            if !basename.is_empty() {
                return Some(basename.to_string());
            }
        }
    }
    None
}

/// Resolve the on-disk filename for a code block: the embedded directive if
/// present, else `code_<millis>_<md5-8hex>.<ext>`.
pub fn resolve(code: &str, language: &str, timestamp_millis: i64) -> String {
    if let Some(name) = filename_from_directive(code) {
        return name;
    }
    let digest = format!("{:x}", Md5::digest(code.as_bytes()));
    format!(
        "code_{}_{}.{}",
        timestamp_millis,
        &digest[..8],
        Language::extension(language)
    )
}
