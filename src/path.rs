//! Package path canonicalization.
//!
//! Every manifest key, ZIP entry name, and cache key goes through this module
//! so that all raw spellings of one logical entry map to a single key:
//!
//! - backslashes become `/`
//! - repeated slashes collapse
//! - `.` and `..` segments resolve
//! - a trailing `/` marks a directory (document root)
//!
//! Paths that point outside the package (`../x`, `/abs`, `http://...`) are
//! returned unchanged by [`normalize`] and are rejected by the `internal_*`
//! helpers used by the package accessors.

use crate::error::OdfError;

/// Path of the root document.
pub const ROOT: &str = "/";

/// Path of the synthetic `mimetype` stream.
pub const MIMETYPE_PATH: &str = "mimetype";

/// Path of the synthetic manifest stream.
pub const MANIFEST_PATH: &str = "META-INF/manifest.xml";

/// Directory holding the manifest.
pub const META_INF_DIR: &str = "META-INF/";

/// Returns `true` for strings that are obviously not package-internal:
/// a leading `..`, an absolute path other than the root, or anything with a
/// scheme/drive colon.
fn might_be_external(path: &str) -> bool {
    path.starts_with("..") || (path.starts_with('/') && path != ROOT) || path.contains(':')
}

/// Normalize a file or directory path.
///
/// The empty string maps to the root `/`. External references are returned
/// unchanged. When `..` segments climb above the package root the result is
/// the empty string, which no accessor accepts.
pub fn normalize(path: &str) -> String {
    if might_be_external(path) {
        return path.to_string();
    }
    if path.is_empty() {
        return ROOT.to_string();
    }

    let mut out = if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path.to_string()
    };
    while out.contains("//") {
        out = out.replace("//", "/");
    }
    if out.contains("/.") || out.contains("./") {
        out = resolve_dot_segments(&out);
    }
    out
}

/// Resolve `.` and `..` segments, scanning right to left.
fn resolve_dot_segments(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let is_directory = path.ends_with('/')
        || matches!(segments.last(), Some(&".") | Some(&"..") | None);

    let mut pending_removals = 0usize;
    let mut kept: Vec<&str> = Vec::with_capacity(segments.len());
    for segment in segments.iter().rev() {
        match *segment {
            ".." => pending_removals += 1,
            "." => {}
            _ if pending_removals > 0 => pending_removals -= 1,
            real => kept.push(real),
        }
    }
    if pending_removals > 0 {
        log::debug!("[PATH] '{}' climbs above the package root", path);
        return String::new();
    }
    if kept.is_empty() {
        return ROOT.to_string();
    }

    kept.reverse();
    let mut out = kept.join("/");
    if is_directory {
        out.push('/');
    }
    out
}

/// Normalize a path addressing a file. Empty input is rejected.
pub fn normalize_file(path: &str) -> Result<String, OdfError> {
    if path.is_empty() {
        return Err(OdfError::InvalidPath(String::new()));
    }
    Ok(normalize(path))
}

/// Normalize a path addressing a directory; the result always carries a
/// trailing slash, except for the root which is exactly `/`.
pub fn normalize_directory(path: &str) -> String {
    let mut out = normalize(path);
    if out != ROOT && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Whether `path` references something outside the package, either as
/// written or after normalization.
pub fn is_external_reference(path: &str) -> bool {
    might_be_external(path) || might_be_external(&normalize(path))
}

/// Normalize a file path and reject anything that is not package-internal.
pub fn internal_file_path(path: &str) -> Result<String, OdfError> {
    let normalized = normalize_file(path)?;
    if normalized.is_empty() || might_be_external(&normalized) {
        return Err(OdfError::InvalidPath(path.to_string()));
    }
    Ok(normalized)
}

/// Normalize a directory path and reject anything that is not package-internal.
pub fn internal_directory_path(path: &str) -> Result<String, OdfError> {
    if normalize(path).is_empty() {
        return Err(OdfError::InvalidPath(path.to_string()));
    }
    let normalized = normalize_directory(path);
    if might_be_external(&normalized) {
        return Err(OdfError::InvalidPath(path.to_string()));
    }
    Ok(normalized)
}

/// Whether a normalized path names a directory entry.
pub fn is_directory(path: &str) -> bool {
    path.ends_with('/')
}

/// Parent directories of a normalized path, outermost first, excluding the
/// root. `a/b/c.xml` yields `a/`, `a/b/`.
pub fn parent_directories(path: &str) -> Vec<String> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let mut parents = Vec::new();
    for (idx, ch) in trimmed.char_indices() {
        if ch == '/' {
            parents.push(trimmed[..=idx].to_string());
        }
    }
    parents
}

/// Lowercased extension of the last path segment, if any.
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
