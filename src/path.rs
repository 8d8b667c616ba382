//! Canonical path normalization.
//!
//! Every registry key and every path handed to a [`Storage`](crate::storage::Storage)
//! is canonical: absolute, `/`-separated, free of `.` and `..` segments.
//! Directories carry a trailing `/`, files never do. The root is `/`.

use crate::error::{Result, TxError};

/// Identity value assigned to handles whose creation was rolled back.
pub const DELETED: &str = "<deleted>";

/// Normalizes `raw` into a canonical path.
///
/// ## Rules
/// - Relative paths are taken relative to `/`
/// - `\` is treated as a separator
/// - Empty segments and `.` are dropped
/// - `..` removes the previous segment; climbing above root is an error
/// - A trailing separator (or trailing `.`/`..`) marks a directory
pub fn canonicalize(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(TxError::InvalidPath(
            raw.to_string(),
            "cannot be empty".to_string(),
        ));
    }

    let unified = raw.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_dir = false;

    for segment in unified.split('/') {
        match segment {
            "" => {}
            "." => trailing_dir = true,
            ".." => {
                if segments.pop().is_none() {
                    return Err(TxError::InvalidPath(
                        raw.to_string(),
                        "cannot navigate above root".to_string(),
                    ));
                }
                trailing_dir = true;
            }
            s => {
                segments.push(s);
                trailing_dir = false;
            }
        }
    }
    // Re-apply the marker if the raw text ended with a separator
    if unified.ends_with('/') {
        trailing_dir = true;
    }

    if segments.is_empty() {
        return Ok("/".to_string());
    }

    let mut out = String::with_capacity(unified.len() + 2);
    for s in &segments {
        out.push('/');
        out.push_str(s);
    }
    if trailing_dir {
        out.push('/');
    }
    Ok(out)
}

/// Canonicalizes `raw` as a directory path (forces the trailing `/`).
pub fn canonicalize_dir(raw: &str) -> Result<String> {
    let mut path = canonicalize(raw)?;
    if !path.ends_with('/') {
        path.push('/');
    }
    Ok(path)
}

/// Returns `true` if `path` names a directory.
pub fn is_dir(path: &str) -> bool {
    path.ends_with('/')
}

/// Returns the parent directory of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    trimmed.rfind('/').map(|idx| &path[..=idx])
}

/// Returns the last segment of `path` without any trailing `/`.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Joins `name` below directory `dir` and canonicalizes the result.
pub fn join(dir: &str, name: &str) -> Result<String> {
    if name.starts_with('/') {
        return Err(TxError::InvalidPath(
            name.to_string(),
            "must be relative to its directory".to_string(),
        ));
    }
    let joined = canonicalize(&format!("{}/{}", dir.trim_end_matches('/'), name))?;
    if !joined.starts_with(dir) {
        return Err(TxError::InvalidPath(
            name.to_string(),
            format!("escapes directory '{}'", dir),
        ));
    }
    Ok(joined)
}

/// Rewrites `path` from below `old_prefix` to below `new_prefix`.
///
/// Returns `None` if `path` is not `old_prefix` itself or one of its descendants.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    path.strip_prefix(old_prefix)
        .map(|rest| format!("{}{}", new_prefix, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        assert_eq!(canonicalize("/a/b.txt").unwrap(), "/a/b.txt");
        assert_eq!(canonicalize("a/b.txt").unwrap(), "/a/b.txt");
        assert_eq!(canonicalize("//a///b.txt").unwrap(), "/a/b.txt");
        assert_eq!(canonicalize("a\\b.txt").unwrap(), "/a/b.txt");
    }

    #[test]
    fn test_canonicalize_directories_keep_marker() {
        assert_eq!(canonicalize("/a/b/").unwrap(), "/a/b/");
        assert_eq!(canonicalize("/a/b/.").unwrap(), "/a/b/");
        assert_eq!(canonicalize("/a/b/c/..").unwrap(), "/a/b/");
        assert_eq!(canonicalize("/").unwrap(), "/");
        assert_eq!(canonicalize(".").unwrap(), "/");
    }

    #[test]
    fn test_canonicalize_dot_segments() {
        assert_eq!(canonicalize("/a/./b/../c.txt").unwrap(), "/a/c.txt");
    }

    #[test]
    fn test_canonicalize_rejects_escape_and_empty() {
        assert!(matches!(
            canonicalize("/../etc/passwd"),
            Err(TxError::InvalidPath(..))
        ));
        assert!(matches!(canonicalize("  "), Err(TxError::InvalidPath(..))));
    }

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(parent("/a/b.txt"), Some("/a/"));
        assert_eq!(parent("/a/b/"), Some("/a/"));
        assert_eq!(parent("/a.txt"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(file_name("/a/b.txt"), "b.txt");
        assert_eq!(file_name("/a/b/"), "b");
    }

    #[test]
    fn test_join_stays_inside() {
        assert_eq!(join("/a/", "b.txt").unwrap(), "/a/b.txt");
        assert_eq!(join("/a/", "c/").unwrap(), "/a/c/");
        assert!(join("/a/", "../b.txt").is_err());
        assert!(join("/a/", "/b.txt").is_err());
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("/a/x/y.txt", "/a/", "/b/").as_deref(), Some("/b/x/y.txt"));
        assert_eq!(rebase("/a/", "/a/", "/b/").as_deref(), Some("/b/"));
        assert_eq!(rebase("/ab/y.txt", "/a/", "/b/"), None);
    }
}
