//! Workspace root and path normalization.
//!
//! Root-bounded canonicalization in a fixed order: NFC, then
//! percent-decoding, then null-byte rejection, then resolution against the
//! workspace root, then symlink-bounded canonicalization. Skipping any one
//! step makes traversal trivially bypassable, so `normalize` performs all
//! of them in this fixed order and no caller may skip a step.

use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// The single writable/readable root all gateway path checks are relative
/// to. Everything outside this root is out of bounds regardless of policy
/// allow/deny lists.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    canonical: PathBuf,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PathNormalizationError {
    #[error("path contains a null byte")]
    NullByte,
    #[error("path escapes the workspace root")]
    OutsideRoot,
    #[error("path could not be resolved: {0}")]
    Unresolvable(String),
}

impl WorkspaceRoot {
    /// `root` must already exist; this mirrors `Sandbox::new`'s requirement
    /// that every allowed root canonicalize successfully at construction.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let canonical = std::fs::canonicalize(root)?;
        Ok(Self { canonical })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.canonical
    }

    /// Normalize `raw` (as provided by a tool call or policy check) into an
    /// absolute path guaranteed to be inside this root, without touching
    /// the filesystem beyond the final canonicalization step.
    ///
    /// Order: NFC normalize -> percent-decode -> reject null bytes ->
    /// resolve `..`/`.` components lexically against the root -> canonicalize
    /// and verify the result still starts with the root (defeats symlink
    /// escapes).
    pub fn normalize(&self, raw: &str) -> Result<PathBuf, PathNormalizationError> {
        let nfc: String = raw.nfc().collect();
        let decoded = percent_decode_lossy(&nfc);
        if decoded.contains('\0') {
            return Err(PathNormalizationError::NullByte);
        }

        let candidate = Path::new(&decoded);
        let unresolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.canonical.join(candidate)
        };

        let lexical = lexically_resolve(&unresolved);
        if !lexical.starts_with(&self.canonical) {
            return Err(PathNormalizationError::OutsideRoot);
        }

        // The path may not exist yet (e.g. a file about to be created); only
        // bound-check via canonicalization when it already does, and walk
        // up to the nearest existing ancestor otherwise.
        let resolved = canonicalize_best_effort(&lexical)
            .map_err(|e| PathNormalizationError::Unresolvable(e.to_string()))?;
        if !resolved.starts_with(&self.canonical) {
            return Err(PathNormalizationError::OutsideRoot);
        }
        Ok(lexical)
    }
}

/// Resolve `.`/`..` components lexically without touching the filesystem.
/// A leading `..` that would climb above an absolute path's root simply
/// has nowhere further to go and is dropped, matching `Path` semantics.
fn lexically_resolve(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the nearest existing ancestor of `path`, then re-append the
/// non-existent suffix. This lets `check_path`/`resolve_path_for_create`
/// validate a not-yet-created file's containing directory against symlink
/// escapes without requiring the file to already exist.
fn canonicalize_best_effort(path: &Path) -> std::io::Result<PathBuf> {
    let mut probe = path.to_path_buf();
    let mut suffix = Vec::new();
    loop {
        match std::fs::canonicalize(&probe) {
            Ok(mut canonical) => {
                for part in suffix.into_iter().rev() {
                    canonical.push(part);
                }
                return Ok(canonical);
            }
            Err(_) => {
                let Some(file_name) = probe.file_name().map(std::ffi::OsStr::to_os_string) else {
                    return Err(std::io::Error::other("path has no resolvable ancestor"));
                };
                suffix.push(file_name);
                if !probe.pop() {
                    return Err(std::io::Error::other("path has no resolvable ancestor"));
                }
            }
        }
    }
}

fn percent_decode_lossy(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_null_byte() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();
        let err = root.normalize("foo\0bar").unwrap_err();
        assert_eq!(err, PathNormalizationError::NullByte);
    }

    #[test]
    fn normalize_rejects_parent_dir_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();
        let err = root.normalize("../../etc/passwd").unwrap_err();
        assert_eq!(err, PathNormalizationError::OutsideRoot);
    }

    #[test]
    fn normalize_decodes_percent_encoded_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();
        // "%2e%2e/%2e%2e/etc/passwd" decodes to "../../etc/passwd"
        let err = root.normalize("%2e%2e/%2e%2e/etc/passwd").unwrap_err();
        assert_eq!(err, PathNormalizationError::OutsideRoot);
    }

    #[test]
    fn normalize_allows_path_within_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();
        let resolved = root.normalize("notes/todo.txt").unwrap();
        assert!(resolved.starts_with(root.path()));
    }

    #[test]
    fn normalize_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();
        let a = root.normalize("a/b/c.txt").unwrap();
        let b = root.normalize("a/b/c.txt").unwrap();
        assert_eq!(a, b);
    }
}
