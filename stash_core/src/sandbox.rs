//! Path sandbox: turns attacker-controlled relative paths into filesystem
//! paths that provably stay inside a namespace root.
//!
//! Every operation that touches the filesystem on behalf of a caller goes
//! through [`resolve`]. Nothing else joins caller input onto a root.
//!
//! Resolution happens in two steps:
//! 1. [`normalize`] is pure and lexical. It splits on both `/` and `\`, drops
//!    empty and `.` segments, applies `..`, and rejects input that climbs
//!    above the root, is absolute or contains NUL.
//! 2. Link resolution: the deepest existing ancestor of the lexical result is
//!    canonicalized (following symbolic links) and the missing tail is
//!    re-appended. The containment check runs on this canonical form, so a
//!    link pointing outside the root is rejected even though its name is not.

use crate::{StashError, StashResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const ESCAPES_ROOT: &str = "path escapes the namespace root";

/// An absolute path that is the namespace root or one of its descendants.
///
/// Only [`resolve`] constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    relative: String,
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Normalized, forward-slash separated path relative to the root.
    /// Empty for the root itself.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Last segment of the relative path; `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.relative.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Relative path of the parent directory; `None` for the root.
    pub fn parent_relative(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(
            self.relative
                .rsplit_once('/')
                .map(|(parent, _)| parent)
                .unwrap_or(""),
        )
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Lexically normalizes `input` into path segments.
///
/// Blank input is the root (no segments).
pub fn normalize(input: &str) -> StashResult<Vec<&str>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    if input.contains('\0') {
        return Err(StashError::InvalidPath("path contains a NUL byte"));
    }
    if input.starts_with(['/', '\\']) || Path::new(input).is_absolute() || has_drive_prefix(input)
    {
        return Err(StashError::InvalidPath("absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in input.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StashError::InvalidPath(ESCAPES_ROOT));
                }
            }
            name => segments.push(name),
        }
    }
    Ok(segments)
}

/// Resolves `input` against `root`.
///
/// `root` must already be canonical; [`resolve`] compares canonical paths and
/// a non-canonical root would reject every input.
pub fn resolve(root: &Path, input: &str) -> StashResult<ResolvedPath> {
    let segments = normalize(input)?;

    let mut lexical = root.to_path_buf();
    lexical.extend(&segments);

    let path = resolve_links(&lexical)?;
    if !path.starts_with(root) {
        tracing::debug!(input, "sandbox: canonical path left the namespace root");
        return Err(StashError::InvalidPath(ESCAPES_ROOT));
    }

    Ok(ResolvedPath {
        path,
        relative: segments.join("/"),
    })
}

/// Canonicalizes the deepest existing ancestor of `path` and re-appends the
/// segments that do not exist yet.
fn resolve_links(path: &Path) -> StashResult<PathBuf> {
    let mut missing: Vec<OsString> = Vec::new();
    let mut current = path;

    loop {
        if current.symlink_metadata().is_ok() {
            let mut canonical = std::fs::canonicalize(current)
                .map_err(|_| StashError::InvalidPath("path goes through a dangling link"))?;
            canonical.extend(missing.iter().rev());
            return Ok(canonical);
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_owned());
                current = parent;
            }
            // Nothing on the way up exists; the lexical form is all we have.
            _ => return Ok(path.to_path_buf()),
        }
    }
}

fn has_drive_prefix(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/' || bytes[2] == b'\\')
}
