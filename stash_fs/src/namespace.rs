//! Maps namespace ids to provisioned root directories under a base path.

use stash_core::{ResolvedPath, StashError, StashResult, sandbox};
use std::path::{Path, PathBuf};

/// A provisioned namespace directory.
///
/// The path is canonical, which is what [`sandbox::resolve`] expects of a
/// root. Only [`NamespaceResolver`] hands these out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRoot {
    id: String,
    path: PathBuf,
}

impl NamespaceRoot {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sandboxes a caller-supplied relative path against this root.
    pub fn resolve(&self, relative: &str) -> StashResult<ResolvedPath> {
        sandbox::resolve(&self.path, relative)
    }
}

#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    base: PathBuf,
}

impl NamespaceResolver {
    /// Opens the storage base directory. It must already exist.
    pub fn new(base: impl AsRef<Path>) -> std::io::Result<Self> {
        let base = std::fs::canonicalize(base.as_ref())?;
        if !base.is_dir() {
            return Err(std::io::Error::other("storage base is not a directory"));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the root of an already provisioned namespace.
    ///
    /// The id comes from a verified token but is still treated as untrusted:
    /// it must sandbox to a direct child of the base directory.
    pub fn resolve_root(&self, namespace: &str) -> StashResult<NamespaceRoot> {
        let candidate = self
            .candidate(namespace)
            .map_err(|_| StashError::NamespaceNotFound)?;

        match std::fs::metadata(candidate.as_path()) {
            Ok(meta) if meta.is_dir() => Ok(NamespaceRoot {
                id: namespace.to_owned(),
                path: candidate.as_path().to_path_buf(),
            }),
            _ => {
                tracing::warn!(namespace, "namespace root is not provisioned");
                Err(StashError::NamespaceNotFound)
            }
        }
    }

    /// Creates the root directory for `namespace` if it does not exist yet.
    ///
    /// This is the account provisioning step; file operations never call it.
    pub fn provision(&self, namespace: &str) -> StashResult<NamespaceRoot> {
        let candidate = self.candidate(namespace)?;
        std::fs::create_dir_all(candidate.as_path()).map_err(|err| {
            StashError::internal(format!("failed to provision namespace {namespace}"), err)
        })?;
        tracing::info!(namespace, "provisioned namespace root");
        self.resolve_root(namespace)
    }

    fn candidate(&self, namespace: &str) -> StashResult<ResolvedPath> {
        let candidate = sandbox::resolve(&self.base, namespace)?;
        if candidate.is_root() || candidate.relative().contains('/') {
            return Err(StashError::InvalidInput(
                "namespace id must be a single path segment".into(),
            ));
        }
        Ok(candidate)
    }
}
