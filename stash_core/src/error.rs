use thiserror::Error;

/// Errors reported by namespace-scoped operations.
///
/// Messages only ever carry namespace-relative paths, so `Display` output is
/// safe to hand back to callers. The underlying `std::io::Error` of an
/// [`StashError::Internal`] is kept as the error source for logging.
#[derive(Debug, Error)]
pub enum StashError {
    /// Missing, malformed, forged or expired token. Deliberately carries no
    /// detail so callers cannot tell the causes apart.
    #[error("authentication required")]
    Unauthenticated,
    #[error("namespace storage is not provisioned")]
    NamespaceNotFound,
    #[error("invalid path: {0}")]
    InvalidPath(&'static str),
    #[error("{0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("{context}")]
    Internal {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StashError {
    /// Wraps an unexpected I/O failure. `context` must not contain host paths.
    pub fn internal(context: impl Into<String>, source: std::io::Error) -> Self {
        StashError::Internal {
            context: context.into(),
            source,
        }
    }
}

pub type StashResult<T, E = StashError> = std::result::Result<T, E>;
