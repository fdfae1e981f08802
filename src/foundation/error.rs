use std::path::PathBuf;

/// Convenience result type used across the overlay engine.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Top-level error taxonomy used by engine APIs.
///
/// None of these reach the host from [`crate::OverlayService::enhance`]; they steer which
/// fallback the service takes.
#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    /// Invalid configuration, profile or caller-provided data.
    #[error("validation error: {0}")]
    Validation(String),

    /// An image (poster or icon) could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Filesystem failure tied to a concrete path.
    #[error("io error on '{}': {source}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A placeholder item could not be resolved to its durable identity.
    #[error("unresolved item: {0}")]
    Unresolved(String),

    /// The operation observed its cancellation signal.
    #[error("operation cancelled")]
    Cancelled,

    /// Drawing or encoding the composite failed.
    #[error("render error: {0}")]
    Render(String),

    /// Layered configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OverlayError {
    /// Build an [`OverlayError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an [`OverlayError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build an [`OverlayError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build an [`OverlayError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an [`OverlayError::Io`] value.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same IO operation may succeed (locked file, busy volume).
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                ErrorKind::PermissionDenied
                    | ErrorKind::WouldBlock
                    | ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::ResourceBusy
                    | ErrorKind::StorageFull
            ),
            _ => false,
        }
    }

    /// Whether this error is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
