//! Error types for engine operations.
//!
//! Failures are either returned to the caller of an admission call or
//! absorbed locally and reflected in counters; nothing propagates across
//! component boundaries as a panic. A dispatch error is terminal for its
//! record and never terminates the engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Admission queue is at capacity; the request was not registered.
    #[error("request queue capacity ({capacity}) exceeded, could not register request")]
    QueueFull {
        /// Configured capacity of the admission queue.
        capacity: usize,
    },

    /// Snapshot save or load failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Engine configuration is invalid.
    #[error("invalid engine configuration: {message}")]
    Configuration {
        /// Description of the invalid setting.
        message: String,
    },
}

impl EngineError {
    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

/// Errors from the snapshot store.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem read, write, rename, or delete failed.
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Pending set could not be encoded.
    #[error("failed to encode snapshot: {message}")]
    Encode {
        /// Encoder error description.
        message: String,
    },

    /// Snapshot file could not be decoded.
    #[error("failed to decode snapshot: {message}")]
    Decode {
        /// Decoder error description.
        message: String,
    },
}

/// Errors from a single outbound dispatch or notification attempt.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The outbound request could not be constructed.
    #[error("failed to build outbound request: {message}")]
    Build {
        /// Builder error description.
        message: String,
    },

    /// The transport failed before a response was produced.
    #[error("transport error: {message}")]
    Transport {
        /// Transport error description.
        message: String,
    },
}

impl DispatchError {
    /// Creates a build error from a message.
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build { message: message.into() }
    }

    /// Creates a transport error from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::build(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_names_the_condition() {
        let error = EngineError::QueueFull { capacity: 2 };
        assert!(error.to_string().contains("capacity (2) exceeded"));
    }

    #[test]
    fn snapshot_io_errors_wrap() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = EngineError::from(SnapshotError::from(io));
        assert!(error.to_string().contains("snapshot"));
    }
}
