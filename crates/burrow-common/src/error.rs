//! Unified error types for the Burrow workspace.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::InitStage;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A hash validation failed.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// A permission or capability error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A system call returned an error.
    #[error("{operation} failed: {source}")]
    Syscall {
        /// Human-readable description of the call, including its target.
        operation: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// An image name cannot be turned into a root filesystem path.
    #[error("invalid image name {name:?}: {reason}")]
    InvalidImage {
        /// The rejected image name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The namespace init sequence failed before reaching `stage`.
    #[error("bootstrap failed entering {stage}: {source}")]
    Bootstrap {
        /// Stage the init sequence was trying to reach.
        stage: InitStage,
        /// Cause of the failure.
        source: Box<BurrowError>,
    },
}

impl BurrowError {
    /// Wraps an error raised while a syscall was in flight.
    pub fn syscall(operation: impl Into<String>, source: impl Into<std::io::Error>) -> Self {
        Self::Syscall {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Tags this error with the init stage that could not be reached.
    #[must_use]
    pub fn at_stage(self, stage: InitStage) -> Self {
        Self::Bootstrap {
            stage,
            source: Box::new(self),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_error_names_the_stage() {
        let err = BurrowError::NotFound {
            kind: "root filesystem",
            id: "/srv/rootfs/busybox".into(),
        }
        .at_stage(InitStage::RootPrepared);
        let msg = err.to_string();
        assert!(msg.contains("root-prepared"), "{msg}");
        assert!(msg.contains("/srv/rootfs/busybox"), "{msg}");
    }

    #[test]
    fn syscall_error_keeps_os_message() {
        let err = BurrowError::syscall(
            "pivot_root(/new)",
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid argument"),
        );
        assert_eq!(err.to_string(), "pivot_root(/new) failed: invalid argument");
    }
}
