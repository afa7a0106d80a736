//! Error taxonomy for the deployment engine.
//!
//! Library operations return [`DeployError`]; command handlers at the CLI
//! boundary convert it to [`anyhow::Error`] through the standard `?`
//! operator.
//!
//! # Error hierarchy
//!
//! ```text
//! DeployError
//! ├── Argument        malformed invocation, detected before any I/O
//! ├── PathSafety      write attempted into a protected source tree
//! ├── Io              create/copy/stat/chmod/link failure with OS text
//! ├── Network         transport failure with status code and message
//! ├── Verification    post-transfer hash mismatch
//! ├── LockTimeout     lock not acquired before the timeout
//! ├── LockConflict    lock already held by the same owner
//! └── LockNotHeld     release of a path the caller does not hold
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for copy, install, transfer and lock operations.
#[derive(Error, Debug)]
pub enum DeployError {
    /// The invocation is malformed (unknown keyword, bad value, illegal
    /// combination of options).
    #[error("{0}")]
    Argument(String),

    /// A write was attempted into the protected source tree.
    #[error("attempted to write a file: {} into a source directory.", path.display())]
    PathSafety {
        /// Path that would have been written.
        path: PathBuf,
    },

    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted, including the path involved.
        context: String,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The network transport reported a failure.
    #[error("transfer failed with status {code}: {message}")]
    Network {
        /// libcurl-compatible status code.
        code: i32,
        /// Human-readable transport message.
        message: String,
    },

    /// The transferred file does not carry the expected hash.
    #[error(
        "{algorithm} hash of\n  {}\ndoes not match expected value\n  expected: '{expected}'\n    actual: '{actual}'",
        file.display()
    )]
    Verification {
        /// File whose content was hashed.
        file: PathBuf,
        /// Algorithm name (e.g. `SHA256`).
        algorithm: String,
        /// Expected lowercase hex digest.
        expected: String,
        /// Computed lowercase hex digest.
        actual: String,
    },

    /// A lock could not be acquired before its timeout elapsed.
    #[error("Timeout reached")]
    LockTimeout {
        /// Lock file path.
        path: PathBuf,
    },

    /// The lock is already held by the requesting owner.
    #[error("File already locked")]
    LockConflict {
        /// Lock file path.
        path: PathBuf,
    },

    /// Release was requested for a path the caller does not hold.
    #[error("File is not locked")]
    LockNotHeld {
        /// Lock file path.
        path: PathBuf,
    },
}

impl DeployError {
    /// Shorthand for [`DeployError::Argument`].
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Shorthand for [`DeployError::Io`].
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, DeployError>;
