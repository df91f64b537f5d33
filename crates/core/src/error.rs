//! Error types for the timebox core

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache, build and supervision operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(timebox::io),
        help("Check file permissions and ensure the cache directory is writable")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "write", "create_dir_all")
        operation: String,
    },

    /// The snippet could not be turned into a runnable artifact
    #[error("Build failed for {fingerprint}: {message}")]
    #[diagnostic(
        code(timebox::build),
        help("Fix the snippet so that the configured toolchain accepts it")
    )]
    Build {
        /// Fingerprint of the snippet being built
        fingerprint: String,
        /// Toolchain output or the reason the build was abandoned
        message: String,
    },

    /// The artifact exists but the process could not be started
    #[error("Failed to start {}", path.display())]
    #[diagnostic(code(timebox::spawn))]
    Spawn {
        /// The underlying I/O error from the process spawn
        #[source]
        source: std::io::Error,
        /// Artifact that failed to start
        path: Box<Path>,
    },

    /// A timed-out process could not be terminated
    #[error("Failed to terminate process {pid}")]
    #[diagnostic(
        code(timebox::process_control),
        help("The process may still be running; inspect it manually")
    )]
    ProcessControl {
        /// OS error returned by the kill request
        #[source]
        source: std::io::Error,
        /// Process id that refused to die
        pid: u32,
    },

    /// Configuration or request validation error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(timebox::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A string was not a valid fingerprint
    #[error("Invalid fingerprint: {value}")]
    #[diagnostic(
        code(timebox::fingerprint),
        help("Fingerprints are 64 lowercase hex characters")
    )]
    InvalidFingerprint {
        /// The rejected value
        value: String,
    },

    /// A supervisor task panicked or was cancelled
    #[error("Supervisor task failed: {message}")]
    #[diagnostic(code(timebox::task))]
    Task {
        /// Description of the join failure
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a build error
    #[must_use]
    pub fn build(fingerprint: impl ToString, message: impl Into<String>) -> Self {
        Self::Build {
            fingerprint: fingerprint.to_string(),
            message: message.into(),
        }
    }

    /// Create a spawn error
    #[must_use]
    pub fn spawn(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::Spawn {
            source,
            path: path.as_ref().into(),
        }
    }

    /// Create a process control error
    #[must_use]
    pub fn process_control(source: std::io::Error, pid: u32) -> Self {
        Self::ProcessControl { source, pid }
    }

    /// Create an invalid fingerprint error
    #[must_use]
    pub fn invalid_fingerprint(value: impl Into<String>) -> Self {
        Self::InvalidFingerprint {
            value: value.into(),
        }
    }

    /// Create a task join error
    #[must_use]
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }

    /// Whether this error means the process service itself is broken
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ProcessControl { .. } | Self::Task { .. })
    }
}

/// Result type for timebox core operations
pub type Result<T> = std::result::Result<T, Error>;
