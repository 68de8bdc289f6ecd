// src/error.rs

//! Error types for mpd-kitchen
//!
//! The installer pipeline fails fast: every variant is fatal to the run that
//! produced it. Build and verification errors carry the diagnostic output of
//! the underlying tool so the operator can see what went wrong.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the kitchen, the supervisor and the verifier
#[derive(Error, Debug)]
pub enum Error {
    /// One or more declared dependencies are not present and could not be installed
    #[error("Missing dependencies: {}", .0.join(", "))]
    DependencyMissing(Vec<String>),

    /// A build-system step exited unsuccessfully
    #[error("{phase} failed: {output}")]
    BuildFailure { phase: String, output: String },

    /// Installing artifacts into the prefix failed
    #[error("Install failed: {0}")]
    InstallFailure(String),

    /// The smoke test waited too long for the daemon
    #[error("Timed out after {seconds}s waiting for {waiting_for}")]
    VerificationTimeout { waiting_for: String, seconds: u64 },

    /// The daemon answered with something other than what was expected
    #[error("Protocol mismatch: expected {expected:?}, got {got:?}")]
    VerificationProtocolMismatch { expected: String, got: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Service registration failed: {0}")]
    ServiceError(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_missing_lists_names() {
        let err = Error::DependencyMissing(vec!["meson".to_string(), "ninja".to_string()]);
        assert_eq!(err.to_string(), "Missing dependencies: meson, ninja");
    }

    #[test]
    fn test_build_failure_carries_output() {
        let err = Error::BuildFailure {
            phase: "compile".to_string(),
            output: "ninja: error: loading 'build.ninja'".to_string(),
        };
        assert!(err.to_string().contains("compile failed"));
        assert!(err.to_string().contains("build.ninja"));
    }
}
