//! Error types for stagehand-store

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the shared metadata store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A required file is absent from the store
    #[error("required file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A version control step failed with an unrecoverable message
    #[error("git {step} failed: {output}")]
    Vcs { step: String, output: String },

    /// A version control step kept hitting transient lock contention
    #[error("git {step} still failing after {attempts} attempts: {output}")]
    RetriesExhausted {
        step: String,
        attempts: u32,
        output: String,
    },

    /// The release history ledger violates its ordering rules
    #[error("invalid release ledger: {0}")]
    InvalidLedger(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization failed for {}: {message}", path.display())]
    Deserialization { path: PathBuf, message: String },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for StoreError {
    fn from(err: serde_yaml::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
