// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Every failure the pipeline reports falls into one of four classes:
//!
//! - **halting**: the configuration is unusable as given (malformed or unknown
//!   reference, missing solution/project). Never retried automatically.
//! - **retryable**: network/fetch failures and transient process launch
//!   failures. Safe to retry without changing configuration.
//! - **cancelled**: caller-initiated abandonment. Not a failure.
//! - everything else (build failures, listing failures, IO, config parsing).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Halting(String),

    #[error("Retryable failure: {0}")]
    Retryable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Patcher is not runnable: {0}")]
    NotRunnable(String),

    #[error("Patcher exited with {code}: {message}")]
    PatcherFailed { code: i32, message: String },

    #[error("Error while retrieving package listings: \n{0}")]
    PackageListing(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PatchrunError {
    /// True for failures that are safe to retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PatchrunError::Retryable(_) | PatchrunError::Launch { .. }
        )
    }

    pub fn is_halting(&self) -> bool {
        matches!(self, PatchrunError::Halting(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PatchrunError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PatchrunError>;
