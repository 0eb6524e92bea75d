//! Errors raised while bringing the agent environment up
//!
//! Everything here is startup-fatal: the agent exits nonzero rather than
//! running with a half-configured environment or a partial schema.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for environment bootstrap operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An environment variable held a value that cannot be used.
    #[error("Invalid {var}: {reason}")]
    Config { var: String, reason: String },

    /// The data directory (or the database's parent directory) could not
    /// be created or written.
    #[error("Cannot prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Creating one of the schema tables or its indexes failed.
    #[error("Cannot create {table} table: {source}")]
    Schema {
        table: &'static str,
        source: sqlx::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub fn config(var: &str, reason: impl Into<String>) -> Self {
        Error::Config {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}
