//! Common error types for hazard calculations

use thiserror::Error;

/// Common result type for hazard calculation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the hazard crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job configuration or logic tree is invalid, or references an
    /// unregistered source model
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A progress report would push a realization past its total
    #[error(
        "Realization {realization_id}: reporting {requested} items would exceed total \
         ({completed}/{total} already completed)"
    )]
    ProgressOverflow {
        realization_id: i64,
        completed: i64,
        total: i64,
        requested: i64,
    },

    /// A realization callback failed; carried unmodified
    #[error(transparent)]
    Callback(anyhow::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite lock contention (`SQLITE_BUSY` and friends)
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}
