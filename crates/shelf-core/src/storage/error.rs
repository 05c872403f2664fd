//! Storage error handling
//!
//! Typed errors reported by store adapters. The list manager wraps these
//! in [`crate::Error::Store`], except for duplicates which it reports as
//! [`crate::Error::DuplicateKey`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur inside a store adapter
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record with this natural key (or server id) already exists
    #[error("Item already stored: '{key}'")]
    Duplicate { key: String },

    /// No record with this natural key exists
    #[error("Item not found: '{key}'")]
    NotFound { key: String },

    /// The adapter was destroyed
    #[error("Store has been closed")]
    Closed,

    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored row could not be decoded
    #[error("Invalid stored row for '{key}': {details}")]
    InvalidRow { key: String, details: String },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    /// Classify a SQLite error, turning constraint violations into duplicates
    pub fn from_sqlite(error: rusqlite::Error, key: &str) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Duplicate {
                    key: key.to_string(),
                }
            }
            _ => StoreError::Database(error),
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::Duplicate { .. } => Some("Look the item up instead of adding it again."),
            StoreError::Closed => Some("Open a new list; a destroyed store cannot be reused."),
            StoreError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
