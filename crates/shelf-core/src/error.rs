//! Error types for list operations

use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced by the list manager, its items and cursors
#[derive(Error, Debug)]
pub enum Error {
    /// Add with an existing natural key or explicit server id
    #[error("An item with key '{key}' already exists")]
    DuplicateKey { key: String },

    /// The item (or cursor) does not belong to the acting list
    #[error("Item is not a member of this list")]
    NotAMember,

    /// The cursor was invalidated by a mutation on its list
    #[error("Cursor is no longer valid")]
    InvalidCursor,

    /// Missing required field or malformed query options
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The store adapter reported a failure
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    /// An iteration callback failed
    #[error("Callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    /// The list was destroyed
    #[error("List has been destroyed")]
    Destroyed,
}

impl Error {
    /// Map adapter duplicates to `DuplicateKey`, everything else to `Store`
    pub(crate) fn from_store(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate { key } => Error::DuplicateKey { key },
            other => Error::Store(other),
        }
    }
}

/// Result type for list operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_duplicate_maps_to_duplicate_key() {
        let err = Error::from_store(StoreError::Duplicate {
            key: "https://x".into(),
        });
        assert!(matches!(err, Error::DuplicateKey { ref key } if key == "https://x"));

        let err = Error::from_store(StoreError::Closed);
        assert!(matches!(err, Error::Store(StoreError::Closed)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::DuplicateKey {
                key: "https://x".into()
            }
            .to_string(),
            "An item with key 'https://x' already exists"
        );
        assert_eq!(Error::InvalidCursor.to_string(), "Cursor is no longer valid");
    }
}
