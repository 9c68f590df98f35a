//! Error types for FolioDB core.
//!
//! Callers are expected to match on the error variant for programmatic
//! handling; messages are for humans.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in FolioDB core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] foliodb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding or decoding a record failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Document not found in the collection.
    #[error("document not found: {id:?} in {collection}")]
    DocumentNotFound {
        /// Fully-qualified collection name (`scope.collection`).
        collection: String,
        /// The document id that was not found.
        id: String,
    },

    /// Collection not found in the scope.
    #[error("collection not found: {scope}.{name}")]
    CollectionNotFound {
        /// Scope name.
        scope: String,
        /// Collection name.
        name: String,
    },

    /// Scope not found in the database.
    #[error("scope not found: {name}")]
    ScopeNotFound {
        /// Scope name.
        name: String,
    },

    /// Index not found in the collection.
    #[error("index not found: {name} on {collection}")]
    IndexNotFound {
        /// Fully-qualified collection name.
        collection: String,
        /// Index name.
        name: String,
    },

    /// Collection already exists in the scope.
    #[error("collection already exists: {scope}.{name}")]
    CollectionAlreadyExists {
        /// Scope name.
        scope: String,
        /// Collection name.
        name: String,
    },

    /// Index name already taken in the collection.
    #[error("index already exists: {name} on {collection}")]
    IndexAlreadyExists {
        /// Fully-qualified collection name.
        collection: String,
        /// Index name.
        name: String,
    },

    /// Optimistic-concurrency mismatch on save or delete.
    #[error("conflict on document {id:?} in {collection}")]
    Conflict {
        /// Fully-qualified collection name.
        collection: String,
        /// The document that conflicted.
        id: String,
    },

    /// Another session holds the exclusive lock on the store.
    #[error("database locked: another session has exclusive access")]
    DatabaseLocked,

    /// Malformed name, empty required field, or bad spec.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// On-disk state is corrupted or has an incompatible format.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec {
            message: message.to_string(),
        }
    }

    /// Creates a document-not-found error.
    pub fn document_not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DocumentNotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            collection: collection.into(),
            id: id.into(),
        }
    }
}
