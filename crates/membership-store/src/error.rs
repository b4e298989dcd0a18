use domain::AggregateKind;
use thiserror::Error;

use crate::AggregateId;

/// Errors that can occur when reading or writing member rosters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No aggregate with this id exists.
    #[error("{kind} not found: {id}")]
    NotFound { kind: AggregateKind, id: AggregateId },

    /// An aggregate with this id already exists.
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: AggregateKind, id: AggregateId },

    /// The conditional write kept losing to concurrent writers.
    #[error("Concurrent updates on {kind} {id}; try again")]
    Contended { kind: AggregateKind, id: AggregateId },

    /// A stored document could not be mapped back to its aggregate.
    #[error("Corrupt document: {0}")]
    Corrupt(String),

    /// The backing store refused or dropped the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for membership store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
