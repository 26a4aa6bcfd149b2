//! SQLite persistence for submissions, quote versions and their children.

pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Quote store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("No {entity_type} stored under {id}")]
    NotFound { entity_type: String, id: String },

    /// A stored enum column holds text no variant parses from.
    #[error("Unrecognized {field} value in store: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Schema step {version} failed: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Stored row is malformed: {0}")]
    ConstraintViolation(String),

    #[error("JSON column error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatabaseError {
    /// True when SQLite rejected a write on a UNIQUE or CHECK constraint.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::ConstraintViolation(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
