//! Error types for key and tag parsing.

use thiserror::Error;

/// Result type for key parsing.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors produced while parsing object keys and source tags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key has no `.` separating type and id.
    #[error("object key {0:?} has no type separator")]
    MissingSeparator(String),

    /// The object type segment is empty or has invalid characters.
    #[error("invalid object type {0:?}")]
    InvalidType(String),

    /// The id segment is empty.
    #[error("object key {0:?} has an empty id")]
    EmptyId(String),

    /// A source tag could not be parsed.
    #[error("unknown source tag {0:?}")]
    UnknownSource(String),
}
