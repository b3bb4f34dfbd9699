//! Error types for the memory service.
//!
//! The crate uses a two-level error system:
//! - [`MemoryError`] is the top-level error returned by all public APIs, with
//!   variants mapping 1:1 onto the error taxonomy (`Validation`, `NotFound`,
//!   `Conflict`, `ServiceUnavailable`, `ResourceUnavailable`, `Internal`).
//! - Nested error types (`StorageError`, `RetrievalError`, `JobError`,
//!   `ChannelError`) carry subsystem-specific detail and convert into the
//!   taxonomy at the subsystem boundary; callers should rarely need to match
//!   on them directly.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Top-level error enum for all memory-service operations.
///
/// Variants correspond to the error taxonomy kinds, not to implementation
/// types: two very different underlying failures (a malformed tag name, an
/// oversized node) both surface as `Validation`.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid input shape, size, or pattern. Never retried.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Requested entity absent, or soft-deleted when not permitted. Never retried.
    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Unique-constraint violation during a race. Retried once transparently
    /// on write paths before being surfaced.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upstream provider down or circuit breaker open.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(#[from] ServiceUnavailableError),

    /// Connection pool exhausted or deadline exceeded. Never retried inline.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Invariant violation or internal bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// Storage-layer failure, converted from [`StorageError`].
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O failure underlying the storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Builds a `Conflict` error from any displayable cause.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Builds a `ResourceUnavailable` error from any displayable cause.
    pub fn resource_unavailable(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    /// Builds an `Internal` error from any displayable cause.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True if this is a `Validation` error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True if this is a `Conflict` error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True if this is a `ServiceUnavailable` error.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }

    /// True if this is a `ResourceUnavailable` error.
    pub fn is_resource_unavailable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable(_))
    }

    /// True if this is a storage-layer error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Maps this error onto a process exit code, per the external-interface
    /// contract used by CLI wrappers: `0` success, `1` generic, `2`
    /// validation, `3` not found, `4` service unavailable, `5` configuration.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::NotFound(_) => 3,
            Self::ServiceUnavailable(_) => 4,
            _ => 1,
        }
    }
}

/// Validation errors for input data (§7 `Validation`).
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Node content failed a shape/size constraint.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// Content exceeds the 1 MB node size limit.
    #[error("content too large: {size} bytes (max: {max} bytes)")]
    ContentTooLarge {
        /// Actual content size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// A required field was missing or empty.
    #[error("required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// Embedding dimension outside `[1, 2000]` or mismatched with the column.
    #[error("embedding dimension invalid: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension supplied.
        got: usize,
    },

    /// A tag name did not match the `[a-z0-9-]+(:[a-z0-9-]+)*` pattern.
    #[error("invalid tag name '{0}': must match [a-z0-9-]+(:[a-z0-9-]+)*")]
    InvalidTagName(String),

    /// An unrecognized timeframe phrase was supplied.
    #[error("unrecognized timeframe: '{0}'")]
    UnrecognizedTimeframe(String),
}

impl ValidationError {
    /// Creates an invalid-field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a content-too-large error.
    pub fn content_too_large(size: usize, max: usize) -> Self {
        Self::ContentTooLarge { size, max }
    }

    /// Creates a required-field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a dimension-mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }
}

/// Not-found errors for specific entity lookups (§7 `NotFound`).
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// No node with this id (or it is soft-deleted and `includeDeleted` was false).
    #[error("node not found: {0}")]
    Node(String),

    /// No tag with this id or name.
    #[error("tag not found: {0}")]
    Tag(String),

    /// No robot with this id or name.
    #[error("robot not found: {0}")]
    Robot(String),

    /// No file source with this id.
    #[error("file source not found: {0}")]
    FileSource(String),

    /// No robot group with this name.
    #[error("robot group not found: {0}")]
    Group(String),
}

impl NotFoundError {
    /// Creates a node-not-found error.
    pub fn node(id: impl ToString) -> Self {
        Self::Node(id.to_string())
    }

    /// Creates a tag-not-found error.
    pub fn tag(id: impl ToString) -> Self {
        Self::Tag(id.to_string())
    }

    /// Creates a robot-not-found error.
    pub fn robot(id: impl ToString) -> Self {
        Self::Robot(id.to_string())
    }

    /// Creates a file-source-not-found error.
    pub fn file_source(id: impl ToString) -> Self {
        Self::FileSource(id.to_string())
    }

    /// Creates a group-not-found error.
    pub fn group(name: impl ToString) -> Self {
        Self::Group(name.to_string())
    }
}

/// Service-unavailable errors (§7 `ServiceUnavailable`): provider outages and
/// open circuit breakers.
#[derive(Debug, Error)]
pub enum ServiceUnavailableError {
    /// The named circuit breaker is open; the call failed fast without
    /// reaching the provider.
    #[error("circuit breaker open for '{service}'")]
    CircuitOpen {
        /// Name of the upstream service (e.g. "embedding", "tagging").
        service: String,
    },

    /// The embedding provider failed.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// The tag-extraction provider failed.
    #[error("tag provider error: {0}")]
    Tagging(String),

    /// The group channel backend is unreachable.
    #[error("channel unavailable: {0}")]
    Channel(String),
}

impl ServiceUnavailableError {
    /// Creates a circuit-open error for the named service.
    pub fn circuit_open(service: impl Into<String>) -> Self {
        Self::CircuitOpen {
            service: service.into(),
        }
    }
}

/// Storage-layer errors (I/O, corruption, transactions, serialization).
///
/// These convert into [`MemoryError::Storage`] at the storage boundary and
/// are never leaked to callers as a distinct public-facing kind; the
/// taxonomy exposed to callers remains the six kinds in §7.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database file or table data is corrupted beyond recovery.
    #[error("database corrupted: {0}")]
    Corrupted(String),

    /// The database path does not exist and could not be created.
    #[error("database not found: {0}")]
    DatabaseNotFound(std::path::PathBuf),

    /// Another process holds the exclusive writer lock.
    #[error("database is locked by another writer")]
    DatabaseLocked,

    /// A transaction failed to commit or roll back.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A value failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The underlying embedded engine reported an error.
    #[error("storage engine error: {0}")]
    Engine(String),

    /// The on-disk schema version does not match the version this binary expects.
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Version this binary was built against.
        expected: u32,
        /// Version recorded in the database.
        found: u32,
    },

    /// A named table was missing from the database.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The full-text index failed to build or query.
    #[error("full-text index error: {0}")]
    FullText(String),
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates an engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Creates a full-text index error.
    pub fn fulltext(msg: impl Into<String>) -> Self {
        Self::FullText(msg.into())
    }
}

impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Engine(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Engine(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("commit failed: {err}"))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Engine(format!("table error: {err}"))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Engine(format!("storage error: {err}"))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

macro_rules! storage_into_memory_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for MemoryError {
                fn from(err: $ty) -> Self {
                    MemoryError::Storage(StorageError::from(err))
                }
            }
        )*
    };
}

storage_into_memory_error!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::CommitError,
    redb::TableError,
    redb::StorageError,
    bincode::Error,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::dimension_mismatch(384, 768);
        assert_eq!(
            err.to_string(),
            "embedding dimension invalid: expected 384, got 768"
        );
    }

    #[test]
    fn not_found_error_display() {
        let err = NotFoundError::node("abc-123");
        assert_eq!(err.to_string(), "node not found: abc-123");
    }

    #[test]
    fn is_not_found_predicate() {
        let err: MemoryError = NotFoundError::node("x").into();
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn is_validation_predicate() {
        let err: MemoryError = ValidationError::required_field("content").into();
        assert!(err.is_validation());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn not_found_exit_code() {
        let err: MemoryError = NotFoundError::robot("r1").into();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn service_unavailable_exit_code() {
        let err: MemoryError = ServiceUnavailableError::circuit_open("embedding").into();
        assert!(err.is_service_unavailable());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn generic_errors_exit_code_one() {
        assert_eq!(MemoryError::conflict("race").exit_code(), 1);
        assert_eq!(MemoryError::internal("bug").exit_code(), 1);
        assert_eq!(MemoryError::resource_unavailable("pool").exit_code(), 1);
    }

    #[test]
    fn storage_error_conversion_chain() {
        fn inner() -> Result<()> {
            Err(StorageError::corrupted("bad page"))?
        }
        let result = inner();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_storage());
    }

    #[test]
    fn circuit_open_error_message() {
        let err = ServiceUnavailableError::circuit_open("tagging");
        assert_eq!(err.to_string(), "circuit breaker open for 'tagging'");
    }
}
