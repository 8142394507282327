use std::fmt;
use std::io;

/// Unified error type for the entire store.
///
/// Every failure an accessor can produce is classifiable into one of these
/// variants, so callers (typically the enclosing web application) can map
/// them onto user-visible responses without string matching.
#[derive(Debug)]
pub enum FormStoreError {
    /// A unique lookup, update or delete found no matching row
    NotFound {
        entity: &'static str,
        key: String,
    },

    /// An insert or update collided with an existing row on a unique key
    UniqueViolation {
        entity: &'static str,
        index: &'static str,
        key: String,
    },

    /// A record references a parent row that does not exist, or a parent
    /// delete would leave dangling children
    ForeignKeyViolation {
        entity: &'static str,
        parent: &'static str,
        key: String,
    },

    /// A required field was missing or malformed before reaching the engine
    Validation {
        entity: &'static str,
        message: String,
    },

    /// A transaction timed out, exceeded its lock wait, or was rolled back
    TransactionAborted(String),

    /// Errors surfaced by the underlying storage engine
    Database(String),

    /// Errors related to serialization/deserialization of record values
    Serialization(String),

    /// Errors related to IO operations
    Io(io::Error),

    /// Errors related to configuration
    Config(String),
}

impl fmt::Display for FormStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, key } => {
                write!(f, "{} not found: {}", entity, key)
            }
            Self::UniqueViolation { entity, index, key } => {
                write!(f, "Unique constraint violation on {} ({}): {}", entity, index, key)
            }
            Self::ForeignKeyViolation { entity, parent, key } => {
                write!(
                    f,
                    "Foreign key violation on {}: {} '{}' is missing or still referenced",
                    entity, parent, key
                )
            }
            Self::Validation { entity, message } => {
                write!(f, "Validation error on {}: {}", entity, message)
            }
            Self::TransactionAborted(msg) => write!(f, "Transaction aborted: {}", msg),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for FormStoreError {}

/// Conversion from sled::Error to FormStoreError
impl From<sled::Error> for FormStoreError {
    fn from(error: sled::Error) -> Self {
        FormStoreError::Database(error.to_string())
    }
}

/// Conversion from serde_json::Error to FormStoreError
impl From<serde_json::Error> for FormStoreError {
    fn from(error: serde_json::Error) -> Self {
        FormStoreError::Serialization(error.to_string())
    }
}

/// Conversion from io::Error to FormStoreError
impl From<io::Error> for FormStoreError {
    fn from(error: io::Error) -> Self {
        FormStoreError::Io(error)
    }
}

/// Conversion from ConfigError to FormStoreError
impl From<crate::config::ConfigError> for FormStoreError {
    fn from(error: crate::config::ConfigError) -> Self {
        FormStoreError::Config(error.to_string())
    }
}

/// Result type alias for operations that can result in a FormStoreError
pub type FormStoreResult<T> = Result<T, FormStoreError>;

impl FormStoreError {
    /// True when the error is a classifiable constraint failure rather than
    /// an engine or IO fault.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { .. } | Self::ForeignKeyViolation { .. }
        )
    }
}
