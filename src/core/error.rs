//! Typed error handling for the repository layer
//!
//! Every fallible operation returns [`RepositoryError`], which wraps one of
//! the category enums below so callers can match on the failure class
//! without string inspection.
//!
//! # Error Categories
//!
//! - [`ConfigError`]: missing key/dataset declarations, unknown entity types,
//!   malformed model configuration
//! - [`CoercionError`]: an identifier that cannot be converted to the key's
//!   declared value kind
//! - [`RepositoryError::Cardinality`]: a by-key lookup matched more than one row
//! - [`StorageError`]: anything the backing session raised while translating,
//!   executing or committing
//!
//! # Example
//!
//! ```rust,ignore
//! match repo.get_by_id(42.into()) {
//!     Ok(Some(person)) => println!("found {}", person.name),
//!     Ok(None) => println!("no such person"),
//!     Err(RepositoryError::Cardinality { matches, .. }) => {
//!         eprintln!("key is not unique ({} rows)", matches);
//!     }
//!     Err(e) => eprintln!("{} ({})", e, e.error_code()),
//! }
//! ```

use crate::core::field::{FieldValue, ValueKind};
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = RepositoryError> = std::result::Result<T, E>;

/// The main error type for repository and session operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Configuration errors (fatal, never retried)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Identifier coercion errors
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// A by-key lookup matched more than one entity
    #[error("Key lookup on '{entity_type}' for {key} matched {matches} entities")]
    Cardinality {
        entity_type: String,
        key: FieldValue,
        matches: usize,
    },

    /// Errors raised by the backing store
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RepositoryError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RepositoryError::Config(e) => e.error_code(),
            RepositoryError::Coercion(_) => "COERCION_ERROR",
            RepositoryError::Cardinality { .. } => "AMBIGUOUS_KEY",
            RepositoryError::Storage(e) => e.error_code(),
        }
    }

    /// Whether this error is a configuration problem
    pub fn is_config(&self) -> bool {
        matches!(self, RepositoryError::Config(_))
    }

    /// Whether the operation was abandoned because its cancellation token fired
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RepositoryError::Storage(StorageError::Cancelled { .. }))
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to repository and model configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The repository was built without a key selector
    #[error("No key defined for entity type '{entity_type}'")]
    KeyNotDefined { entity_type: String },

    /// The repository was built without a dataset accessor
    #[error("Dataset not configured for entity type '{entity_type}'")]
    DatasetNotConfigured { entity_type: String },

    /// The entity type is not registered in the model catalog
    #[error("Entity type '{entity_type}' is not registered in the model catalog")]
    UnknownEntity { entity_type: String },

    /// An include path names a navigation the model does not declare
    #[error("Entity type '{entity_type}' has no navigation named '{navigation}'")]
    UnknownNavigation {
        entity_type: String,
        navigation: String,
    },

    /// Failed to parse configuration
    #[error("Failed to parse config{}: {message}", .file.as_ref().map(|f| format!(" file '{}'", f)).unwrap_or_default())]
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Invalid value in configuration
    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::KeyNotDefined { .. } => "KEY_NOT_DEFINED",
            ConfigError::DatasetNotConfigured { .. } => "DATASET_NOT_CONFIGURED",
            ConfigError::UnknownEntity { .. } => "UNKNOWN_ENTITY",
            ConfigError::UnknownNavigation { .. } => "UNKNOWN_NAVIGATION",
            ConfigError::ParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
        }
    }
}

// =============================================================================
// Coercion Errors
// =============================================================================

/// A value could not be converted to the requested kind
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Cannot convert {value} to {target}")]
pub struct CoercionError {
    pub value: FieldValue,
    pub target: ValueKind,
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection error
    #[error("Failed to connect to {backend}: {message}")]
    ConnectionError { backend: String, message: String },

    /// Query translation or execution error
    #[error("{backend} query error: {message}")]
    QueryError { backend: String, message: String },

    /// Transaction error
    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    /// Data integrity error (duplicate key, missing row on update/delete)
    #[error("Data integrity error: {message}")]
    IntegrityError { message: String },

    /// Entity could not be converted to or from its row form
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The caller's cancellation token fired
    #[error("Operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    /// Backend not available
    #[error("Storage backend '{backend}' is unavailable: {message}")]
    Unavailable { backend: String, message: String },
}

impl StorageError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::ConnectionError { .. } => "STORAGE_CONNECTION_ERROR",
            StorageError::QueryError { .. } => "STORAGE_QUERY_ERROR",
            StorageError::TransactionError { .. } => "STORAGE_TRANSACTION_ERROR",
            StorageError::IntegrityError { .. } => "STORAGE_INTEGRITY_ERROR",
            StorageError::Serialization { .. } => "STORAGE_SERIALIZATION_ERROR",
            StorageError::Cancelled { .. } => "CANCELLED",
            StorageError::Unavailable { .. } => "STORAGE_UNAVAILABLE",
        }
    }

    pub(crate) fn cancelled(operation: &str) -> Self {
        StorageError::Cancelled {
            operation: operation.to_string(),
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Storage(StorageError::Serialization {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for RepositoryError {
    fn from(err: serde_yaml::Error) -> Self {
        RepositoryError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        let storage = match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::IntegrityError {
                message: db.message().to_string(),
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                StorageError::ConnectionError {
                    backend: "postgres".to_string(),
                    message: err.to_string(),
                }
            }
            _ => StorageError::QueryError {
                backend: "postgres".to_string(),
                message: err.to_string(),
            },
        };
        RepositoryError::Storage(storage)
    }
}
