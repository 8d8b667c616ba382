//! Error types for txfs.
//!
//! All operations return `Result<T>` which aliases `Result<T, TxError>`.

use crate::registry::Witness;
use thiserror::Error;

/// Errors from transactional file system operations.
#[derive(Debug, Error)]
pub enum TxError {
    /// `begin()` called while a transaction is already open.
    #[error("A transaction is already open")]
    AlreadyOpen,

    /// `commit()` called with no open transaction.
    #[error("No transaction is open")]
    NoTransaction,

    /// Handle bookkeeping says the object exists but the backend disagrees.
    #[error("Object is missing from storage: {0}")]
    Missing(String),

    /// Operation on a handle whose path has been deleted.
    #[error("'{path}' was already deleted ({witness})")]
    AlreadyDeleted { path: String, witness: Witness },

    /// Storage backend refused an operation.
    #[error("Storage {op} failed for '{path}': {source}")]
    Storage {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Target of a create, rename or duplicate already exists.
    #[error("Target already exists: {0}")]
    AlreadyExists(String),

    /// Path could not be normalized.
    #[error("Invalid path '{0}': {1}")]
    InvalidPath(String, String),

    /// Directory rename or copy into its own subtree.
    #[error("Cannot move '{from}' into its own subtree '{to}'")]
    IntoOwnSubtree { from: String, to: String },

    /// File handle built for a directory path or vice versa.
    #[error("Wrong kind of path '{0}': {1}")]
    KindMismatch(String, String),

    /// Plan file is structurally invalid.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// File system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml_edit::TomlError),

    /// Unexpected error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TxError {
    pub(crate) fn storage(op: &'static str, path: &str, source: std::io::Error) -> Self {
        TxError::Storage {
            op,
            path: path.to_string(),
            source,
        }
    }

    /// Returns `true` for caller-level misuse rejected before any log entry is produced.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TxError::AlreadyExists(_)
                | TxError::InvalidPath(..)
                | TxError::IntoOwnSubtree { .. }
                | TxError::KindMismatch(..)
        )
    }
}

/// Result type alias for txfs operations.
pub type Result<T> = std::result::Result<T, TxError>;
