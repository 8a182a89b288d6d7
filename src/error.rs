//! Error types for the index and query engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Identifier '{ident}' is ambiguous ({count} matches)")]
    AmbiguousIdentifier { ident: String, count: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index schema version {found} is newer than supported version {supported}")]
    SchemaVersionUnsupported { found: i64, supported: i64 },

    #[error("Index schema version {found} requires migration to {supported}")]
    MigrationRequired { found: i64, supported: i64 },

    #[error("({ty}, {key}) already belongs to node '{existing}', cannot reassign to '{conflicting}'")]
    DuplicateTypeKey {
        ty: String,
        key: String,
        existing: String,
        conflicting: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl IndexError {
    /// Get stable error code for CLI exit messages and JSON error payloads
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::NodeNotFound(_) => "NODE_NOT_FOUND",
            IndexError::AmbiguousIdentifier { .. } => "AMBIGUOUS_IDENTIFIER",
            IndexError::InvalidArgument(_) => "INVALID_ARGUMENT",
            IndexError::SchemaVersionUnsupported { .. } => "SCHEMA_VERSION_UNSUPPORTED",
            IndexError::MigrationRequired { .. } => "MIGRATION_REQUIRED",
            IndexError::DuplicateTypeKey { .. } => "DUPLICATE_TYPE_KEY",
            IndexError::Cancelled => "CANCELLED",
            IndexError::Io(_) | IndexError::Store(_) | IndexError::Json(_) | IndexError::Watch(_) => {
                "IO_ERROR"
            }
        }
    }
}
