//! Error types and handling for bundle conversion

use crate::export::BuildError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tabfhir operations
#[derive(Debug, Error)]
pub enum TabfhirError {
    /// A field assignment hit a structural problem and the document build was aborted
    #[error("Structural error in entity '{entity}' at path '{path}': {source}")]
    Structural {
        entity: String,
        path: String,
        #[source]
        source: BuildError,
    },

    /// Input records could not be read or are malformed
    #[error("Ingest error in '{source_name}': {message}")]
    IngestError {
        source_name: String,
        message: String,
    },

    /// CSV sheet reading errors
    #[error("CSV error for path '{path}': {source}")]
    CsvError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Ingest,
    Config,
    Io,
    Json,
    Internal,
}

impl TabfhirError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TabfhirError::Structural { .. } => ErrorKind::Structural,
            TabfhirError::IngestError { .. } => ErrorKind::Ingest,
            TabfhirError::CsvError { .. } => ErrorKind::Ingest,
            TabfhirError::ConfigError { .. } => ErrorKind::Config,
            TabfhirError::IoError { .. } => ErrorKind::Io,
            TabfhirError::JsonError(_) => ErrorKind::Json,
            TabfhirError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable (other subjects can still be converted)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Structural)
    }

    /// Create a structural error for a field of an entity
    pub fn structural(
        entity: impl Into<String>,
        path: impl Into<String>,
        source: BuildError,
    ) -> Self {
        Self::Structural {
            entity: entity.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an ingest error
    pub fn ingest_error(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IngestError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for TabfhirError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}
