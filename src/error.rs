//! Error types for the consultation report crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::builder::PdfBuildError;
use crate::form::FormErrors;

/// The main error type for consultation report operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Form Errors ===
    /// The submitted form did not pass validation.
    #[error("form validation failed: {0}")]
    Validation(FormErrors),

    /// No report is stored under the requested id.
    #[error("consultation report {id} not found")]
    NotFound {
        /// The requested report id.
        id: i64,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// A stored row could not be mapped back into a report.
    #[error("corrupt report row: {message}")]
    CorruptRow {
        /// Description of the offending column.
        message: String,
    },

    // === Media Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing a stored logo failed.
    #[error("media file {path}: {source}")]
    Media {
        /// Absolute path of the media file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A media path escaped the media root.
    #[error("invalid media path: {0}")]
    InvalidMediaPath(String),

    // === Rendering Errors ===
    /// PDF rendering failed.
    #[error("PDF rendering failed: {0}")]
    Render(#[from] PdfBuildError),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for consultation report operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<FormErrors> for Error {
    fn from(errors: FormErrors) -> Self {
        Self::Validation(errors)
    }
}

impl Error {
    /// Returns the form errors when this error is a validation failure.
    #[must_use]
    pub fn form_errors(&self) -> Option<&FormErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Check if this error indicates a missing report.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
