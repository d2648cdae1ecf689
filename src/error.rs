use std::time::Duration;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed content descriptor.
    #[error("Invalid book: {0}")]
    Validation(String),

    /// A resource could not be fetched by any path.
    #[error("Failed to load resource {src}: {reason}")]
    ResourceLoad {
        /// Locator of the resource.
        src: String,
        /// Last failure reported for it.
        reason: String,
    },

    /// The resource batch did not settle in time.
    #[error("Loading of some resources timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    /// Archive could not be written.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Descriptor JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether the error came out of the resource loading phase.
    ///
    /// These are the only errors `allow_errors` can turn into warnings.
    pub fn is_load_error(&self) -> bool {
        matches!(self, AppError::ResourceLoad { .. } | AppError::Timeout(_))
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
