//! Error handling module for the stampt CLI.
//!
//! Errors raised by the metadata layer are wrapped unchanged so their
//! messages reach the user as written.

use thiserror::Error;

/// Main error type for the stampt CLI application.
#[derive(Error, Debug)]
pub enum StamptError {
    /// Error when a configuration file is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised while loading or building metadata tables.
    #[error("Metadata error: {0}")]
    Metadata(#[from] stampgc::StampError),

    /// Error when an artifact loads but does not satisfy a requested check.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A class name or stamp given on the command line is not registered.
    #[error("Unknown class `{0}`")]
    UnknownClass(String),

    /// Error when IO operations fail.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error when JSON serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using StamptError.
pub type Result<T> = std::result::Result<T, StamptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = StamptError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_validation_error_display() {
        let err = StamptError::Validation("build id mismatch".to_string());
        assert_eq!(err.to_string(), "Validation error: build id mismatch");
    }

    #[test]
    fn test_unknown_class_display() {
        let err = StamptError::UnknownClass("Widget".to_string());
        assert_eq!(err.to_string(), "Unknown class `Widget`");
    }

    #[test]
    fn test_metadata_error_from() {
        let err: StamptError = stampgc::StampError::Artifact("format 7".to_string()).into();
        assert!(matches!(err, StamptError::Metadata(_)));
        assert_eq!(err.to_string(), "Metadata error: Artifact error: format 7");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StamptError = io_err.into();
        assert!(matches!(err, StamptError::Io(_)));
    }
}
