//! Error types shared by every pipeline stage

use thiserror::Error;

/// Errors surfaced to the interactive caller.
///
/// None of these are retried; every run is user initiated and can simply be
/// repeated once the input or config is fixed.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The upload could not be read as the format its name announced
    #[error("Failed to parse upload: {0}")]
    Parse(String),

    /// A required column is missing or holds values of the wrong kind
    #[error("Schema error: {0}")]
    Schema(String),

    /// The persisted configuration is missing, malformed or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Degenerate label distribution during class weight resolution
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Feature set of the input does not match the model
    #[error("Incompatible feature set: {0}")]
    Compatibility(String),

    /// Chart output failed
    #[error("Render error: {0}")]
    Render(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
