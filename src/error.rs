//! Error types for the background-removal service

use thiserror::Error;

/// Result type alias for background-removal operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error kinds for background-removal operations
///
/// Callers branch on the variant rather than on message strings: validation
/// and lookup failures map to client errors at the HTTP boundary, while
/// pipeline failures are captured per job and surfaced through polling.
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or decoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Request rejected before processing (wrong content type, undecodable upload)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown job or stash identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Result requested before the job reached a terminal state
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Any failure inside the processing pipeline
    #[error("Processing error: {0}")]
    Processing(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CutoutError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new not-ready error
    pub fn not_ready<S: Into<String>>(msg: S) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a processing error with pipeline stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {info})"),
            None => String::new(),
        };

        Self::Processing(format!("Processing failed at stage '{stage}'{input_context}: {details}"))
    }
}
