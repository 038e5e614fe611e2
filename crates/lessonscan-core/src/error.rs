//! Error taxonomy for processing a single image.
//!
//! Every variant maps to a stable snake_case [`ErrorKind`] code that ends up
//! on [`crate::PipelineResult::error`], so callers can match on it without
//! parsing messages.

use serde::{Deserialize, Serialize};

/// Errors that can occur while an image moves through the pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// Input is missing, unreadable, or not a raster image with non-zero size
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// OCR engine binary or service missing, crashed, or timed out
    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    /// OCR engine could not read the image it was given
    #[error("OCR engine could not decode image: {0}")]
    DecodeError(String),

    /// Network, auth, or timeout failure talking to the language model
    #[error("Language model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model reply was not a JSON object, even after repair
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    /// OCR succeeded but found no text
    #[error("No text recognized in image")]
    NoText,

    /// Caller cancelled processing
    #[error("Processing cancelled")]
    Cancelled,
}

/// Serializable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidImage,
    EngineUnavailable,
    DecodeError,
    ModelUnavailable,
    MalformedModelOutput,
    NoText,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidImage => write!(f, "invalid_image"),
            ErrorKind::EngineUnavailable => write!(f, "engine_unavailable"),
            ErrorKind::DecodeError => write!(f, "decode_error"),
            ErrorKind::ModelUnavailable => write!(f, "model_unavailable"),
            ErrorKind::MalformedModelOutput => write!(f, "malformed_model_output"),
            ErrorKind::NoText => write!(f, "no_text"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl PipelineError {
    /// Get the error code for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidImage(_) => ErrorKind::InvalidImage,
            PipelineError::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            PipelineError::DecodeError(_) => ErrorKind::DecodeError,
            PipelineError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            PipelineError::MalformedModelOutput(_) => ErrorKind::MalformedModelOutput,
            PipelineError::NoText => ErrorKind::NoText,
            PipelineError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
