//! Error taxonomy for model loading and inference.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentimentError {
    // Model loading
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Invalid model format: {0}")]
    ModelFormat(String),

    #[error("Failed to load tokenizer: {0}")]
    TokenizerLoad(String),

    #[error("Device error: {0}")]
    Device(String),

    // Request time
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference worker failed: {0}")]
    Worker(String),

    // Pass-through from dependencies
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SentimentError>;

impl SentimentError {
    /// Stable snake-case name of the error kind, suitable for API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            SentimentError::ModelNotFound(_) => "model_not_found",
            SentimentError::Download(_) => "download_error",
            SentimentError::ModelFormat(_) => "model_format_error",
            SentimentError::TokenizerLoad(_) => "tokenizer_load_error",
            SentimentError::Device(_) => "device_error",
            SentimentError::Tokenization(_) => "tokenization_error",
            SentimentError::Inference(_) => "inference_error",
            SentimentError::Timeout(_) => "timeout",
            SentimentError::Worker(_) => "worker_error",
            SentimentError::Io(_) => "io_error",
            SentimentError::SerdeJson(_) => "json_error",
        }
    }

    /// True when the failure was caused by the caller's input rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SentimentError::Tokenization(_))
    }

    pub(crate) fn model_format(err: impl std::fmt::Display) -> Self {
        SentimentError::ModelFormat(err.to_string())
    }
}

/// Tensor-engine failures surface at request time, so they map to `Inference`.
/// Load paths map candle errors explicitly with [`SentimentError::model_format`].
impl From<candle_core::Error> for SentimentError {
    fn from(value: candle_core::Error) -> Self {
        SentimentError::Inference(value.to_string())
    }
}

impl From<hf_hub::api::sync::ApiError> for SentimentError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        SentimentError::Download(value.to_string())
    }
}
