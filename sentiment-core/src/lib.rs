//! Sentiment Core - binary sentiment classification with candle
//!
//! This crate implements the inference pipeline behind the HTTP service:
//! - Loading a pretrained BERT classifier from the Hugging Face Hub or disk
//! - Tokenization with truncation and padding
//! - Forward pass, softmax and label selection
//! - An async facade that runs inference on a bounded blocking pool

pub mod classifier;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod request;
pub mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use classifier::{BertClassifier, SequenceClassifier};
pub use engine::InferenceEngine;
pub use error::{Result, SentimentError};
pub use model::{DeviceChoice, Model, ModelConfig, ModelInfo, DEFAULT_MODEL_ID};
pub use registry::{ModelFiles, ModelRegistry};
pub use request::{PredictionResult, Sentiment, TextInput};
pub use service::{PredictionService, ServiceConfig};
