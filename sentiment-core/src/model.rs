//! Loaded model handle and its configuration

use candle_core::{DType, Device};
use std::fmt;
use std::str::FromStr;
use tokenizers::{PaddingParams, PaddingStrategy, PostProcessor, Tokenizer, TruncationParams};
use tracing::warn;

use crate::classifier::SequenceClassifier;
use crate::error::{Result, SentimentError};

/// Pretrained bundle served when nothing else is configured.
pub const DEFAULT_MODEL_ID: &str = "ahsanfolium/ai-intern-imdb-sentiment-bert";

/// Number of classes the service understands.
pub const NUM_CLASSES: usize = 2;

/// Where inference runs. Resolved exactly once, at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceChoice {
    /// Accelerator if one is available, otherwise CPU
    #[default]
    Auto,
    Cpu,
    /// CUDA or Metal; loading fails if neither is usable
    Accelerator,
}

impl DeviceChoice {
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceChoice::Cpu => Ok(Device::Cpu),
            DeviceChoice::Auto => Ok(accelerator().unwrap_or(Device::Cpu)),
            DeviceChoice::Accelerator => accelerator().ok_or_else(|| {
                SentimentError::Device("no CUDA or Metal device is available".to_string())
            }),
        }
    }
}

impl FromStr for DeviceChoice {
    type Err = SentimentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(DeviceChoice::Auto),
            "cpu" => Ok(DeviceChoice::Cpu),
            "accelerator" | "gpu" | "cuda" | "metal" => Ok(DeviceChoice::Accelerator),
            other => Err(SentimentError::Device(format!(
                "unknown device '{}', expected auto, cpu or accelerator",
                other
            ))),
        }
    }
}

fn accelerator() -> Option<Device> {
    if candle_core::utils::cuda_is_available() {
        match Device::new_cuda(0) {
            Ok(device) => return Some(device),
            Err(e) => warn!("CUDA reported available but failed to initialize: {}", e),
        }
    }
    if candle_core::utils::metal_is_available() {
        match Device::new_metal(0) {
            Ok(device) => return Some(device),
            Err(e) => warn!("Metal reported available but failed to initialize: {}", e),
        }
    }
    None
}

pub(crate) fn device_name(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}

/// Configuration for model loading
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Hugging Face model ID, or a local directory holding the same files
    pub model_id: String,
    /// Model revision/branch (ignored for local directories)
    pub revision: String,
    pub device: DeviceChoice,
    /// Data type for model weights
    pub dtype: DType,
    /// Truncation length in tokens; defaults to the model's position limit
    pub max_length: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            device: DeviceChoice::Auto,
            dtype: DType::F32,
            max_length: None,
        }
    }
}

impl ModelConfig {
    pub fn with_model_id(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }
}

/// Read-only description of a loaded model
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub device: String,
    pub max_length: usize,
    pub num_labels: usize,
}

/// Tokenizer, classifier and device placement, immutable after construction.
///
/// Shared behind an `Arc` by every inference call; nothing here is mutated
/// after [`Model::new`] returns.
pub struct Model {
    model_id: String,
    tokenizer: Tokenizer,
    classifier: Box<dyn SequenceClassifier>,
    device: Device,
    max_length: usize,
}

impl Model {
    /// Assemble a model from its parts.
    ///
    /// The tokenizer is configured to truncate at `max_length` tokens and to
    /// pad batches to their longest member.
    pub fn new(
        model_id: impl Into<String>,
        tokenizer: Tokenizer,
        classifier: impl SequenceClassifier + 'static,
        device: Device,
        max_length: usize,
    ) -> Result<Self> {
        let model_id = model_id.into();
        if classifier.num_labels() != NUM_CLASSES {
            return Err(SentimentError::ModelFormat(format!(
                "{} has {} labels, expected a binary classifier",
                model_id,
                classifier.num_labels()
            )));
        }

        // Truncation must leave room for the special tokens plus some content
        let special_tokens = tokenizer
            .get_post_processor()
            .map_or(0, |p| p.added_tokens(false));
        if max_length <= special_tokens {
            return Err(SentimentError::ModelFormat(format!(
                "max_length {} leaves no room for text after {} special tokens",
                max_length, special_tokens
            )));
        }

        let tokenizer = configure_tokenizer(tokenizer, max_length)?;

        Ok(Self {
            model_id,
            tokenizer,
            classifier: Box::new(classifier),
            device,
            max_length,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn classifier(&self) -> &dyn SequenceClassifier {
        self.classifier.as_ref()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_id: self.model_id.clone(),
            device: device_name(&self.device).to_string(),
            max_length: self.max_length,
            num_labels: self.classifier.num_labels(),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("model_id", &self.model_id)
            .field("device", &device_name(&self.device))
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

fn configure_tokenizer(mut tokenizer: Tokenizer, max_length: usize) -> Result<Tokenizer> {
    let pad_id = tokenizer
        .get_padding()
        .map(|p| p.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .unwrap_or(0);
    let pad_token = tokenizer
        .id_to_token(pad_id)
        .unwrap_or_else(|| "[PAD]".to_string());

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| SentimentError::TokenizerLoad(format!("invalid truncation: {}", e)))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token,
        ..Default::default()
    }));

    Ok(tokenizer)
}
