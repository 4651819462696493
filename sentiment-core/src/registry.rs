//! Model loading
//!
//! Resolves a model identifier to its files (local directory or Hugging Face
//! Hub), builds the BERT classifier on the selected device and returns an
//! immutable [`Model`]. Called once per process.

use candle_core::Device;
use candle_nn::VarBuilder;
use candle_transformers::models::bert::Config as BertConfig;
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::classifier::BertClassifier;
use crate::error::{Result, SentimentError};
use crate::model::{device_name, Model, ModelConfig, NUM_CLASSES};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_FILE: &str = "model.safetensors";
const PTH_FILE: &str = "pytorch_model.bin";

/// Files making up a pretrained classifier bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Fields of `config.json` needed beyond what the BERT config carries.
#[derive(Debug, Deserialize)]
struct ClassifierConfigJson {
    #[serde(default)]
    model_type: Option<String>,
    hidden_size: usize,
    max_position_embeddings: usize,
    #[serde(default)]
    num_labels: Option<usize>,
    #[serde(default)]
    id2label: HashMap<String, String>,
}

impl ClassifierConfigJson {
    fn num_labels(&self) -> usize {
        self.num_labels.unwrap_or(if self.id2label.is_empty() {
            NUM_CLASSES
        } else {
            self.id2label.len()
        })
    }
}

/// Loads the classifier named by a [`ModelConfig`].
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    config: ModelConfig,
}

impl ModelRegistry {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Resolve, load and validate the model. Any failure is fatal to start-up.
    pub fn load(&self) -> Result<Model> {
        info!("Loading model: {}", self.config.model_id);
        let device = self.config.device.resolve()?;
        info!("Selected device: {}", device_name(&device));

        let files = self.resolve_files()?;
        load_from_files(&self.config, &files, device)
    }

    /// Locate the bundle's files, downloading them if needed.
    pub fn resolve_files(&self) -> Result<ModelFiles> {
        let local = Path::new(&self.config.model_id);
        if local.is_dir() {
            info!("Using local model directory {}", local.display());
            return local_files(local);
        }
        hub_files(&self.config.model_id, &self.config.revision)
    }
}

fn local_files(dir: &Path) -> Result<ModelFiles> {
    let require = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SentimentError::ModelNotFound(format!(
                "{} is missing from {}",
                name,
                dir.display()
            )))
        }
    };

    let weights = require(SAFETENSORS_FILE).or_else(|_| require(PTH_FILE))?;
    Ok(ModelFiles {
        config: require(CONFIG_FILE)?,
        tokenizer: require(TOKENIZER_FILE)?,
        weights,
    })
}

fn hub_files(model_id: &str, revision: &str) -> Result<ModelFiles> {
    let api = Api::new()?;
    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    info!("Fetching tokenizer...");
    let tokenizer = repo.get(TOKENIZER_FILE)?;
    info!("Fetching model config...");
    let config = repo.get(CONFIG_FILE)?;
    info!("Fetching model weights...");
    let weights = repo.get(SAFETENSORS_FILE).or_else(|_| repo.get(PTH_FILE))?;

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

/// Build a [`Model`] from already-resolved files.
pub fn load_from_files(config: &ModelConfig, files: &ModelFiles, device: Device) -> Result<Model> {
    let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
        SentimentError::TokenizerLoad(format!("'{}': {}", files.tokenizer.display(), e))
    })?;

    let config_str = std::fs::read_to_string(&files.config)?;
    let class_cfg: ClassifierConfigJson = serde_json::from_str(&config_str)?;
    match class_cfg.model_type.as_deref() {
        Some("bert") | None => {}
        Some(other) => {
            return Err(SentimentError::ModelFormat(format!(
                "unsupported architecture '{}', expected bert",
                other
            )))
        }
    }
    let num_labels = class_cfg.num_labels();
    if num_labels != NUM_CLASSES {
        return Err(SentimentError::ModelFormat(format!(
            "{} declares {} labels, expected {}",
            config.model_id, num_labels, NUM_CLASSES
        )));
    }
    let bert_config: BertConfig =
        serde_json::from_str(&config_str).map_err(SentimentError::model_format)?;

    let max_length = match config.max_length {
        Some(requested) if requested > class_cfg.max_position_embeddings => {
            warn!(
                "max_length {} exceeds the model limit of {}, clamping",
                requested, class_cfg.max_position_embeddings
            );
            class_cfg.max_position_embeddings
        }
        Some(requested) => requested,
        None => class_cfg.max_position_embeddings,
    };

    let vb = if files.weights.extension().is_some_and(|e| e == "safetensors") {
        unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights.clone()], config.dtype, &device)
                .map_err(SentimentError::model_format)?
        }
    } else {
        VarBuilder::from_pth(&files.weights, config.dtype, &device)
            .map_err(SentimentError::model_format)?
    };

    let classifier = BertClassifier::load(vb, &bert_config, class_cfg.hidden_size, num_labels)
        .map_err(|e| SentimentError::ModelFormat(format!("failed to build classifier: {}", e)))?;

    Model::new(config.model_id.clone(), tokenizer, classifier, device, max_length)
}
