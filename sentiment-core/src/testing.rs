//! In-memory model for tests
//!
//! A whitespace/word-level tokenizer with BERT-style special tokens, and a
//! classifier that scores text by counting positive and negative words. Both
//! are deterministic and need no downloads.

use candle_core::{Device, Tensor};
use std::collections::HashSet;
use tokenizers::Tokenizer;

use crate::classifier::SequenceClassifier;
use crate::model::Model;

pub const SPECIAL_TOKENS: [&str; 4] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]"];
pub const POSITIVE_WORDS: [&str; 6] = ["loved", "love", "great", "excellent", "wonderful", "fantastic"];
pub const NEGATIVE_WORDS: [&str; 6] = ["terrible", "boring", "awful", "hated", "bad", "worst"];
const NEUTRAL_WORDS: [&str; 12] = [
    "i", "really", "this", "movie", "was", "and", "it", "but", "the", "ending", "!", ".",
];

/// `tokenizer.json` contents for the lexicon tokenizer.
pub fn lexicon_tokenizer_json() -> String {
    let vocab: serde_json::Map<String, serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .chain(POSITIVE_WORDS.iter())
        .chain(NEGATIVE_WORDS.iter())
        .chain(NEUTRAL_WORDS.iter())
        .enumerate()
        .map(|(id, token)| (token.to_string(), serde_json::Value::from(id as u32)))
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": {
            "type": "BertProcessing",
            "sep": ["[SEP]", 3],
            "cls": ["[CLS]", 2]
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    })
    .to_string()
}

pub fn lexicon_tokenizer() -> Tokenizer {
    Tokenizer::from_bytes(lexicon_tokenizer_json().as_bytes())
        .expect("lexicon tokenizer json is valid")
}

/// Scores `[negatives, positives]` from word counts under the attention mask.
#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    positive: HashSet<u32>,
    negative: HashSet<u32>,
    num_labels: usize,
}

impl LexiconClassifier {
    pub fn new(tokenizer: &Tokenizer) -> Self {
        Self::with_labels(tokenizer, 2)
    }

    /// Report `num_labels` classes; used to exercise label-count validation.
    pub fn with_labels(tokenizer: &Tokenizer, num_labels: usize) -> Self {
        let ids = |words: &[&str]| -> HashSet<u32> {
            words.iter().filter_map(|w| tokenizer.token_to_id(w)).collect()
        };
        Self {
            positive: ids(&POSITIVE_WORDS[..]),
            negative: ids(&NEGATIVE_WORDS[..]),
            num_labels,
        }
    }
}

impl SequenceClassifier for LexiconClassifier {
    fn forward(
        &self,
        input_ids: &Tensor,
        _token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let ids: Vec<Vec<u32>> = input_ids.to_vec2()?;
        let mask: Vec<Vec<u32>> = attention_mask.to_vec2()?;

        let mut logits = Vec::with_capacity(ids.len() * 2);
        for (row_ids, row_mask) in ids.iter().zip(mask.iter()) {
            let (mut negative, mut positive) = (0f32, 0f32);
            for (id, _) in row_ids.iter().zip(row_mask.iter()).filter(|(_, m)| **m == 1) {
                if self.negative.contains(id) {
                    negative += 1.0;
                } else if self.positive.contains(id) {
                    positive += 1.0;
                }
            }
            logits.push(negative);
            logits.push(positive);
        }

        Tensor::from_vec(logits, (ids.len(), 2), input_ids.device())
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

/// Lexicon model on CPU truncating at `max_length` tokens.
pub fn lexicon_model(max_length: usize) -> Model {
    let tokenizer = lexicon_tokenizer();
    let classifier = LexiconClassifier::new(&tokenizer);
    Model::new("lexicon", tokenizer, classifier, Device::Cpu, max_length)
        .expect("lexicon model is valid")
}
