//! Inference engine - tokenizes text, runs the classifier and scores the result
//!
//! One call is one forward pass over a batch of size one. The engine holds
//! nothing but a shared reference to the immutable [`Model`], so a single
//! engine can serve any number of threads.

use candle_core::{DType, Tensor, D};
use std::sync::Arc;
use tracing::debug;

use crate::encoding::prepare_input;
use crate::error::{Result, SentimentError};
use crate::model::{Model, NUM_CLASSES};
use crate::request::{PredictionResult, Sentiment};

/// Decimal places kept in reported confidences
pub const CONFIDENCE_DECIMALS: i32 = 4;

/// Runs single-text predictions against a shared model
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    model: Arc<Model>,
}

impl InferenceEngine {
    pub fn new(model: Arc<Model>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Classify `text`.
    ///
    /// Input beyond the model's maximum length is dropped without signalling
    /// the caller; empty input is classified like any other.
    pub fn predict(&self, text: &str) -> Result<PredictionResult> {
        let encoding = self.model.tokenizer().encode(text, true).map_err(|e| {
            SentimentError::Tokenization(format!(
                "Tokenization failed on '{}': {}",
                text.chars().take(50).collect::<String>(),
                e
            ))
        })?;

        let overflow = encoding.get_overflowing().len();
        if overflow > 0 {
            debug!(
                "Input truncated to {} tokens ({} overflow window(s) dropped)",
                encoding.len(),
                overflow
            );
        }

        let input = prepare_input(&encoding, self.model.device())?;
        let logits = self.model.classifier().forward(
            &input.input_ids,
            &input.token_type_ids,
            &input.attention_mask,
        )?;

        let probs = class_probabilities(&logits)?;
        let (index, probability) = select_class(&probs)?;
        let sentiment = Sentiment::from_class_index(index).ok_or_else(|| {
            SentimentError::Inference(format!("class index {} has no label", index))
        })?;

        Ok(PredictionResult {
            sentiment,
            confidence: round_confidence(probability),
        })
    }
}

/// Softmax over the class dimension of `(1, 2)` logits.
pub fn class_probabilities(logits: &Tensor) -> Result<Vec<f32>> {
    if logits.dims() != [1, NUM_CLASSES] {
        return Err(SentimentError::Inference(format!(
            "expected logits of shape (1, {}), got {:?}",
            NUM_CLASSES,
            logits.dims()
        )));
    }
    let logits = logits.to_dtype(DType::F32)?;
    let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
    Ok(probs.squeeze(0)?.to_vec1::<f32>()?)
}

/// Index and probability of the most likely class.
///
/// Ties go to the lowest index. Non-finite probabilities are an engine fault.
pub fn select_class(probs: &[f32]) -> Result<(usize, f32)> {
    if let Some(bad) = probs.iter().find(|p| !p.is_finite()) {
        return Err(SentimentError::Inference(format!(
            "non-finite class probability {}",
            bad
        )));
    }

    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in probs.iter().enumerate() {
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((index, p)),
        }
    }
    best.ok_or_else(|| SentimentError::Inference("classifier produced no classes".to_string()))
}

/// Round a probability to [`CONFIDENCE_DECIMALS`] places.
pub fn round_confidence(probability: f32) -> f64 {
    let scale = 10f64.powi(CONFIDENCE_DECIMALS);
    (f64::from(probability) * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::lexicon_model;
    use candle_core::Device;

    fn engine(max_length: usize) -> InferenceEngine {
        InferenceEngine::new(Arc::new(lexicon_model(max_length)))
    }

    fn decimals(value: f64) -> usize {
        let text = value.to_string();
        text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
    }

    #[test]
    fn test_softmax_over_two_classes() {
        let logits = Tensor::new(&[[0f32, 0f32]], &Device::Cpu).unwrap();
        let probs = class_probabilities(&logits).unwrap();
        assert_eq!(probs, vec![0.5, 0.5]);

        let logits = Tensor::new(&[[1f32, 3f32]], &Device::Cpu).unwrap();
        let probs = class_probabilities(&logits).unwrap();
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_rejects_wrong_logits_shape() {
        let logits = Tensor::new(&[[0f32, 1f32, 2f32]], &Device::Cpu).unwrap();
        let err = class_probabilities(&logits).unwrap_err();
        assert!(matches!(err, SentimentError::Inference(_)));
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        assert_eq!(select_class(&[0.5, 0.5]).unwrap(), (0, 0.5));
        assert_eq!(select_class(&[0.25, 0.75]).unwrap(), (1, 0.75));
        assert_eq!(select_class(&[0.75, 0.25]).unwrap(), (0, 0.75));
    }

    #[test]
    fn test_non_finite_probabilities_are_inference_errors() {
        assert!(matches!(
            select_class(&[f32::NAN, 0.5]),
            Err(SentimentError::Inference(_))
        ));
        assert!(matches!(select_class(&[]), Err(SentimentError::Inference(_))));
    }

    #[test]
    fn test_round_confidence() {
        assert_eq!(round_confidence(0.987_654_3), 0.9877);
        assert_eq!(round_confidence(0.5), 0.5);
        assert_eq!(round_confidence(1.0), 1.0);
        assert_eq!(round_confidence(0.000_04), 0.0);
    }

    #[test]
    fn test_positive_review() {
        let result = engine(32).predict("I really loved this movie!").unwrap();
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn test_negative_review() {
        let result = engine(32).predict("This movie was terrible and boring.").unwrap();
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn test_empty_input_is_well_formed() {
        let result = engine(32).predict("").unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_over_length_input_is_truncated_silently() {
        // [CLS] loved loved loved terrible [SEP] survives; the rest is dropped
        let text = format!("loved loved loved {}", "terrible ".repeat(200));
        let result = engine(6).predict(&text).unwrap();
        assert_eq!(result.sentiment, Sentiment::Positive);

        let untruncated = engine(512).predict(&text).unwrap();
        assert_eq!(untruncated.sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_predictions_are_deterministic() {
        let engine = engine(32);
        let text = "loved it but the ending was boring";
        let first = engine.predict(text).unwrap();
        for _ in 0..5 {
            let again = engine.predict(text).unwrap();
            assert_eq!(again.sentiment, first.sentiment);
            assert_eq!(again.confidence.to_bits(), first.confidence.to_bits());
        }
    }

    #[test]
    fn test_confidence_bounds_and_precision() {
        let engine = engine(32);
        for text in [
            "",
            "loved",
            "terrible boring awful",
            "great great great great great great great",
            "unknown words only here",
            "loved terrible",
        ] {
            let result = engine.predict(text).unwrap();
            assert!(
                (0.0..=1.0).contains(&result.confidence),
                "{} out of range for {:?}",
                result.confidence,
                text
            );
            assert!(decimals(result.confidence) <= 4, "{} for {:?}", result.confidence, text);
        }
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        let engine = engine(32);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.predict("I really loved this movie!").unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}
