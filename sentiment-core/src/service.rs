//! Prediction service - the async facade called by the HTTP layer
//!
//! Forward passes are CPU/GPU bound and never run on the async executor.
//! Each call is handed to tokio's blocking pool, at most `max_concurrency`
//! at a time, and awaited with a per-request timeout. Permits are granted in
//! arrival order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::engine::InferenceEngine;
use crate::error::{Result, SentimentError};
use crate::request::{PredictionResult, TextInput};

/// Configuration for the prediction service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum number of inferences running at once
    pub max_concurrency: usize,
    /// Deadline for a request, including time spent waiting for a permit
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct PredictionService {
    engine: Arc<InferenceEngine>,
    permits: Arc<Semaphore>,
    config: ServiceConfig,
}

impl PredictionService {
    pub fn new(engine: InferenceEngine, config: ServiceConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            engine: Arc::new(engine),
            permits,
            config,
        }
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Classify one input on the blocking pool.
    ///
    /// On timeout the caller gets [`SentimentError::Timeout`] right away. The
    /// forward pass itself cannot be interrupted; its worker keeps the permit
    /// until it finishes.
    pub async fn predict(&self, input: TextInput) -> Result<PredictionResult> {
        let timeout = self.config.request_timeout;
        let permits = Arc::clone(&self.permits);
        let engine = Arc::clone(&self.engine);

        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| SentimentError::Worker("inference pool is closed".to_string()))?;

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                engine.predict(&input.text)
            })
            .await
            .map_err(|e| SentimentError::Worker(e.to_string()))?
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Prediction exceeded {:?}", timeout);
                Err(SentimentError::Timeout(timeout))
            }
        }
    }

    /// Permits not currently held by running inferences
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SequenceClassifier;
    use crate::model::Model;
    use crate::request::Sentiment;
    use crate::testing::{lexicon_model, lexicon_tokenizer, LexiconClassifier};
    use candle_core::{Device, Tensor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Lexicon classifier that sleeps during the forward pass and records how
    /// many calls overlap.
    struct SlowClassifier {
        inner: LexiconClassifier,
        delay: Duration,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl SequenceClassifier for SlowClassifier {
        fn forward(
            &self,
            input_ids: &Tensor,
            token_type_ids: &Tensor,
            attention_mask: &Tensor,
        ) -> candle_core::Result<Tensor> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.forward(input_ids, token_type_ids, attention_mask)
        }

        fn num_labels(&self) -> usize {
            self.inner.num_labels()
        }
    }

    fn slow_service(delay: Duration, config: ServiceConfig) -> (PredictionService, Arc<AtomicUsize>) {
        let tokenizer = lexicon_tokenizer();
        let peak = Arc::new(AtomicUsize::new(0));
        let classifier = SlowClassifier {
            inner: LexiconClassifier::new(&tokenizer),
            delay,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::clone(&peak),
        };
        let model = Model::new("slow-lexicon", tokenizer, classifier, Device::Cpu, 32).unwrap();
        let engine = InferenceEngine::new(Arc::new(model));
        (PredictionService::new(engine, config), peak)
    }

    #[tokio::test]
    async fn test_service_delegates_to_engine() {
        let model = Arc::new(lexicon_model(32));
        let engine = InferenceEngine::new(Arc::clone(&model));
        let service = PredictionService::new(engine.clone(), ServiceConfig::default());

        let text = "This movie was terrible and boring.";
        let via_service = service.predict(TextInput::new(text)).await.unwrap();
        let direct = engine.predict(text).unwrap();
        assert_eq!(via_service, direct);
        assert_eq!(via_service.sentiment, Sentiment::Negative);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let config = ServiceConfig {
            max_concurrency: 1,
            request_timeout: Duration::from_millis(20),
        };
        let (service, _) = slow_service(Duration::from_millis(300), config);

        let err = service.predict(TextInput::new("loved")).await.unwrap_err();
        assert!(matches!(err, SentimentError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let config = ServiceConfig {
            max_concurrency: 2,
            request_timeout: Duration::from_secs(10),
        };
        let (service, peak) = slow_service(Duration::from_millis(40), config);
        let service = Arc::new(service);

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.predict(TextInput::new("great movie")).await })
            })
            .collect();
        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result.sentiment, Sentiment::Positive);
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(service.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_serves() {
        let engine = InferenceEngine::new(Arc::new(lexicon_model(32)));
        let config = ServiceConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        let service = PredictionService::new(engine, config);
        assert_eq!(service.available_permits(), 1);
        assert!(service.predict(TextInput::new("")).await.is_ok());
    }
}
