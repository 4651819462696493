//! Sequence classifiers
//!
//! A classifier maps a tokenized batch to per-class logits. The BERT
//! implementation mirrors the standard sequence-classification head: the
//! encoder output for the first token goes through a tanh pooler and a
//! linear layer with one output per class.

use candle_core::{IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};

/// Forward-only classifier over a token batch.
///
/// Implementations hold immutable weights and must be safe to call from
/// several threads at once.
pub trait SequenceClassifier: Send + Sync {
    /// Returns logits of shape `(batch, num_labels)`.
    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor>;

    fn num_labels(&self) -> usize;
}

/// BERT encoder with pooler and classification head.
pub struct BertClassifier {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    num_labels: usize,
}

impl BertClassifier {
    /// Load from a weight store laid out as `bert.*` + `classifier.*`.
    pub fn load(
        vb: VarBuilder,
        config: &BertConfig,
        hidden_size: usize,
        num_labels: usize,
    ) -> candle_core::Result<Self> {
        let bert = BertModel::load(vb.pp("bert"), config)?;
        let pooler = candle_nn::linear(hidden_size, hidden_size, vb.pp("bert.pooler.dense"))?;
        let classifier = candle_nn::linear(hidden_size, num_labels, vb.pp("classifier"))?;
        Ok(Self {
            bert,
            pooler,
            classifier,
            num_labels,
        })
    }
}

impl SequenceClassifier for BertClassifier {
    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let hidden = self
            .bert
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        // (batch, seq, hidden) -> (batch, hidden) at the [CLS] position
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        self.classifier.forward(&pooled)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}
