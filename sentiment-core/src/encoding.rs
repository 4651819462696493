//! Tensor preparation for a single tokenized input

use candle_core::{Device, Tensor};
use tokenizers::Encoding;

/// Model inputs for a batch of one
#[derive(Debug, Clone)]
pub struct EncodedInput {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

impl EncodedInput {
    /// Number of tokens after truncation and padding
    pub fn seq_len(&self) -> candle_core::Result<usize> {
        self.input_ids.dim(1)
    }
}

/// Prepare `(1, seq_len)` tensors from an encoding
pub fn prepare_input(encoding: &Encoding, device: &Device) -> candle_core::Result<EncodedInput> {
    Ok(EncodedInput {
        input_ids: row(encoding.get_ids(), device)?,
        token_type_ids: row(encoding.get_type_ids(), device)?,
        attention_mask: row(encoding.get_attention_mask(), device)?,
    })
}

fn row(values: &[u32], device: &Device) -> candle_core::Result<Tensor> {
    Tensor::new(values, device)?.unsqueeze(0) // Add batch dimension
}
