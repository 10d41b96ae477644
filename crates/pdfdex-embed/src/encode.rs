//! Device choice and batched tokenization for the BGE-M3 encoder.
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use tokenizers::Tokenizer;
use tracing::info;

/// XLM-RoBERTa pad token id.
const PAD_ID: u32 = 1;

/// Metal when built with the `metal` feature and a GPU is present, else CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => {
                info!("embedding device: metal");
                return dev;
            }
            Err(e) => tracing::debug!(error = %e, "metal unavailable"),
        }
    }
    info!("embedding device: cpu");
    Device::Cpu
}

/// Model inputs for one batch, all shaped `[batch, width]`.
pub struct EncodedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Tokenizes `texts`, truncating each to `max_len` tokens and right-padding
/// to the longest sequence in the batch.
pub fn encode_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<EncodedBatch> {
    let encodings = tokenizer.encode_batch(texts.to_vec(), true).map_err(|e| anyhow!("tokenization failed: {e}"))?;
    let width = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(texts.len() * width);
    let mut mask = Vec::with_capacity(texts.len() * width);
    for enc in &encodings {
        let n = enc.get_ids().len().min(width);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        ids.resize(ids.len() + width - n, PAD_ID);
        mask.resize(mask.len() + width - n, 0);
    }
    let shape = (encodings.len(), width);
    Ok(EncodedBatch {
        input_ids: Tensor::from_vec(ids, shape, device)?,
        attention_mask: Tensor::from_vec(mask, shape, device)?,
        token_type_ids: Tensor::zeros(shape, DType::I64, device)?,
    })
}
