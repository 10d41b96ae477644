//! pdfdex-embed
//!
//! Embedding providers behind [`pdfdex_core::traits::Embedder`]: a BGE-M3
//! model run through candle, and a deterministic feature-hashing embedder for
//! tests and model-less deployments.

pub mod encode;
pub mod pool;

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{Device, Tensor, DType};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{XLMRobertaModel, Config as XLMRobertaConfig};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use pdfdex_core::config::{EmbeddingProvider, EmbeddingSettings};
use pdfdex_core::traits::Embedder;

pub use pool::masked_mean_l2;

/// BGE-M3 sentence embeddings: XLM-RoBERTa hidden states, masked mean, L2 norm.
pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device, dim: usize, max_len: usize, id: String }

impl EmbeddingModel {
    pub fn new(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = encode::select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))?;
        let dim = usize::try_from(dim)?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, max_len, "BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, id: format!("bge-m3:d{dim}:t{max_len}") })
    }

    /// Embeds `texts` in one forward pass; rows follow input order.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let batch = encode::encode_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let hidden_states = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden_states, &batch.attention_mask)?;
        let rows = pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?;
        if let Some(row) = rows.iter().find(|r| r.len() != self.dim) { return Err(anyhow!("model produced {} values, expected {}", row.len(), self.dim)); }
        let ms = start.elapsed().as_millis();
        if ms > 100 * texts.len() as u128 { warn!(ms = ms as u64, texts = texts.len(), "slow embedding batch"); }
        Ok(rows)
    }
}

impl Embedder for EmbeddingModel {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { self.embed_texts(texts) }
}

/// Feature-hashing bag-of-words embedder.
///
/// Lowercased alphanumeric tokens are hashed with XxHash64 into `dim` buckets;
/// the result is L2-normalized. Texts sharing no tokens are (barring bucket
/// collisions) orthogonal. Text without tokens maps to the zero vector.
pub struct HashEmbedder { dim: usize, id: String }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("hash:xxh64:d{dim}") } }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            let val = 0.5 + f64::from((h >> 32) as u32) / f64::from(u32::MAX) / 2.0;
            v[idx] += val as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 { for x in &mut v { *x /= norm; } }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| self.embed_text(t)).collect()) }
}

/// Builds the provider named in the settings.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider {
        EmbeddingProvider::Hash => {
            info!(dim = settings.dim, "using hash embedder");
            Ok(Arc::new(HashEmbedder::new(settings.dim)))
        }
        EmbeddingProvider::BgeM3 => {
            let dir = resolve_model_dir(settings.model_dir.as_deref())?;
            Ok(Arc::new(EmbeddingModel::new(&dir, settings.max_len)?))
        }
    }
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PDFDEX_MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { info!(dir = %p.display(), "using PDFDEX_MODEL_DIR"); return Ok(p); } }
    if let Some(dir) = configured { let p = pdfdex_core::config::expand_path(dir); if p.exists() { return Ok(p); } warn!(dir = %p.display(), "configured model dir does not exist"); }
    let root = Path::new("../models/bge-m3"); if root.exists() { return Ok(root.to_path_buf()); }
    let local = Path::new("models/bge-m3"); if local.exists() { return Ok(local.to_path_buf()); }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_ignores_case_and_punctuation() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed_text("Lighthouse, keepers!"), e.embed_text("lighthouse keepers"));
    }

    #[test]
    fn hash_embedder_zero_vector_for_empty_text() {
        let e = HashEmbedder::new(16);
        assert!(e.embed_text(" ?! ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn settings_select_hash_provider() {
        let settings = EmbeddingSettings { dim: 32, ..EmbeddingSettings::default() };
        let embedder = embedder_from_settings(&settings).expect("embedder");
        assert_eq!(embedder.dim(), 32);
        assert_eq!(embedder.embedder_id(), "hash:xxh64:d32");
    }
}
