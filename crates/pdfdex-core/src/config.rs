//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `pdfdex.toml` + `pdfdex.<env>.toml`
//! + `PDFDEX_*` env vars (`__` separates sections, e.g.
//! `PDFDEX_FUSION__DENSE_WEIGHT=0.7`). Provides helpers to expand `~` and
//! `${VAR}`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

pub const ENV_PREFIX: &str = "PDFDEX_";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("PDFDEX_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("pdfdex.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("pdfdex.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("pdfdex.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("pdfdex.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Typed view over every section the indexer and query engine read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub dense: DenseSettings,
    pub fusion: FusionSettings,
    pub store: StoreSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        self.fusion.validate()?;
        if self.store.retain_builds == 0 {
            return Err(Error::InvalidConfig("store.retain_builds must be at least 1".into()));
        }
        if self.store.cache_capacity == 0 {
            return Err(Error::InvalidConfig("store.cache_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub bots_root: String,
    pub vector_root: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            bots_root: "bots_data/pdf_bots".to_string(),
            vector_root: "vector_store".to_string(),
        }
    }
}

impl PathSettings {
    pub fn bots_root(&self) -> PathBuf {
        expand_path(&self.bots_root)
    }

    pub fn vector_root(&self) -> PathBuf {
        expand_path(&self.vector_root)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProvider {
    /// Deterministic feature-hashing embedder; no model files needed.
    #[default]
    Hash,
    /// BGE-M3 (XLM-RoBERTa) loaded from local weights through candle.
    BgeM3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Output dimension of the hash embedder. Model embedders report their own.
    pub dim: usize,
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub batch_size: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            dim: 384,
            model_dir: None,
            max_len: 256,
            batch_size: 32,
            timeout_ms: 30_000,
        }
    }
}

impl EmbeddingSettings {
    fn validate(&self) -> Result<()> {
        if self.dim == 0 || self.max_len == 0 || self.batch_size == 0 {
            return Err(Error::InvalidConfig(
                "embedding.dim, embedding.max_len and embedding.batch_size must be positive".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("embedding.timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseSettings {
    /// Train an IVF-PQ index once a document has at least this many chunks;
    /// smaller documents are searched exhaustively.
    pub ann_min_rows: usize,
}

impl Default for DenseSettings {
    fn default() -> Self {
        Self { ann_min_rows: 4096 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Reciprocal rank fusion: `1 / (rrf_k + rank)` per source.
    #[default]
    Rrf,
    /// Per-source min-max normalization of the raw scores.
    MinMax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub method: FusionMethod,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub rrf_k: usize,
    /// Candidates fetched per source = `k * over_fetch`.
    pub over_fetch: usize,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            method: FusionMethod::Rrf,
            dense_weight: 0.5,
            sparse_weight: 0.5,
            rrf_k: 60,
            over_fetch: 2,
        }
    }
}

impl FusionSettings {
    fn validate(&self) -> Result<()> {
        let weights_ok = self.dense_weight.is_finite()
            && self.sparse_weight.is_finite()
            && self.dense_weight >= 0.0
            && self.sparse_weight >= 0.0
            && self.dense_weight + self.sparse_weight > 0.0;
        if !weights_ok {
            return Err(Error::InvalidConfig(format!(
                "fusion weights must be non-negative and not both zero (dense={}, sparse={})",
                self.dense_weight, self.sparse_weight
            )));
        }
        if self.over_fetch == 0 {
            return Err(Error::InvalidConfig("fusion.over_fetch must be at least 1".into()));
        }
        if self.method == FusionMethod::Rrf && self.rrf_k == 0 {
            return Err(Error::InvalidConfig("fusion.rrf_k must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Published builds kept on disk per bundle, the live one included.
    pub retain_builds: usize,
    /// Loaded bundles the query engine keeps open; least recently used go first.
    pub cache_capacity: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { retain_builds: 2, cache_capacity: 16 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().expect("defaults validate");
        assert_eq!(settings.fusion.method, FusionMethod::Rrf);
        assert_eq!(settings.store.retain_builds, 2);
    }

    #[test]
    fn toml_and_env_layers_override_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "pdfdex.toml",
                r#"
                [chunking]
                target_size = 400
                overlap = 40

                [fusion]
                method = "min_max"
                "#,
            )?;
            jail.set_env("PDFDEX_FUSION__DENSE_WEIGHT", "0.8");
            jail.set_env("PDFDEX_EMBEDDING__PROVIDER", "bge-m3");

            let config = Config::load().map_err(|e| e.to_string())?;
            let settings = config.settings().map_err(|e| e.to_string())?;
            assert_eq!(settings.chunking.target_size, 400);
            assert_eq!(settings.chunking.overlap, 40);
            assert_eq!(settings.fusion.method, FusionMethod::MinMax);
            assert!((settings.fusion.dense_weight - 0.8).abs() < 1e-6);
            assert_eq!(settings.embedding.provider, EmbeddingProvider::BgeM3);
            let weight: f32 = config.get("fusion.sparse_weight").map_err(|e| e.to_string())?;
            assert!((weight - 0.5).abs() < 1e-6);
            Ok(())
        });
    }

    #[test]
    fn load_rejects_overlap_not_smaller_than_target() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("pdfdex.toml", "[chunking]\ntarget_size = 50\noverlap = 50\n")?;
            let err = Config::load().err().expect("invalid chunking must fail");
            assert!(matches!(err, Error::InvalidConfig(_)));
            Ok(())
        });
    }

    #[test]
    fn zero_weights_are_rejected() {
        let mut settings = Settings::default();
        settings.fusion.dense_weight = 0.0;
        settings.fusion.sparse_weight = 0.0;
        assert!(matches!(settings.validate(), Err(Error::InvalidConfig(_))));
    }
}
