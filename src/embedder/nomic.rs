/// nomic-embed-text-v1.5 embedder on llama.cpp.
///
/// Wraps a [`LlamaEmbedder`](crate::llama::LlamaEmbedder) in a mutex so it can
/// be shared behind `Arc<dyn Embedder>`. Builds without the `llama` feature get
/// a stub whose constructors fail with [`EmbedderError::NotSupported`].
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{Embedder, EmbedderError, download};
use crate::config::Config;

/// Identifies the embedding model in stored vectors.
pub const MODEL_NAME: &str = "nomic-v1.5";

/// Output dimensionality of nomic-embed-text-v1.5.
pub const EMBED_DIM: usize = 768;

/// Whether this build can produce nomic embeddings.
#[must_use]
pub fn supported() -> bool {
    cfg!(feature = "llama")
}

pub struct NomicEmbedder {
    #[cfg(feature = "llama")]
    handle: std::sync::Mutex<crate::llama::LlamaEmbedder>,
    dimensions: usize,
}

impl NomicEmbedder {
    /// Load the GGUF model at `model_path` with `threads` inference threads.
    #[cfg(feature = "llama")]
    pub fn load(model_path: &Path, threads: u32) -> Result<Self, EmbedderError> {
        let handle = crate::llama::LlamaEmbedder::load(model_path, threads)?;
        let dimensions = handle.dimension();
        Ok(Self {
            handle: std::sync::Mutex::new(handle),
            dimensions,
        })
    }

    #[cfg(not(feature = "llama"))]
    pub fn load(_model_path: &Path, _threads: u32) -> Result<Self, EmbedderError> {
        Err(EmbedderError::NotSupported)
    }

    /// Resolve, download if needed, and load the model described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        if !supported() {
            return Err(EmbedderError::NotSupported.into());
        }

        let model_path = config.resolve_model_path();
        if !download::model_present(&model_path) {
            anyhow::ensure!(
                config.auto_download,
                "model not found at {} and auto_download is disabled",
                model_path.display()
            );
            download::download_model(&model_path)?;
        }

        let threads = u32::try_from(config.threads).context("thread count out of range")?;
        let embedder = Self::load(&model_path, threads)
            .with_context(|| format!("failed to load {}", model_path.display()))?;

        if embedder.dimensions != config.model.dimensions {
            warn!(
                "Model {} produces {}-dim vectors, config expects {}",
                config.model.name, embedder.dimensions, config.model.dimensions
            );
        }
        info!("{} embedder ready", config.model.name);
        Ok(embedder)
    }

    #[cfg(feature = "llama")]
    fn embed_into(&self, text: &str, out: &mut [f32]) -> Result<(), EmbedderError> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        handle.embed(text, out)
    }

    #[cfg(not(feature = "llama"))]
    fn embed_into(&self, _text: &str, _out: &mut [f32]) -> Result<(), EmbedderError> {
        Err(EmbedderError::NotSupported)
    }
}

impl Embedder for NomicEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut out = vec![0.0; self.dimensions];
        self.embed_into(text, &mut out)?;
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_matches_feature() {
        assert_eq!(supported(), cfg!(feature = "llama"));
    }

    #[test]
    fn test_from_config_missing_model_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.model_dir = dir.path().to_string_lossy().into_owned();
        config.auto_download = false;

        let err = NomicEmbedder::from_config(&config).err().unwrap();
        if supported() {
            assert!(err.to_string().contains("auto_download is disabled"), "{err}");
        } else {
            assert!(err.downcast_ref::<EmbedderError>().is_some());
        }
    }

    #[cfg(not(feature = "llama"))]
    #[test]
    fn test_load_not_supported() {
        assert!(matches!(
            NomicEmbedder::load(Path::new("model.gguf"), 4),
            Err(EmbedderError::NotSupported)
        ));
    }
}
