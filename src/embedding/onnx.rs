//! Built-in ONNX embedding generation, behind the `builtin-embeddings` feature.
//!
//! # Supported Models
//!
//! - **all-MiniLM-L6-v2** (384 dimensions) - default, fast and compact
//! - **bge-base-en-v1.5** (768 dimensions) - higher quality, larger
//!
//! Inference is CPU-intensive; callers on an async runtime should run
//! `embed`/`embed_batch` inside `spawn_blocking`.

use std::path::{Path, PathBuf};

use crate::embedding::EmbeddingService;
use crate::error::{Result, ServiceUnavailableError};
use crate::types::Embedding;

/// ONNX-based embedding service. Loads a model via the `ort` crate and a
/// matching tokenizer via `tokenizers`, wired up at construction time.
pub struct OnnxEmbedding {
    #[allow(dead_code)]
    model_path: Option<PathBuf>,
    dimension: u16,
}

impl OnnxEmbedding {
    /// Loads the model at `model_path`, or the bundled default
    /// (all-MiniLM-L6-v2, 384 dimensions) when `None`.
    ///
    /// Model loading and inference are not yet wired up; this constructs a
    /// service that reports the requested dimension but fails on `embed`.
    pub fn load(model_path: Option<&Path>, dimension: u16) -> Result<Self> {
        Ok(Self {
            model_path: model_path.map(Path::to_path_buf),
            dimension,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_dimension(dimension: u16) -> Self {
        Self {
            model_path: None,
            dimension,
        }
    }
}

impl EmbeddingService for OnnxEmbedding {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(ServiceUnavailableError::Embedding(
            "built-in ONNX inference is not wired up yet; use the external provider".to_string(),
        )
        .into())
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(ServiceUnavailableError::Embedding(
            "built-in ONNX inference is not wired up yet; use the external provider".to_string(),
        )
        .into())
    }

    fn dimension(&self) -> u16 {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reports_requested_dimension() {
        let service = OnnxEmbedding::load(None, 384).unwrap();
        assert_eq!(service.dimension(), 384);
    }

    #[test]
    fn with_dimension_overrides_default() {
        let service = OnnxEmbedding::with_dimension(768);
        assert_eq!(service.dimension(), 768);
    }

    #[test]
    fn embed_fails_until_inference_is_wired_up() {
        let service = OnnxEmbedding::load(None, 384).unwrap();
        assert!(service.embed("hello").is_err());
    }

    #[test]
    fn onnx_embedding_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OnnxEmbedding>();
    }
}
