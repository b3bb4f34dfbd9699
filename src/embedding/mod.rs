//! Embedding service abstractions.
//!
//! Embeddings are dense vector representations of node content used for
//! semantic search (§4.2, §4.4). The distance metric used throughout this
//! crate's vector index ([`crate::vector::HnswIndex`]) is cosine distance,
//! so every embedding this module produces is L2-normalized before it
//! reaches storage.
//!
//! # Providers
//!
//! - [`ExternalEmbedding`] - caller supplies pre-computed vectors (OpenAI,
//!   Cohere, a local model run out of process).
//! - `OnnxEmbedding` - a built-in ONNX model, behind the `builtin-embeddings`
//!   feature.

#[cfg(feature = "builtin-embeddings")]
pub mod onnx;

use crate::config::Config;
use crate::error::{Result, ServiceUnavailableError, ValidationError};
use crate::types::{Embedding, MAX_EMBEDDING_DIMENSION};

/// Embedding service trait for generating vector representations of text.
///
/// Implementations must be thread-safe (`Send + Sync`) to allow concurrent
/// embedding requests from multiple robots.
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for multiple texts in one call. Implementations
    /// should batch the underlying provider call where the provider
    /// supports it; the default here simply loops.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// The configured output dimension `D` for this service (§4.4).
    fn dimension(&self) -> u16;

    /// Validates that an embedding has the configured dimension.
    fn validate_embedding(&self, embedding: &Embedding) -> Result<()> {
        let expected = self.dimension() as usize;
        let actual = embedding.len();
        if actual != expected {
            return Err(ValidationError::dimension_mismatch(expected, actual).into());
        }
        Ok(())
    }
}

impl EmbeddingService for Box<dyn EmbeddingService> {
    fn embed(&self, text: &str) -> Result<Embedding> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> u16 {
        (**self).dimension()
    }

    fn validate_embedding(&self, embedding: &Embedding) -> Result<()> {
        (**self).validate_embedding(embedding)
    }
}

/// External embedding provider: validates shape but cannot generate vectors.
///
/// Used when embeddings are computed outside this process and supplied by
/// the caller at `Remember` time. `embed`/`embed_batch` always fail.
#[derive(Clone, Debug)]
pub struct ExternalEmbedding {
    dimension: u16,
}

impl ExternalEmbedding {
    /// Creates a new external embedding provider with the given dimension.
    pub fn new(dimension: u16) -> Self {
        Self { dimension }
    }
}

impl EmbeddingService for ExternalEmbedding {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(ServiceUnavailableError::Embedding(
            "external embedding mode: embeddings must be provided by the caller".to_string(),
        )
        .into())
    }

    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>> {
        Err(ServiceUnavailableError::Embedding(
            "external embedding mode: embeddings must be provided by the caller".to_string(),
        )
        .into())
    }

    fn dimension(&self) -> u16 {
        self.dimension
    }
}

/// Wraps an inner [`EmbeddingService`] to enforce the §4.4 output contract
/// regardless of provider: right-pad a short vector with zeros, reject an
/// oversize one, and L2-normalize the result (the vector index's distance
/// metric is cosine, so normalization is unconditional here).
struct NormalizingEmbedding<T> {
    inner: T,
    configured_dim: usize,
}

impl<T: EmbeddingService> EmbeddingService for NormalizingEmbedding<T> {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let raw = self.inner.embed(text)?;
        finalize_embedding(raw, self.configured_dim)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let raw = self.inner.embed_batch(texts)?;
        raw.into_iter()
            .map(|v| finalize_embedding(v, self.configured_dim))
            .collect()
    }

    fn dimension(&self) -> u16 {
        self.configured_dim as u16
    }
}

/// Applies the §4.4 padding and normalization contract to a raw provider
/// output.
///
/// Right-pads with zeros if `raw.len() < configured_dim`, recording the
/// narrower `embedding_dimension` is the caller's responsibility (the node
/// layer does this via [`crate::node::validate_embedding_dimension`]).
/// Fails `Validation` if the provider returned more than `configured_dim`
/// or more than [`MAX_EMBEDDING_DIMENSION`] values.
pub fn finalize_embedding(mut raw: Embedding, configured_dim: usize) -> Result<Embedding> {
    if raw.len() > configured_dim || raw.len() > MAX_EMBEDDING_DIMENSION {
        return Err(ValidationError::dimension_mismatch(configured_dim, raw.len()).into());
    }
    if raw.len() < configured_dim {
        raw.resize(configured_dim, 0.0);
    }
    l2_normalize(&mut raw);
    Ok(raw)
}

/// Normalizes a vector to unit L2 norm in place. A zero vector is left
/// unchanged (there is no direction to normalize to).
fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Creates an embedding service based on the configuration, wrapped so
/// every output satisfies the §4.4 contract.
pub fn create_embedding_service(config: &Config) -> Result<Box<dyn EmbeddingService>> {
    use crate::config::EmbeddingProvider;

    let configured_dim = config.embedding_dimension.size();

    let inner: Box<dyn EmbeddingService> = match &config.embedding_provider {
        EmbeddingProvider::External => Box::new(ExternalEmbedding::new(configured_dim as u16)),

        #[cfg(feature = "builtin-embeddings")]
        EmbeddingProvider::Builtin { model_path } => {
            Box::new(onnx::OnnxEmbedding::load(model_path.as_deref(), configured_dim as u16)?)
        }

        #[cfg(not(feature = "builtin-embeddings"))]
        EmbeddingProvider::Builtin { .. } => {
            return Err(ServiceUnavailableError::Embedding(
                "builtin embeddings require the 'builtin-embeddings' feature".to_string(),
            )
            .into());
        }
    };

    Ok(Box::new(NormalizingEmbedding { inner, configured_dim }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_embedding_reports_dimension() {
        let service = ExternalEmbedding::new(384);
        assert_eq!(service.dimension(), 384);
    }

    #[test]
    fn external_embedding_embed_fails() {
        let service = ExternalEmbedding::new(384);
        assert!(service.embed("hello world").is_err());
    }

    #[test]
    fn external_embedding_embed_batch_fails() {
        let service = ExternalEmbedding::new(384);
        assert!(service.embed_batch(&["hello", "world"]).is_err());
    }

    #[test]
    fn validate_embedding_accepts_matching_dimension() {
        let service = ExternalEmbedding::new(3);
        assert!(service.validate_embedding(&vec![1.0, 2.0, 3.0]).is_ok());
    }

    #[test]
    fn validate_embedding_rejects_mismatch() {
        let service = ExternalEmbedding::new(3);
        assert!(service.validate_embedding(&vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn external_embedding_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExternalEmbedding>();
    }

    #[test]
    fn create_embedding_service_external_reports_configured_dimension() {
        let config = Config::default();
        let service = create_embedding_service(&config).unwrap();
        assert_eq!(service.dimension(), config.embedding_dimension.size() as u16);
    }

    #[test]
    fn finalize_embedding_pads_short_vectors_with_zeros() {
        let padded = finalize_embedding(vec![1.0, 0.0], 4).unwrap();
        assert_eq!(padded.len(), 4);
        assert_eq!(&padded[2..], &[0.0, 0.0]);
    }

    #[test]
    fn finalize_embedding_rejects_oversize_vectors() {
        let err = finalize_embedding(vec![1.0; 8], 4).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn finalize_embedding_l2_normalizes() {
        let normalized = finalize_embedding(vec![3.0, 4.0], 2).unwrap();
        let norm = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn finalize_embedding_leaves_zero_vector_unchanged() {
        let zero = finalize_embedding(vec![0.0, 0.0], 2).unwrap();
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
