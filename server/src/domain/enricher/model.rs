//! Embedding model abstraction
//!
//! The enricher only needs a capability: encode a batch of strings into
//! fixed-dimension vectors. `MODEL_NAME` resolves against the built-in
//! models; the default is a deterministic hash-to-unit-vector model, so the
//! pipeline runs without any external model runtime.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::constants::{DEFAULT_MODEL_NAME, ENRICHER_SUB_BATCH_SIZE};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),

    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// A batch text encoder producing vectors of a fixed dimension
pub trait EmbeddingModel: Send + Sync {
    /// Encode a batch of texts; one vector per input, all of `dimension()`.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Output vector dimension D
    fn dimension(&self) -> usize;

    /// Preferred encode batch size for memory pacing
    fn batch_size_hint(&self) -> usize {
        ENRICHER_SUB_BATCH_SIZE
    }
}

/// Deterministic SHA-256 expansion to a unit vector.
///
/// Not a semantic embedding; a stable stand-in with the same shape, usable
/// without a model runtime and in tests.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self { dimension: 384 }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for HashEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts
            .iter()
            .map(|text| hash_to_unit_vector(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Expand a text into a deterministic L2-normalized vector by hashing
/// counter blocks.
fn hash_to_unit_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut values: Vec<f32> = Vec::with_capacity(dimension);
    let mut counter: u32 = 0;

    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();

        for chunk in digest.chunks_exact(4) {
            if values.len() == dimension {
                break;
            }
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            // Map to [-1, 1]
            values.push((word as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
        }
        counter += 1;
    }

    let norm = values.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v = ((*v as f64) / norm) as f32;
        }
    }
    values
}

/// Resolve a model name to an implementation. Unknown names fail fast.
pub fn load_model(name: &str) -> Result<Arc<dyn EmbeddingModel>, ModelError> {
    match name {
        DEFAULT_MODEL_NAME => Ok(Arc::new(HashEmbedder::new())),
        other => Err(ModelError::UnknownModel(other.to_string())),
    }
}
