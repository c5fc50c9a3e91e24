//! Text embeddings and the similarity index they are stored in.
//!
//! An [`Embedder`] turns text into fixed-length vectors; a [`VectorIndex`] stores one vector
//! per indexed document and answers top-K similarity queries. Both are external services in
//! production. The [`EmbeddingClient`] wraps the pair, applying the per-call timeout from an
//! [`OpContext`](crate::context::OpContext) and validating what comes back.
//!
//! Index entries are namespaced by workspace and keyed by document id, so a query hit maps
//! straight back to a metadata record.

pub use self::client::EmbeddingClient;
pub use self::embedder::Embedder;
pub use self::error::EmbeddingError;
pub use self::vector_store::{IndexHit, IndexPayload, IndexRecord, MemoryVectorIndex, VectorIndex};

mod client;
mod embedder;
mod error;
mod vector_store;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cosine similarity in `[-1, 1]`. Zero vectors are similar to nothing.
    pub fn similarity(&self, other: &Embedding) -> Result<f32, EmbeddingError> {
        if self.len() != other.len() {
            return Err(EmbeddingError::DimensionMismatch { expected: self.len(), actual: other.len() });
        }
        let dot: f32 = self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum();
        let norm_a = self.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = other.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }
        Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Embedding(values)
    }
}
