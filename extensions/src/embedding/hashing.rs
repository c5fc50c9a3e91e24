use async_trait::async_trait;
use casebase_core::embedding::{Embedder, Embedding, EmbeddingError};
use casebase_core::search::scoring::tokenize;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

pub const DEFAULT_DIMENSIONS: usize = 256;

/// Local embedder using signed feature hashing over word tokens.
///
/// Each distinct lowercased token is hashed with SHA-256 into one of `dimensions` buckets
/// with a sign taken from the digest, and the result is L2-normalized. Texts sharing words
/// land close together, which is enough to run the knowledge base offline. The output
/// depends only on the text and the dimension count, so it is stable across runs.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_name: String,
}

impl HashingEmbedder {
    /// # Errors
    ///
    /// Returns `InvalidInput` if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self, EmbeddingError> {
        if dimensions == 0 {
            return Err(EmbeddingError::InvalidInput("dimensions must be positive".to_string()));
        }
        Ok(HashingEmbedder { dimensions, model_name: format!("feature-hash-{}", dimensions) })
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Embedding(vector)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        HashingEmbedder { dimensions: DEFAULT_DIMENSIONS, model_name: format!("feature-hash-{}", DEFAULT_DIMENSIONS) }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    #[instrument(name = "HashingEmbedder::embed", skip(self, texts), fields(model = %self.model_name, count = texts.len()))]
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        let vectors: Vec<Embedding> = texts.iter().map(|text| self.embed_one(text)).collect();
        debug!("Embedded {} text(s)", vectors.len());
        Ok(vectors)
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
