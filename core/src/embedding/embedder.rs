use async_trait::async_trait;

use super::{Embedding, EmbeddingError};

/// Trait for asynchronous text embedding generation.
///
/// An implementor represents one configured model. For a fixed model version, embedding the
/// same text twice must yield the same vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generates one embedding per input text, in input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Number of dimensions of every vector this embedder produces, if fixed.
    fn dimensions(&self) -> Option<usize>;

    /// Identifier of the configured model (e.g. "feature-hash-256").
    fn model_name(&self) -> &str;

    /// Returns a hint for the maximum recommended number of texts in a single call to
    /// [`Embedder::embed`].
    fn max_batch_size_hint(&self) -> Option<usize> {
        None
    }
}
