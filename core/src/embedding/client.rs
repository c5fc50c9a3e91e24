use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use crate::context::OpContext;

use super::{Embedder, Embedding, EmbeddingError, IndexHit, IndexPayload, VectorIndex};

/// An embedder and a vector index used together, with every call bounded by the
/// [`OpContext`] timeout.
#[derive(Clone)]
pub struct EmbeddingClient {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl EmbeddingClient {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        EmbeddingClient { embedder, index }
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Embeds one piece of text.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for blank text, `EmptyResponse` if the service returns no vector and
    /// `DimensionMismatch` if the vector does not have the advertised length.
    #[instrument(skip(self, ctx, text), fields(model = self.embedder.model_name(), len = text.len()))]
    pub async fn embed(&self, ctx: &OpContext, text: &str) -> Result<Embedding, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text to embed is empty".to_string()));
        }
        let embedding = ctx
            .call("embedder.embed", self.embedder.embed(&[text]))
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResponse)?;
        if let Some(expected) = self.embedder.dimensions() {
            if embedding.len() != expected {
                return Err(EmbeddingError::DimensionMismatch { expected, actual: embedding.len() });
            }
        }
        Ok(embedding)
    }

    pub async fn upsert(
        &self,
        ctx: &OpContext,
        namespace: Uuid,
        id: Uuid,
        vector: &Embedding,
        payload: &IndexPayload,
    ) -> Result<(), EmbeddingError> {
        ctx.call("index.upsert", self.index.upsert(namespace, id, vector, payload)).await
    }

    pub async fn query(
        &self,
        ctx: &OpContext,
        namespace: Uuid,
        vector: &Embedding,
        top_k: usize,
    ) -> Result<Vec<IndexHit>, EmbeddingError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let hits = ctx.call("index.query", self.index.query(namespace, vector, top_k)).await?;
        debug!("Index returned {} hit(s) for top_k={}", hits.len(), top_k);
        Ok(hits)
    }

    pub async fn delete(&self, ctx: &OpContext, namespace: Uuid, id: Uuid) -> Result<(), EmbeddingError> {
        ctx.call("index.delete", self.index.delete(namespace, id)).await
    }
}
