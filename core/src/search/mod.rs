//! Hybrid search over the documents of one workspace.
//!
//! A query is embedded, the vector index is asked for more candidates than requested
//! (`top_k * overfetch_factor`), each candidate is re-read from the metadata store, filters
//! are applied as hard exclusions, and the survivors are ranked by a weighted sum of
//! normalized similarity and keyword overlap. See [`scoring`] for the formula.
//!
//! Index entries whose document no longer exists are skipped with a warning; the index is a
//! derived structure and may lag behind the metadata store.

pub use self::filters::SearchFilters;
pub use self::indexer::{Indexer, document_text, DEFAULT_MAX_BODY_BYTES};
pub use self::scoring::{RankingConfig, ScoreNormalization, ScoredDocument};

mod filters;
mod indexer;
pub mod scoring;

use std::collections::HashSet;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::context::OpContext;
use crate::embedding::{EmbeddingClient, EmbeddingError, IndexHit};
use crate::storage::{self, Coordinator, DocumentRecord, Entry};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::InvalidInput(_) => false,
            SearchError::Embedding(e) => e.is_retryable(),
            SearchError::Storage(e) => e.is_retryable(),
        }
    }
}

pub struct SearchEngine {
    coordinator: Coordinator,
    client: EmbeddingClient,
    config: RankingConfig,
}

impl SearchEngine {
    pub fn new(coordinator: Coordinator, client: EmbeddingClient, config: RankingConfig) -> Self {
        SearchEngine { coordinator, client, config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Returns at most `top_k` documents matching `filters`, best first.
    ///
    /// Identical queries against identical state return identical orderings.
    #[instrument(skip(self, ctx, filters), fields(workspace = %self.coordinator.workspace_id()))]
    pub async fn search(
        &self,
        ctx: &OpContext,
        query: &str,
        filters: &SearchFilters,
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidInput("search text is empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.client.embed(ctx, query).await?;
        let fetch = top_k.saturating_mul(self.config.overfetch_factor.max(1));
        let hits = self
            .client
            .query(ctx, self.coordinator.workspace_id(), &vector, fetch)
            .await?;

        let mut seen = HashSet::new();
        let hits: Vec<IndexHit> = hits.into_iter().filter(|hit| seen.insert(hit.id)).collect();

        let resolved = try_join_all(hits.iter().map(|hit| self.resolve(ctx, hit))).await?;
        let total = resolved.len();
        let candidates: Vec<(DocumentRecord, f32)> = resolved
            .into_iter()
            .flatten()
            .filter(|(document, _)| filters.matches(document))
            .collect();
        debug!("{} of {} candidate(s) passed lookup and filters", candidates.len(), total);

        Ok(scoring::rank(candidates, query, &self.config, top_k))
    }

    /// Re-reads the document behind an index hit. Stale hits resolve to `None`.
    async fn resolve(&self, ctx: &OpContext, hit: &IndexHit) -> Result<Option<(DocumentRecord, f32)>, SearchError> {
        match self.coordinator.get_by_id(ctx, hit.id).await {
            Ok(Entry::Document(document)) => Ok(Some((document, hit.score))),
            Ok(Entry::Folder(folder)) => {
                warn!("Index entry {} points at folder '{}', skipping", hit.id, folder.path);
                Ok(None)
            }
            Err(storage::Error::NotFound(_)) => {
                warn!("Index entry {} has no metadata record, skipping", hit.id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
