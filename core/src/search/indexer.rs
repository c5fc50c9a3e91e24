use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::context::OpContext;
use crate::embedding::{EmbeddingClient, IndexPayload};
use crate::storage::{self, Coordinator, DocumentRecord, Entry};

use super::SearchError;

pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Text embedded for a document: its file name, its tags and, for `text/*` content, the
/// leading `max_body_bytes` of its body.
pub fn document_text(document: &DocumentRecord, bytes: &[u8], max_body_bytes: usize) -> String {
    let mut text = document.path.name().unwrap_or_default().to_string();
    for tag in &document.tags {
        text.push(' ');
        text.push_str(tag);
    }
    if document.content_type.starts_with("text/") {
        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(max_body_bytes)]);
        text.push('\n');
        text.push_str(&body);
    }
    text
}

/// Keeps the vector index in step with the documents of one workspace.
///
/// A document's index entry is keyed by the document id, and the record's `index_ref` is set
/// once the entry has been written.
pub struct Indexer {
    coordinator: Coordinator,
    client: EmbeddingClient,
    max_body_bytes: usize,
}

impl Indexer {
    pub fn new(coordinator: Coordinator, client: EmbeddingClient) -> Self {
        Indexer { coordinator, client, max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Embeds the document at `path` and writes its index entry.
    #[instrument(skip(self, ctx), fields(workspace = %self.coordinator.workspace_id()))]
    pub async fn index_document(&self, ctx: &OpContext, path: &str) -> Result<DocumentRecord, SearchError> {
        let (document, bytes) = self.coordinator.read_document(ctx, path).await?;
        let text = document_text(&document, &bytes, self.max_body_bytes);
        let vector = self.client.embed(ctx, &text).await?;
        let payload = IndexPayload {
            path: document.path.clone(),
            content_type: document.content_type.clone(),
            tags: document.tags.iter().cloned().collect(),
        };
        self.client
            .upsert(ctx, self.coordinator.workspace_id(), document.id, &vector, &payload)
            .await?;
        let document = self.coordinator.set_index_ref(ctx, document.id, Some(document.id)).await?;
        debug!("Indexed '{}' with {}", document.path, self.client.model_name());
        Ok(document)
    }

    /// Indexes every document of the workspace. Corrupt documents are skipped with a warning.
    /// Returns the number of documents indexed.
    #[instrument(skip(self, ctx), fields(workspace = %self.coordinator.workspace_id()))]
    pub async fn index_all(&self, ctx: &OpContext) -> Result<usize, SearchError> {
        let entries = self.coordinator.list(ctx, "", true).await?;
        let mut indexed = 0;
        for entry in entries {
            let Entry::Document(document) = entry else {
                continue;
            };
            match self.index_document(ctx, &document.path.to_string()).await {
                Ok(_) => indexed += 1,
                Err(SearchError::Storage(storage::Error::Corrupt { path, key })) => {
                    warn!("Skipping corrupt document '{}' (missing blob '{}')", path, key);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(indexed)
    }

    /// Removes the index entry of the document at `path` and clears its reference.
    pub async fn remove_document(&self, ctx: &OpContext, path: &str) -> Result<DocumentRecord, SearchError> {
        let document = self.coordinator.get_document(ctx, path).await?;
        self.forget(ctx, document.id).await?;
        Ok(self.coordinator.set_index_ref(ctx, document.id, None).await?)
    }

    /// Removes an index entry by document id, e.g. for a document that is about to be deleted.
    pub async fn forget(&self, ctx: &OpContext, id: Uuid) -> Result<(), SearchError> {
        self.client.delete(ctx, self.coordinator.workspace_id(), id).await?;
        Ok(())
    }
}
