use std::path::{Path, PathBuf};

use async_trait::async_trait;
use casebase_core::embedding::{
    Embedding, EmbeddingError, IndexHit, IndexPayload, IndexRecord, MemoryVectorIndex, VectorIndex,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{PersistError, read_json, write_json};

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    records: Vec<IndexRecord>,
}

/// Brute-force vector index persisted as a JSON file.
pub struct JsonVectorIndex {
    inner: MemoryVectorIndex,
    file: PathBuf,
    writes: Mutex<()>,
}

impl JsonVectorIndex {
    #[instrument(skip_all, fields(file = %file.as_ref().display()))]
    pub async fn open(file: impl AsRef<Path>) -> Result<Self, PersistError> {
        let file = file.as_ref().to_path_buf();
        let stored: IndexFile = read_json(&file).await?.unwrap_or_default();
        debug!("Loaded {} index record(s)", stored.records.len());
        Ok(JsonVectorIndex { inner: MemoryVectorIndex::from_records(stored.records), file, writes: Mutex::new(()) })
    }

    pub async fn len(&self, namespace: Uuid) -> usize {
        self.inner.len(namespace).await
    }

    async fn flush(&self) -> Result<(), EmbeddingError> {
        let stored = IndexFile { records: self.inner.records().await };
        write_json(&self.file, &stored).await.map_err(|e| {
            warn!("Could not flush vector index: {}", e);
            EmbeddingError::Unavailable(e.to_string())
        })
    }
}

#[async_trait]
impl VectorIndex for JsonVectorIndex {
    async fn upsert(
        &self,
        namespace: Uuid,
        id: Uuid,
        vector: &Embedding,
        payload: &IndexPayload,
    ) -> Result<(), EmbeddingError> {
        let _guard = self.writes.lock().await;
        self.inner.upsert(namespace, id, vector, payload).await?;
        self.flush().await
    }

    async fn query(&self, namespace: Uuid, vector: &Embedding, top_k: usize) -> Result<Vec<IndexHit>, EmbeddingError> {
        self.inner.query(namespace, vector, top_k).await
    }

    async fn delete(&self, namespace: Uuid, id: Uuid) -> Result<(), EmbeddingError> {
        let _guard = self.writes.lock().await;
        self.inner.delete(namespace, id).await?;
        self.flush().await
    }
}
