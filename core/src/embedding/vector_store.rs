use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::path::KbPath;

use super::{Embedding, EmbeddingError};

/// Small metadata copy stored next to each vector. It reflects the document at indexing time
/// and is never used as the source of truth for search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPayload {
    pub path: KbPath,
    pub content_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One query result: a document id and its raw similarity score (higher is more similar).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: Uuid,
    pub score: f32,
}

/// Contract over the external similarity index. Entries are grouped in per-workspace
/// namespaces.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces the entry `id` in `namespace`.
    async fn upsert(
        &self,
        namespace: Uuid,
        id: Uuid,
        vector: &Embedding,
        payload: &IndexPayload,
    ) -> Result<(), EmbeddingError>;

    /// Returns up to `top_k` entries of `namespace` ordered by decreasing score.
    async fn query(&self, namespace: Uuid, vector: &Embedding, top_k: usize) -> Result<Vec<IndexHit>, EmbeddingError>;

    /// Removes an entry. Removing a missing entry succeeds.
    async fn delete(&self, namespace: Uuid, id: Uuid) -> Result<(), EmbeddingError>;
}

/// Serializable form of one index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub namespace: Uuid,
    pub id: Uuid,
    pub vector: Embedding,
    pub payload: IndexPayload,
}

/// In-memory vector index using brute-force cosine similarity.
///
/// Equal scores are ordered by id so that identical index state always answers a query the
/// same way.
#[derive(Default)]
pub struct MemoryVectorIndex {
    namespaces: RwLock<HashMap<Uuid, BTreeMap<Uuid, (Embedding, IndexPayload)>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<IndexRecord>) -> Self {
        let mut namespaces: HashMap<Uuid, BTreeMap<Uuid, (Embedding, IndexPayload)>> = HashMap::new();
        for record in records {
            namespaces
                .entry(record.namespace)
                .or_default()
                .insert(record.id, (record.vector, record.payload));
        }
        MemoryVectorIndex { namespaces: RwLock::new(namespaces) }
    }

    /// All entries, ordered by namespace then id.
    pub async fn records(&self) -> Vec<IndexRecord> {
        let namespaces = self.namespaces.read().await;
        let mut records: Vec<IndexRecord> = namespaces
            .iter()
            .flat_map(|(namespace, entries)| {
                entries.iter().map(|(id, (vector, payload))| IndexRecord {
                    namespace: *namespace,
                    id: *id,
                    vector: vector.clone(),
                    payload: payload.clone(),
                })
            })
            .collect();
        records.sort_by(|a, b| a.namespace.cmp(&b.namespace).then(a.id.cmp(&b.id)));
        records
    }

    pub async fn payload(&self, namespace: Uuid, id: Uuid) -> Option<IndexPayload> {
        let namespaces = self.namespaces.read().await;
        namespaces.get(&namespace)?.get(&id).map(|(_, payload)| payload.clone())
    }

    pub async fn len(&self, namespace: Uuid) -> usize {
        self.namespaces.read().await.get(&namespace).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(
        &self,
        namespace: Uuid,
        id: Uuid,
        vector: &Embedding,
        payload: &IndexPayload,
    ) -> Result<(), EmbeddingError> {
        if vector.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty vector".to_string()));
        }
        let mut namespaces = self.namespaces.write().await;
        let entries = namespaces.entry(namespace).or_default();
        if let Some((existing, _)) = entries.values().next() {
            if existing.len() != vector.len() {
                return Err(EmbeddingError::DimensionMismatch { expected: existing.len(), actual: vector.len() });
            }
        }
        entries.insert(id, (vector.clone(), payload.clone()));
        debug!("Upserted index entry {} in namespace {}", id, namespace);
        Ok(())
    }

    async fn query(&self, namespace: Uuid, vector: &Embedding, top_k: usize) -> Result<Vec<IndexHit>, EmbeddingError> {
        let namespaces = self.namespaces.read().await;
        let Some(entries) = namespaces.get(&namespace) else {
            return Ok(Vec::new());
        };
        let mut hits = Vec::with_capacity(entries.len());
        for (id, (stored, _)) in entries {
            hits.push(IndexHit { id: *id, score: vector.similarity(stored)? });
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, namespace: Uuid, id: Uuid) -> Result<(), EmbeddingError> {
        if let Some(entries) = self.namespaces.write().await.get_mut(&namespace) {
            entries.remove(&id);
        }
        Ok(())
    }
}
