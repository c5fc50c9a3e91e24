//! In-process implementations of the metadata and blob stores.
//!
//! Both are complete implementations of their contracts and are used by tests, by the CLI's
//! persisted stores, and anywhere a single process owns the knowledge base.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::path::KbPath;
use crate::storage::{
    BlobError, BlobKey, BlobStore, CategoryRecord, Entry, MetadataError, MetadataStore,
    WorkspaceRecord,
};

/// Serializable image of a [`MemoryMetadataStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(default)]
    pub workspaces: Vec<WorkspaceRecord>,
    #[serde(default)]
    pub categories: Vec<CategoryRecord>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

#[derive(Default)]
struct MetadataState {
    workspaces: BTreeMap<Uuid, WorkspaceRecord>,
    categories: BTreeMap<Uuid, CategoryRecord>,
    entries: HashMap<Uuid, Entry>,
    // Path index; ordering keeps each subtree contiguous.
    by_path: BTreeMap<(Uuid, KbPath), Uuid>,
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    state: RwLock<MetadataState>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MetadataSnapshot) -> Self {
        let mut state = MetadataState::default();
        for workspace in snapshot.workspaces {
            state.workspaces.insert(workspace.id, workspace);
        }
        for category in snapshot.categories {
            state.categories.insert(category.id, category);
        }
        for entry in snapshot.entries {
            state.by_path.insert((entry.workspace_id(), entry.path().clone()), entry.id());
            state.entries.insert(entry.id(), entry);
        }
        MemoryMetadataStore { state: RwLock::new(state) }
    }

    /// Copies the current contents, entries ordered by workspace and path.
    pub async fn snapshot(&self) -> MetadataSnapshot {
        let state = self.state.read().await;
        MetadataSnapshot {
            workspaces: state.workspaces.values().cloned().collect(),
            categories: state.categories.values().cloned().collect(),
            entries: state
                .by_path
                .values()
                .filter_map(|id| state.entries.get(id).cloned())
                .collect(),
        }
    }

    /// Number of folder and document records across all workspaces.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_by_path(&self, workspace: Uuid, path: &KbPath) -> Result<Entry, MetadataError> {
        let state = self.state.read().await;
        state
            .by_path
            .get(&(workspace, path.clone()))
            .and_then(|id| state.entries.get(id))
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("'{}'", path)))
    }

    async fn get_by_id(&self, workspace: Uuid, id: Uuid) -> Result<Entry, MetadataError> {
        let state = self.state.read().await;
        state
            .entries
            .get(&id)
            .filter(|entry| entry.workspace_id() == workspace)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("record {}", id)))
    }

    async fn list_page(
        &self,
        workspace: Uuid,
        parent: &KbPath,
        recursive: bool,
        after: Option<&KbPath>,
        limit: usize,
    ) -> Result<Vec<Entry>, MetadataError> {
        let state = self.state.read().await;
        let start = match after {
            Some(after) if after > parent => after.clone(),
            _ => parent.clone(),
        };
        let page = state
            .by_path
            .range((Bound::Excluded((workspace, start)), Bound::Unbounded))
            .take_while(|((ws, path), _)| *ws == workspace && path.starts_with(parent))
            .filter(|((_, path), _)| recursive || path.depth() == parent.depth() + 1)
            .filter_map(|(_, id)| state.entries.get(id).cloned())
            .take(limit)
            .collect();
        Ok(page)
    }

    async fn create(&self, entry: &Entry) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        let key = (entry.workspace_id(), entry.path().clone());
        if let Some(existing) = state.by_path.get(&key) {
            if *existing == entry.id() {
                return Ok(());
            }
            return Err(MetadataError::Conflict(format!("'{}' already exists", entry.path())));
        }
        if state.entries.contains_key(&entry.id()) {
            return Err(MetadataError::Conflict(format!("record {} exists at another path", entry.id())));
        }
        state.by_path.insert(key, entry.id());
        state.entries.insert(entry.id(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &Entry) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        let Some(current) = state.entries.get(&entry.id()) else {
            return Err(MetadataError::NotFound(format!("record {}", entry.id())));
        };
        let old_key = (current.workspace_id(), current.path().clone());
        let new_key = (entry.workspace_id(), entry.path().clone());
        if let Some(occupant) = state.by_path.get(&new_key) {
            if *occupant != entry.id() {
                return Err(MetadataError::Conflict(format!("'{}' already exists", entry.path())));
            }
        }
        state.by_path.remove(&old_key);
        state.by_path.insert(new_key, entry.id());
        state.entries.insert(entry.id(), entry.clone());
        Ok(())
    }

    async fn delete(&self, workspace: Uuid, path: &KbPath) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        let id = state
            .by_path
            .remove(&(workspace, path.clone()))
            .ok_or_else(|| MetadataError::NotFound(format!("'{}'", path)))?;
        state.entries.remove(&id);
        Ok(())
    }

    async fn create_workspace(&self, record: &WorkspaceRecord) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.workspaces.values().find(|w| w.name == record.name) {
            if existing.id == record.id {
                return Ok(());
            }
            return Err(MetadataError::Conflict(format!("workspace '{}'", record.name)));
        }
        state.workspaces.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_workspace(&self, id: Uuid) -> Result<WorkspaceRecord, MetadataError> {
        let state = self.state.read().await;
        state
            .workspaces
            .get(&id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("workspace {}", id)))
    }

    async fn workspace_by_name(&self, name: &str) -> Result<WorkspaceRecord, MetadataError> {
        let state = self.state.read().await;
        state
            .workspaces
            .values()
            .find(|w| w.name == name)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("workspace '{}'", name)))
    }

    async fn list_workspaces(&self) -> Result<Vec<WorkspaceRecord>, MetadataError> {
        Ok(self.state.read().await.workspaces.values().cloned().collect())
    }

    async fn delete_workspace(&self, id: Uuid) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        state
            .workspaces
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| MetadataError::NotFound(format!("workspace {}", id)))
    }

    async fn upsert_category(&self, record: &CategoryRecord) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        let clash = state.categories.values().any(|c| {
            c.workspace_id == record.workspace_id && c.id != record.id && c.name.eq_ignore_ascii_case(&record.name)
        });
        if clash {
            return Err(MetadataError::Conflict(format!("category '{}'", record.name)));
        }
        state.categories.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_category(&self, workspace: Uuid, id: Uuid) -> Result<CategoryRecord, MetadataError> {
        let state = self.state.read().await;
        state
            .categories
            .get(&id)
            .filter(|c| c.workspace_id == workspace)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("category {}", id)))
    }

    async fn list_categories(&self, workspace: Uuid) -> Result<Vec<CategoryRecord>, MetadataError> {
        let state = self.state.read().await;
        Ok(state
            .categories
            .values()
            .filter(|c| c.workspace_id == workspace)
            .cloned()
            .collect())
    }

    async fn delete_category(&self, workspace: Uuid, id: Uuid) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        match state.categories.get(&id) {
            Some(c) if c.workspace_id == workspace => {
                state.categories.remove(&id);
                Ok(())
            }
            _ => Err(MetadataError::NotFound(format!("category {}", id))),
        }
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<BlobKey, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All keys, sorted.
    pub async fn keys(&self) -> Vec<BlobKey> {
        let mut keys: Vec<_> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<(), BlobError> {
        if key.as_str().is_empty() {
            return Err(BlobError::InvalidKey(key.clone()));
        }
        self.objects.write().await.insert(key.clone(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.clone()))
    }

    async fn delete(&self, key: &BlobKey) -> Result<(), BlobError> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(key.clone()))
    }

    async fn copy(&self, src: &BlobKey, dst: &BlobKey) -> Result<(), BlobError> {
        let mut objects = self.objects.write().await;
        let bytes = objects.get(src).cloned().ok_or_else(|| BlobError::NotFound(src.clone()))?;
        objects.insert(dst.clone(), bytes);
        Ok(())
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, BlobError> {
        Ok(self.objects.read().await.contains_key(key))
    }
}
