use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use casebase_core::path::KbPath;
use casebase_core::storage::{
    CategoryRecord, Entry, MemoryMetadataStore, MetadataError, MetadataSnapshot, MetadataStore,
    WorkspaceRecord,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{PersistError, read_json, write_json};

/// Metadata store persisted as a single JSON snapshot.
///
/// Reads are served from memory. A write is applied in memory and then flushed; if the flush
/// fails the caller gets `Unavailable` although the change is visible in this process, which
/// is the same "may have landed" outcome a remote store reports on a timeout.
pub struct JsonMetadataStore {
    inner: MemoryMetadataStore,
    file: PathBuf,
    writes: Mutex<()>,
}

impl JsonMetadataStore {
    /// Loads the snapshot at `file`, starting empty if it does not exist yet.
    #[instrument(skip_all, fields(file = %file.as_ref().display()))]
    pub async fn open(file: impl AsRef<Path>) -> Result<Self, PersistError> {
        let file = file.as_ref().to_path_buf();
        let snapshot: MetadataSnapshot = read_json(&file).await?.unwrap_or_default();
        debug!(
            "Loaded {} workspace(s) and {} entries",
            snapshot.workspaces.len(),
            snapshot.entries.len()
        );
        Ok(JsonMetadataStore { inner: MemoryMetadataStore::from_snapshot(snapshot), file, writes: Mutex::new(()) })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Applies `op` and flushes the result. Writes are serialized so snapshots land in order.
    async fn write<F>(&self, op: F) -> Result<(), MetadataError>
    where
        F: Future<Output = Result<(), MetadataError>>,
    {
        let _guard = self.writes.lock().await;
        op.await?;
        let snapshot = self.inner.snapshot().await;
        write_json(&self.file, &snapshot).await.map_err(|e| {
            warn!("Could not flush metadata: {}", e);
            MetadataError::Unavailable(e.to_string())
        })
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn get_by_path(&self, workspace: Uuid, path: &KbPath) -> Result<Entry, MetadataError> {
        self.inner.get_by_path(workspace, path).await
    }

    async fn get_by_id(&self, workspace: Uuid, id: Uuid) -> Result<Entry, MetadataError> {
        self.inner.get_by_id(workspace, id).await
    }

    async fn list_page(
        &self,
        workspace: Uuid,
        parent: &KbPath,
        recursive: bool,
        after: Option<&KbPath>,
        limit: usize,
    ) -> Result<Vec<Entry>, MetadataError> {
        self.inner.list_page(workspace, parent, recursive, after, limit).await
    }

    async fn create(&self, entry: &Entry) -> Result<(), MetadataError> {
        self.write(self.inner.create(entry)).await
    }

    async fn update(&self, entry: &Entry) -> Result<(), MetadataError> {
        self.write(self.inner.update(entry)).await
    }

    async fn delete(&self, workspace: Uuid, path: &KbPath) -> Result<(), MetadataError> {
        self.write(self.inner.delete(workspace, path)).await
    }

    async fn create_workspace(&self, record: &WorkspaceRecord) -> Result<(), MetadataError> {
        self.write(self.inner.create_workspace(record)).await
    }

    async fn get_workspace(&self, id: Uuid) -> Result<WorkspaceRecord, MetadataError> {
        self.inner.get_workspace(id).await
    }

    async fn workspace_by_name(&self, name: &str) -> Result<WorkspaceRecord, MetadataError> {
        self.inner.workspace_by_name(name).await
    }

    async fn list_workspaces(&self) -> Result<Vec<WorkspaceRecord>, MetadataError> {
        self.inner.list_workspaces().await
    }

    async fn delete_workspace(&self, id: Uuid) -> Result<(), MetadataError> {
        self.write(self.inner.delete_workspace(id)).await
    }

    async fn upsert_category(&self, record: &CategoryRecord) -> Result<(), MetadataError> {
        self.write(self.inner.upsert_category(record)).await
    }

    async fn get_category(&self, workspace: Uuid, id: Uuid) -> Result<CategoryRecord, MetadataError> {
        self.inner.get_category(workspace, id).await
    }

    async fn list_categories(&self, workspace: Uuid) -> Result<Vec<CategoryRecord>, MetadataError> {
        self.inner.list_categories(workspace).await
    }

    async fn delete_category(&self, workspace: Uuid, id: Uuid) -> Result<(), MetadataError> {
        self.write(self.inner.delete_category(workspace, id)).await
    }
}
