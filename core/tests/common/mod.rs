#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use casebase_core::context::{FromTimeout, OpContext};
use casebase_core::path::KbPath;
use casebase_core::storage::{
    BlobError, BlobKey, BlobKeying, BlobStore, Catalog, CategoryRecord, Coordinator, Entry,
    MemoryBlobStore, MemoryMetadataStore, MetadataError, MetadataStore, WorkspaceRecord,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Backend calls that faults can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    GetByPath,
    GetById,
    List,
    Create,
    Update,
    Delete,
    Put,
    Get,
    BlobDelete,
    Copy,
    Exists,
}

#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail without applying the call.
    Fail,
    /// Apply the call, then report failure, like a timeout after the write landed.
    LandThenFail,
    /// Never answer.
    Hang,
    /// Cancel the token, then apply the call normally.
    Cancel(CancellationToken),
}

/// Fault plan shared by the faulty stores. Call numbers are 1-based and counted per call kind.
#[derive(Default)]
pub struct Faults {
    state: Mutex<HashMap<Call, (usize, Vec<(usize, Fault)>)>>,
}

impl Faults {
    pub fn inject(&self, call: Call, nth: usize, fault: Fault) {
        let mut state = self.state.lock().unwrap();
        let (seen, plan) = state.entry(call).or_default();
        plan.push((*seen + nth, fault));
    }

    pub fn calls(&self, call: Call) -> usize {
        self.state.lock().unwrap().get(&call).map_or(0, |(seen, _)| *seen)
    }

    fn next(&self, call: Call) -> Option<Fault> {
        let mut state = self.state.lock().unwrap();
        let (seen, plan) = state.entry(call).or_default();
        *seen += 1;
        let idx = plan.iter().position(|(n, _)| *n == *seen)?;
        Some(plan.remove(idx).1)
    }

    async fn run<T, E, F>(&self, call: Call, op: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: FromTimeout,
    {
        match self.next(call) {
            None => op.await,
            Some(Fault::Fail) => Err(E::from_timeout(format!("injected failure on {:?}", call))),
            Some(Fault::LandThenFail) => {
                op.await?;
                Err(E::from_timeout(format!("injected failure after {:?} landed", call)))
            }
            Some(Fault::Hang) => std::future::pending().await,
            Some(Fault::Cancel(token)) => {
                token.cancel();
                op.await
            }
        }
    }
}

pub struct FaultyMetadata {
    pub inner: Arc<MemoryMetadataStore>,
    pub faults: Arc<Faults>,
}

#[async_trait]
impl MetadataStore for FaultyMetadata {
    async fn get_by_path(&self, workspace: Uuid, path: &KbPath) -> Result<Entry, MetadataError> {
        self.faults.run(Call::GetByPath, self.inner.get_by_path(workspace, path)).await
    }

    async fn get_by_id(&self, workspace: Uuid, id: Uuid) -> Result<Entry, MetadataError> {
        self.faults.run(Call::GetById, self.inner.get_by_id(workspace, id)).await
    }

    async fn list_page(
        &self,
        workspace: Uuid,
        parent: &KbPath,
        recursive: bool,
        after: Option<&KbPath>,
        limit: usize,
    ) -> Result<Vec<Entry>, MetadataError> {
        self.faults
            .run(Call::List, self.inner.list_page(workspace, parent, recursive, after, limit))
            .await
    }

    async fn create(&self, entry: &Entry) -> Result<(), MetadataError> {
        self.faults.run(Call::Create, self.inner.create(entry)).await
    }

    async fn update(&self, entry: &Entry) -> Result<(), MetadataError> {
        self.faults.run(Call::Update, self.inner.update(entry)).await
    }

    async fn delete(&self, workspace: Uuid, path: &KbPath) -> Result<(), MetadataError> {
        self.faults.run(Call::Delete, self.inner.delete(workspace, path)).await
    }

    async fn create_workspace(&self, record: &WorkspaceRecord) -> Result<(), MetadataError> {
        self.inner.create_workspace(record).await
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
        self.inner.delete_workspace(id).await
    }

    async fn upsert_category(&self, record: &CategoryRecord) -> Result<(), MetadataError> {
        self.inner.upsert_category(record).await
    }

    async fn get_category(&self, workspace: Uuid, id: Uuid) -> Result<CategoryRecord, MetadataError> {
        self.inner.get_category(workspace, id).await
    }

    async fn list_categories(&self, workspace: Uuid) -> Result<Vec<CategoryRecord>, MetadataError> {
        self.inner.list_categories(workspace).await
    }

    async fn delete_category(&self, workspace: Uuid, id: Uuid) -> Result<(), MetadataError> {
        self.inner.delete_category(workspace, id).await
    }
}

pub struct FaultyBlobs {
    pub inner: Arc<MemoryBlobStore>,
    pub faults: Arc<Faults>,
}

#[async_trait]
impl BlobStore for FaultyBlobs {
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<(), BlobError> {
        self.faults.run(Call::Put, self.inner.put(key, bytes)).await
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError> {
        self.faults.run(Call::Get, self.inner.get(key)).await
    }

    async fn delete(&self, key: &BlobKey) -> Result<(), BlobError> {
        self.faults.run(Call::BlobDelete, self.inner.delete(key)).await
    }

    async fn copy(&self, src: &BlobKey, dst: &BlobKey) -> Result<(), BlobError> {
        self.faults.run(Call::Copy, self.inner.copy(src, dst)).await
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, BlobError> {
        self.faults.run(Call::Exists, self.inner.exists(key)).await
    }
}

/// A workspace backed by in-memory stores behind fault-injecting wrappers.
pub struct Harness {
    pub metadata: Arc<MemoryMetadataStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub faults: Arc<Faults>,
    pub catalog: Catalog,
    pub workspace: WorkspaceRecord,
    pub kb: Coordinator,
    pub ctx: OpContext,
}

impl Harness {
    pub async fn new(keying: BlobKeying) -> Harness {
        init_tracing();
        let metadata = Arc::new(MemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let faults = Arc::new(Faults::default());
        let faulty_metadata: Arc<dyn MetadataStore> =
            Arc::new(FaultyMetadata { inner: metadata.clone(), faults: faults.clone() });
        let faulty_blobs: Arc<dyn BlobStore> = Arc::new(FaultyBlobs { inner: blobs.clone(), faults: faults.clone() });

        let ctx = OpContext::new(Duration::from_secs(5));
        let catalog = Catalog::new(faulty_metadata.clone());
        let workspace = catalog.create_workspace(&ctx, "Family Law").await.unwrap();
        // A small page size makes listings span several pages.
        let kb = Coordinator::new(workspace.id, faulty_metadata, faulty_blobs)
            .with_keying(keying)
            .with_page_size(2);
        Harness { metadata, blobs, faults, catalog, workspace, kb, ctx }
    }

    /// Creates `path` with its ancestors and a text body equal to the path.
    pub async fn doc(&self, path: &str) -> casebase_core::storage::DocumentRecord {
        let p: KbPath = path.parse().unwrap();
        if let Some(parent) = p.parent().filter(|p| !p.is_root()) {
            self.kb.ensure_path(&self.ctx, &parent.to_string()).await.unwrap();
        }
        self.kb
            .create_document(&self.ctx, path, path.as_bytes().to_vec(), "text/plain")
            .await
            .unwrap()
    }

    /// All record paths of the workspace, sorted.
    pub async fn paths(&self) -> Vec<String> {
        self.metadata
            .snapshot()
            .await
            .entries
            .iter()
            .filter(|e| e.workspace_id() == self.workspace.id)
            .map(|e| e.path().to_string())
            .collect()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
