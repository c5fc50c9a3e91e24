//! Contract over the external document-metadata store.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use uuid::Uuid;

use crate::context::FromTimeout;
use crate::path::KbPath;

pub use self::record::{CategoryRecord, DocumentRecord, Entry, FolderRecord, WorkspaceRecord};

mod record;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record conflict: {0}")]
    Conflict(String),

    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),
}

impl FromTimeout for MetadataError {
    fn from_timeout(message: String) -> Self {
        MetadataError::Unavailable(message)
    }
}

/// Point lookups, ordered listing and idempotent single-record writes over folder, document,
/// workspace and category records.
///
/// Writes use upsert semantics keyed by record id: repeating a write that already landed
/// succeeds without creating a second record. A write that would place a *different* id at an
/// occupied path fails with [`MetadataError::Conflict`].
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_by_path(&self, workspace: Uuid, path: &KbPath) -> Result<Entry, MetadataError>;

    async fn get_by_id(&self, workspace: Uuid, id: Uuid) -> Result<Entry, MetadataError>;

    /// Returns up to `limit` entries below `parent` ordered by path, starting strictly after
    /// `after`. Non-recursive listings only return direct children.
    async fn list_page(
        &self,
        workspace: Uuid,
        parent: &KbPath,
        recursive: bool,
        after: Option<&KbPath>,
        limit: usize,
    ) -> Result<Vec<Entry>, MetadataError>;

    /// Inserts a record. Succeeds without effect if the same id is already at the same path.
    async fn create(&self, entry: &Entry) -> Result<(), MetadataError>;

    /// Replaces the record with `entry.id()`, possibly at a new path.
    async fn update(&self, entry: &Entry) -> Result<(), MetadataError>;

    async fn delete(&self, workspace: Uuid, path: &KbPath) -> Result<(), MetadataError>;

    async fn create_workspace(&self, record: &WorkspaceRecord) -> Result<(), MetadataError>;

    async fn get_workspace(&self, id: Uuid) -> Result<WorkspaceRecord, MetadataError>;

    async fn workspace_by_name(&self, name: &str) -> Result<WorkspaceRecord, MetadataError>;

    async fn list_workspaces(&self) -> Result<Vec<WorkspaceRecord>, MetadataError>;

    async fn delete_workspace(&self, id: Uuid) -> Result<(), MetadataError>;

    /// Creates or renames a category. Names are unique within a workspace.
    async fn upsert_category(&self, record: &CategoryRecord) -> Result<(), MetadataError>;

    async fn get_category(&self, workspace: Uuid, id: Uuid) -> Result<CategoryRecord, MetadataError>;

    async fn list_categories(&self, workspace: Uuid) -> Result<Vec<CategoryRecord>, MetadataError>;

    async fn delete_category(&self, workspace: Uuid, id: Uuid) -> Result<(), MetadataError>;
}

/// A lazy, restartable walk over the entries below a folder, ordered by path.
///
/// Entries are fetched one page at a time. Because pages are requested by key ("after this
/// path") rather than by offset, a listing can be resumed after an interruption with
/// [`Listing::resume_after`] without skipping or repeating entries.
pub struct Listing {
    store: Arc<dyn MetadataStore>,
    workspace: Uuid,
    parent: KbPath,
    recursive: bool,
    page_size: usize,
    // Last path handed out by `next`
    cursor: Option<KbPath>,
    // Last path fetched from the store
    fetched_until: Option<KbPath>,
    buffer: VecDeque<Entry>,
    exhausted: bool,
}

impl Listing {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        workspace: Uuid,
        parent: KbPath,
        recursive: bool,
        page_size: usize,
    ) -> Self {
        Listing {
            store,
            workspace,
            parent,
            recursive,
            page_size: page_size.max(1),
            cursor: None,
            fetched_until: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn parent(&self) -> &KbPath {
        &self.parent
    }

    /// Path of the last entry returned, if any.
    pub fn cursor(&self) -> Option<&KbPath> {
        self.cursor.as_ref()
    }

    /// Returns the next entry, fetching another page when the buffer runs dry.
    pub async fn next(&mut self) -> Result<Option<Entry>, MetadataError> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self
                .store
                .list_page(
                    self.workspace,
                    &self.parent,
                    self.recursive,
                    self.fetched_until.as_ref(),
                    self.page_size,
                )
                .await?;
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.fetched_until = Some(last.path().clone());
            }
            self.buffer.extend(page);
        }
        let entry = self.buffer.pop_front();
        if let Some(entry) = &entry {
            self.cursor = Some(entry.path().clone());
        }
        Ok(entry)
    }

    /// Starts over from the first entry. The next page reflects the store's current state.
    pub fn restart(&mut self) {
        self.reset(None);
    }

    /// Continues strictly after `path`, e.g. the cursor saved before an interruption.
    pub fn resume_after(&mut self, path: KbPath) {
        self.reset(Some(path));
    }

    fn reset(&mut self, from: Option<KbPath>) {
        self.cursor = from.clone();
        self.fetched_until = from;
        self.buffer.clear();
        self.exhausted = false;
    }

    pub async fn collect_all(mut self) -> Result<Vec<Entry>, MetadataError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Entry, MetadataError>> {
        futures::stream::try_unfold(self, |mut listing| async move {
            Ok(listing.next().await?.map(|entry| (entry, listing)))
        })
    }
}
