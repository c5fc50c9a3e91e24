use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::context::OpContext;
use crate::path::{self, KbPath};
use crate::storage::{
    BlobKeying, BlobStore, DocumentRecord, Entry, Error, Listing, MetadataError, MetadataStore,
    Progress, Result,
};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Counts of what a delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub folders: usize,
    pub documents: usize,
    pub blobs: usize,
}

impl DeleteSummary {
    /// Number of metadata records removed.
    pub fn total(&self) -> usize {
        self.folders + self.documents
    }
}

/// Runs structural operations for one workspace across the metadata and blob stores.
///
/// The coordinator holds no cached state: every operation re-reads what it needs from the
/// metadata store. Cloning is cheap and clones share the same backends.
#[derive(Clone)]
pub struct Coordinator {
    pub(super) workspace: Uuid,
    pub(super) metadata: Arc<dyn MetadataStore>,
    pub(super) blobs: Arc<dyn BlobStore>,
    pub(super) keying: BlobKeying,
    page_size: usize,
}

impl Coordinator {
    pub fn new(workspace: Uuid, metadata: Arc<dyn MetadataStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Coordinator {
            workspace,
            metadata,
            blobs,
            keying: BlobKeying::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_config(
        workspace: Uuid,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        config: &StorageConfig,
    ) -> Self {
        Coordinator::new(workspace, metadata, blobs)
            .with_keying(config.blob_keying)
            .with_page_size(config.page_size)
    }

    pub fn with_keying(mut self, keying: BlobKeying) -> Self {
        self.keying = keying;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace
    }

    pub fn keying(&self) -> BlobKeying {
        self.keying
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// A lazy listing below `parent`, paged with this coordinator's page size.
    pub fn listing(&self, parent: KbPath, recursive: bool) -> Listing {
        Listing::new(self.metadata.clone(), self.workspace, parent, recursive, self.page_size)
    }

    /// Looks up the folder or document at `path`.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn get(&self, ctx: &OpContext, path: &str) -> Result<Entry> {
        let path = path::normalize(path)?;
        self.lookup(ctx, &path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("'{}'", path)))
    }

    /// Looks up a folder or document by its stored id.
    pub async fn get_by_id(&self, ctx: &OpContext, id: Uuid) -> Result<Entry> {
        let entry = ctx
            .call("metadata.get_by_id", self.metadata.get_by_id(self.workspace, id))
            .await?;
        Ok(entry)
    }

    /// Lists the entries below the folder at `path`, ordered by path. An empty path or `/`
    /// lists from the workspace root.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn list(&self, ctx: &OpContext, path: &str, recursive: bool) -> Result<Vec<Entry>> {
        let parent = if path.trim_matches(path::SEPARATOR).is_empty() {
            KbPath::root()
        } else {
            let parent = path::normalize(path)?;
            match self.lookup(ctx, &parent).await? {
                Some(Entry::Folder(_)) => parent,
                Some(Entry::Document(_)) => {
                    return Err(Error::InvalidPath(format!("'{}' is a document, not a folder", parent)));
                }
                None => return Err(Error::NotFound(format!("folder '{}'", parent))),
            }
        };
        let mut listing = self.listing(parent, recursive);
        let mut entries = Vec::new();
        while let Some(entry) = ctx.call("metadata.list", listing.next()).await? {
            entries.push(entry);
        }
        debug!("Listed {} entries", entries.len());
        Ok(entries)
    }

    /// Documents at or below the folder at `path` whose file name contains `query`.
    ///
    /// Matching is a plain substring test on the last path segment, folded to lowercase unless
    /// `case_sensitive` is set. Results are ordered by path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank query, plus the errors of [`Coordinator::list`].
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn find(
        &self,
        ctx: &OpContext,
        path: &str,
        query: &str,
        case_sensitive: bool,
    ) -> Result<Vec<DocumentRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("search query is empty".to_string()));
        }
        let needle = if case_sensitive { query.to_string() } else { query.to_lowercase() };
        let matches: Vec<DocumentRecord> = self
            .list(ctx, path, true)
            .await?
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Document(document) => Some(document),
                Entry::Folder(_) => None,
            })
            .filter(|document| {
                let name = document.path.name().unwrap_or_default();
                if case_sensitive {
                    name.contains(&needle)
                } else {
                    name.to_lowercase().contains(&needle)
                }
            })
            .collect();
        debug!("{} document(s) match '{}'", matches.len(), query);
        Ok(matches)
    }

    /// Renames or moves the folder or document at `old_path` to `new_path`.
    ///
    /// Identity is preserved: the entry keeps its id, and a folder's descendants keep theirs.
    ///
    /// # Errors
    ///
    /// * `InvalidPath` if a folder would be moved onto or below itself.
    /// * `Conflict` if something already exists at `new_path`.
    /// * `NotFound` if `old_path` or the folder that would hold `new_path` does not exist.
    /// * `PartialFailure` / `Cancelled` if a folder move stopped after some descendants were
    ///   moved. Calling again with the same arguments finishes the job.
    ///
    /// A move that already completed reports `NotFound` for `old_path`; use
    /// [`Coordinator::move_by_id`] to retry a move idempotently.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn rename_or_move(&self, ctx: &OpContext, old_path: &str, new_path: &str) -> Result<Entry> {
        let old_path = path::normalize(old_path)?;
        let new_path = path::normalize(new_path)?;

        let entry = self
            .lookup(ctx, &old_path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("'{}'", old_path)))?;
        self.move_entry(ctx, entry, new_path).await
    }

    /// Moves the entry with the given id to `new_path`.
    ///
    /// If the entry is already at `new_path`, the move is treated as applied and the entry is
    /// returned. This makes retries after a lost reply safe: the id pins down which entry was
    /// meant, so an unrelated entry at `new_path` is reported as a `Conflict`.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn move_by_id(&self, ctx: &OpContext, id: Uuid, new_path: &str) -> Result<Entry> {
        let new_path = path::normalize(new_path)?;
        let entry = self.get_by_id(ctx, id).await?;
        if entry.path() == &new_path {
            debug!("'{}' is already in place", new_path);
            return Ok(entry);
        }
        self.move_entry(ctx, entry, new_path).await
    }

    async fn move_entry(&self, ctx: &OpContext, entry: Entry, new_path: KbPath) -> Result<Entry> {
        let old_path = entry.path().clone();
        if entry.is_folder() && new_path.starts_with(&old_path) {
            return Err(Error::InvalidPath(format!(
                "cannot move folder '{}' onto or into itself ('{}')",
                old_path, new_path
            )));
        }
        if self.lookup(ctx, &new_path).await?.is_some() {
            return Err(Error::Conflict(format!("'{}' already exists", new_path)));
        }
        self.require_parent_folder(ctx, &new_path).await?;

        match entry {
            Entry::Folder(folder) => self.move_folder(ctx, folder, new_path).await,
            Entry::Document(document) => self.move_document(ctx, document, new_path).await,
        }
    }

    /// Deletes the folder or document at `path`.
    ///
    /// Non-empty folders are only deleted when `recursive` is set, in which case every
    /// document blob is removed before any record, and records are removed leaf-to-root.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn delete(&self, ctx: &OpContext, path: &str, recursive: bool) -> Result<DeleteSummary> {
        let path = path::normalize(path)?;
        match self.lookup(ctx, &path).await? {
            Some(Entry::Folder(folder)) => self.delete_folder(ctx, folder, recursive).await,
            Some(Entry::Document(document)) => self.delete_document(ctx, document).await,
            None => Err(Error::NotFound(format!("'{}'", path))),
        }
    }

    /// Point lookup that maps a missing record to `None`.
    pub(super) async fn lookup(&self, ctx: &OpContext, path: &KbPath) -> Result<Option<Entry>> {
        match ctx
            .call("metadata.get_by_path", self.metadata.get_by_path(self.workspace, path))
            .await
        {
            Ok(entry) => Ok(Some(entry)),
            Err(MetadataError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fails with `NotFound` unless the folder that would contain `path` exists. The root
    /// always exists.
    pub(super) async fn require_parent_folder(&self, ctx: &OpContext, path: &KbPath) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if parent.is_root() {
            return Ok(());
        }
        match self.lookup(ctx, &parent).await? {
            Some(Entry::Folder(_)) => Ok(()),
            Some(Entry::Document(_)) => Err(Error::NotFound(format!(
                "parent folder '{}' (a document exists at that path)",
                parent
            ))),
            None => Err(Error::NotFound(format!("parent folder '{}'", parent))),
        }
    }

    /// Every entry strictly below `path`, ordered leaf-to-root: deepest first, then by path.
    pub(super) async fn descendants_leaf_first(&self, ctx: &OpContext, path: &KbPath) -> Result<Vec<Entry>> {
        let mut listing = self.listing(path.clone(), true);
        let mut entries = Vec::new();
        while let Some(entry) = ctx.call("metadata.list", listing.next()).await? {
            entries.push(entry);
        }
        entries.sort_by(|a, b| {
            b.path()
                .depth()
                .cmp(&a.path().depth())
                .then_with(|| a.path().cmp(b.path()))
        });
        Ok(entries)
    }

    /// The record `entry` becomes when it moves to `path`. Path-keyed blobs get a new key.
    pub(super) fn relocate(&self, entry: &Entry, path: KbPath, now: DateTime<Utc>) -> Entry {
        let mut moved = entry.relocated(path, now);
        if let (BlobKeying::ByPath, Entry::Document(document)) = (self.keying, &mut moved) {
            document.blob_key = self.keying.key_for(self.workspace, document.id, &document.path);
        }
        moved
    }
}

/// Error to return when a multi-step operation stops at `at`. Nothing applied yet means the
/// original error is returned unchanged.
pub(super) fn interrupted(progress: Progress, at: &KbPath, err: Error) -> Error {
    if progress.is_empty() {
        err
    } else {
        Error::PartialFailure(progress.stop(at, err))
    }
}
