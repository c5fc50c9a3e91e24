use std::collections::BTreeSet;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::context::OpContext;
use crate::path::{self, KbPath};
use crate::storage::coordinator::interrupted;
use crate::storage::{
    BlobError, BlobKey, Coordinator, DeleteSummary, DocumentRecord, Entry, Error, MetadataError,
    Operation, Progress, Result, Step,
};

/// Hex-encoded SHA-256 of `bytes`, as stored in [`DocumentRecord::checksum`].
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Whether a record write that returned an error actually landed.
pub(super) enum WriteOutcome {
    Landed,
    Missing,
    Unknown,
}

impl Coordinator {
    /// Stores `bytes` as a new document at `path`.
    ///
    /// The blob is written first and the record second. If the record write fails, the blob is
    /// removed again unless the record turns out to have landed anyway.
    ///
    /// # Errors
    ///
    /// * `InvalidInput` if `content_type` is not a valid media type.
    /// * `Conflict` if a folder or document already exists at `path`.
    /// * `NotFound` if the parent folder does not exist.
    #[instrument(skip(self, ctx, bytes), fields(workspace = %self.workspace, size = bytes.len()))]
    pub async fn create_document(
        &self,
        ctx: &OpContext,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<DocumentRecord> {
        let path = path::normalize(path)?;
        let content_type = content_type
            .parse::<mime::Mime>()
            .map_err(|e| Error::InvalidInput(format!("content type '{}': {}", content_type, e)))?;
        if self.lookup(ctx, &path).await?.is_some() {
            return Err(Error::Conflict(format!("'{}' already exists", path)));
        }
        self.require_parent_folder(ctx, &path).await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = DocumentRecord {
            id,
            workspace_id: self.workspace,
            blob_key: self.keying.key_for(self.workspace, id, &path),
            path,
            size: bytes.len() as u64,
            content_type: content_type.essence_str().to_string(),
            checksum: checksum(&bytes),
            tags: BTreeSet::new(),
            category_id: None,
            index_ref: None,
            created_at: now,
            modified_at: now,
        };

        ctx.call("blob.put", self.blobs.put(&record.blob_key, &bytes)).await?;

        if let Err(e) = ctx
            .call("metadata.create", self.metadata.create(&Entry::Document(record.clone())))
            .await
        {
            warn!("Record write for '{}' failed: {}", record.path, e);
            match self.write_outcome(ctx, id, &record.path).await {
                WriteOutcome::Landed => debug!("Record landed despite the error, keeping blob"),
                WriteOutcome::Missing => self.discard_blob(ctx, &record.blob_key).await,
                WriteOutcome::Unknown => {
                    warn!("Could not tell whether the record landed, leaving blob '{}'", record.blob_key)
                }
            }
            return Err(e.into());
        }

        debug!("Created document '{}' ({} bytes)", record.path, record.size);
        Ok(record)
    }

    /// Returns the document record at `path`.
    pub async fn get_document(&self, ctx: &OpContext, path: &str) -> Result<DocumentRecord> {
        match self.get(ctx, path).await? {
            Entry::Document(document) => Ok(document),
            Entry::Folder(folder) => Err(Error::NotFound(format!("document '{}' (a folder exists there)", folder.path))),
        }
    }

    /// Returns the document record at `path` together with its bytes.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` if the record exists but its blob does not.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn read_document(&self, ctx: &OpContext, path: &str) -> Result<(DocumentRecord, Vec<u8>)> {
        let document = self.get_document(ctx, path).await?;
        match ctx.call("blob.get", self.blobs.get(&document.blob_key)).await {
            Ok(bytes) => {
                if checksum(&bytes) != document.checksum {
                    warn!("Checksum mismatch for '{}'", document.path);
                }
                Ok((document, bytes))
            }
            Err(BlobError::NotFound(_)) => Err(corrupt(&document)),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks that the blob behind the document at `path` exists.
    pub async fn verify_document(&self, ctx: &OpContext, path: &str) -> Result<DocumentRecord> {
        let document = self.get_document(ctx, path).await?;
        if ctx.call("blob.exists", self.blobs.exists(&document.blob_key)).await? {
            Ok(document)
        } else {
            Err(corrupt(&document))
        }
    }

    /// Replaces the tag set of the document at `path`. Tags are trimmed and lowercased, and
    /// blank ones dropped, so tags differing only in case collapse into one.
    #[instrument(skip(self, ctx, tags), fields(workspace = %self.workspace))]
    pub async fn set_tags<I, S>(&self, ctx: &OpContext, path: &str, tags: I) -> Result<DocumentRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut document = self.get_document(ctx, path).await?;
        document.tags = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        self.save_document(ctx, document).await
    }

    /// Assigns the document at `path` to a category of this workspace, or clears it.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn set_category(&self, ctx: &OpContext, path: &str, category: Option<Uuid>) -> Result<DocumentRecord> {
        if let Some(category) = category {
            ctx.call("metadata.get_category", self.metadata.get_category(self.workspace, category))
                .await?;
        }
        let mut document = self.get_document(ctx, path).await?;
        document.category_id = category;
        self.save_document(ctx, document).await
    }

    /// Records (or clears) the vector index entry of a document, addressed by id.
    pub async fn set_index_ref(&self, ctx: &OpContext, id: Uuid, index_ref: Option<Uuid>) -> Result<DocumentRecord> {
        match self.get_by_id(ctx, id).await? {
            Entry::Document(mut document) => {
                document.index_ref = index_ref;
                self.save_document(ctx, document).await
            }
            Entry::Folder(folder) => Err(Error::InvalidInput(format!("'{}' is a folder", folder.path))),
        }
    }

    async fn save_document(&self, ctx: &OpContext, mut document: DocumentRecord) -> Result<DocumentRecord> {
        document.modified_at = Utc::now();
        ctx.call("metadata.update", self.metadata.update(&Entry::Document(document.clone())))
            .await?;
        Ok(document)
    }

    /// Moves a single document: copy the blob if its key changes, update the record, then
    /// delete the old blob.
    pub(super) async fn move_document(&self, ctx: &OpContext, document: DocumentRecord, to: KbPath) -> Result<Entry> {
        let from = document.path.clone();
        let old = Entry::Document(document);
        let moved = self.relocate(&old, to.clone(), Utc::now());
        let (Entry::Document(old_doc), Entry::Document(new_doc)) = (&old, &moved) else {
            return Err(Error::InvalidInput(format!("'{}' is not a document", from)));
        };
        let rekeyed = old_doc.blob_key != new_doc.blob_key;
        let mut progress = Progress::new(Operation::Move { from: from.clone(), to: to.clone() });

        if rekeyed {
            match ctx.call("blob.copy", self.blobs.copy(&old_doc.blob_key, &new_doc.blob_key)).await {
                Ok(()) => progress.record(Step::BlobCopied {
                    from: old_doc.blob_key.clone(),
                    to: new_doc.blob_key.clone(),
                }),
                Err(BlobError::NotFound(_)) => return Err(corrupt(old_doc)),
                Err(e) => return Err(e.into()),
            }
        } else if !ctx.call("blob.exists", self.blobs.exists(&old_doc.blob_key)).await? {
            warn!("Blob for '{}' is missing, refusing to move it", from);
            return Err(corrupt(old_doc));
        }

        if let Err(e) = ctx.call("metadata.update", self.metadata.update(&moved)).await {
            warn!("Record update for '{}' failed: {}", from, e);
            if !rekeyed {
                return Err(e.into());
            }
            match self.write_outcome(ctx, old_doc.id, &to).await {
                WriteOutcome::Landed => self.discard_blob(ctx, &old_doc.blob_key).await,
                WriteOutcome::Missing => self.discard_blob(ctx, &new_doc.blob_key).await,
                WriteOutcome::Unknown => {
                    progress.orphaned_blobs.push(new_doc.blob_key.clone());
                    return Err(interrupted(progress, &from, e.into()));
                }
            }
            return Err(e.into());
        }

        if rekeyed {
            self.discard_blob(ctx, &old_doc.blob_key).await;
        }
        debug!("Moved document '{}' to '{}'", from, to);
        Ok(moved)
    }

    /// Deletes a document: blob first, then the record.
    pub(super) async fn delete_document(&self, ctx: &OpContext, document: DocumentRecord) -> Result<DeleteSummary> {
        let mut progress = Progress::new(Operation::Delete { path: document.path.clone() });
        let mut summary = DeleteSummary::default();

        match ctx.call("blob.delete", self.blobs.delete(&document.blob_key)).await {
            Ok(()) => {
                summary.blobs = 1;
                progress.record(Step::BlobDeleted { key: document.blob_key.clone() });
            }
            Err(BlobError::NotFound(_)) => {
                warn!("Blob '{}' for '{}' was already gone", document.blob_key, document.path);
            }
            Err(e) => return Err(e.into()),
        }

        match ctx
            .call("metadata.delete", self.metadata.delete(self.workspace, &document.path))
            .await
        {
            Ok(()) | Err(MetadataError::NotFound(_)) => {}
            Err(e) => return Err(interrupted(progress, &document.path, e.into())),
        }
        summary.documents = 1;
        debug!("Deleted document '{}'", document.path);
        Ok(summary)
    }

    /// Re-reads a record by id after a failed write to learn whether it landed at `expected`.
    pub(super) async fn write_outcome(&self, ctx: &OpContext, id: Uuid, expected: &KbPath) -> WriteOutcome {
        match ctx.call("metadata.get_by_id", self.metadata.get_by_id(self.workspace, id)).await {
            Ok(entry) if entry.path() == expected => WriteOutcome::Landed,
            Ok(_) | Err(MetadataError::NotFound(_)) => WriteOutcome::Missing,
            Err(e) => {
                warn!("Could not re-read record {}: {}", id, e);
                WriteOutcome::Unknown
            }
        }
    }

    /// Best-effort blob removal. Failures are logged; the blob becomes garbage.
    pub(super) async fn discard_blob(&self, ctx: &OpContext, key: &BlobKey) {
        match ctx.call("blob.delete", self.blobs.delete(key)).await {
            Ok(()) | Err(BlobError::NotFound(_)) => debug!("Discarded blob '{}'", key),
            Err(e) => warn!("Could not discard blob '{}': {}", key, e),
        }
    }
}

pub(super) fn corrupt(document: &DocumentRecord) -> Error {
    Error::Corrupt { path: document.path.clone(), key: document.blob_key.clone() }
}
