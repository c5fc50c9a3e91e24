use chrono::Utc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::context::OpContext;
use crate::path::{self, KbPath};
use crate::storage::coordinator::interrupted;
use crate::storage::document::{corrupt, WriteOutcome};
use crate::storage::{
    BlobError, BlobKey, Coordinator, DeleteSummary, DocumentRecord, Entry, Error, FolderRecord,
    MetadataError, Operation, Progress, Result, Step,
};

impl Coordinator {
    /// Creates a single folder.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a folder or document already exists at `path`, and `NotFound` if
    /// its parent folder does not exist. Missing ancestors are never created implicitly; see
    /// [`Coordinator::ensure_path`].
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn create_folder(&self, ctx: &OpContext, path: &str) -> Result<FolderRecord> {
        let path = path::normalize(path)?;
        if self.lookup(ctx, &path).await?.is_some() {
            return Err(Error::Conflict(format!("'{}' already exists", path)));
        }
        self.require_parent_folder(ctx, &path).await?;

        let record = self.new_folder_record(path);
        ctx.call("metadata.create", self.metadata.create(&Entry::Folder(record.clone())))
            .await?;
        debug!("Created folder '{}'", record.path);
        Ok(record)
    }

    /// Creates every missing folder along `path`, root-to-leaf, and returns the folder at
    /// `path`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` naming the first segment that is occupied by a document. Folders
    /// created before that point are kept.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace))]
    pub async fn ensure_path(&self, ctx: &OpContext, path: &str) -> Result<FolderRecord> {
        let path = path::normalize(path)?;
        let mut current = None;
        for prefix in path.ancestors().chain(std::iter::once(path.clone())) {
            current = Some(self.ensure_folder(ctx, prefix).await?);
        }
        current.ok_or_else(|| Error::InvalidPath("path is empty".to_string()))
    }

    async fn ensure_folder(&self, ctx: &OpContext, path: KbPath) -> Result<FolderRecord> {
        match self.lookup(ctx, &path).await? {
            Some(Entry::Folder(folder)) => return Ok(folder),
            Some(Entry::Document(_)) => {
                return Err(Error::Conflict(format!("'{}' is a document, not a folder", path)));
            }
            None => {}
        }
        let record = self.new_folder_record(path);
        match ctx
            .call("metadata.create", self.metadata.create(&Entry::Folder(record.clone())))
            .await
        {
            Ok(()) => {
                debug!("Created missing folder '{}'", record.path);
                Ok(record)
            }
            // Lost a race against another writer; fine as long as the winner made a folder.
            Err(MetadataError::Conflict(_)) => match self.lookup(ctx, &record.path).await? {
                Some(Entry::Folder(folder)) => Ok(folder),
                _ => Err(Error::Conflict(format!("'{}' is a document, not a folder", record.path))),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn new_folder_record(&self, path: KbPath) -> FolderRecord {
        let now = Utc::now();
        FolderRecord { id: Uuid::new_v4(), workspace_id: self.workspace, path, created_at: now, modified_at: now }
    }

    /// Moves a folder and its whole subtree.
    ///
    /// Runs in three phases: copy blobs whose key depends on the path (checking that id-keyed
    /// blobs exist), update records leaf-to-root with the folder itself last, then delete the
    /// superseded blobs. An update whose reply is lost but which landed counts as done.
    /// Cancellation is honored between descendants during the first two phases.
    pub(super) async fn move_folder(&self, ctx: &OpContext, folder: FolderRecord, to: KbPath) -> Result<Entry> {
        let from = folder.path.clone();
        let mut progress = Progress::new(Operation::Move { from: from.clone(), to: to.clone() });

        let mut entries = self.descendants_leaf_first(ctx, &from).await?;
        entries.push(Entry::Folder(folder));

        let now = Utc::now();
        let mut plan = Vec::with_capacity(entries.len());
        for entry in entries {
            let target = entry
                .path()
                .rebase(&from, &to)
                .ok_or_else(|| Error::InvalidPath(format!("'{}' is not below '{}'", entry.path(), from)))?;
            let moved = self.relocate(&entry, target, now);
            plan.push((entry, moved));
        }
        debug!("Moving {} record(s) from '{}' to '{}'", plan.len(), from, to);

        // Phase 1: copy blobs to their new keys, or confirm id-keyed blobs exist. No record
        // has changed yet.
        for (old_doc, new_doc) in documents(&plan) {
            if ctx.is_cancelled() {
                progress.orphaned_blobs = copied_keys(&progress);
                return Err(Error::Cancelled(progress.stop(&old_doc.path, "cancelled before blob copy")));
            }
            let rekey = old_doc.blob_key != new_doc.blob_key;
            let present = if rekey {
                ctx.call("blob.copy", self.blobs.copy(&old_doc.blob_key, &new_doc.blob_key))
                    .await
                    .map(|()| true)
            } else {
                ctx.call("blob.exists", self.blobs.exists(&old_doc.blob_key)).await
            };
            match present {
                Ok(true) if rekey => progress.record(Step::BlobCopied {
                    from: old_doc.blob_key.clone(),
                    to: new_doc.blob_key.clone(),
                }),
                Ok(true) => {}
                Ok(false) | Err(BlobError::NotFound(_)) => {
                    warn!("Blob for '{}' is missing, aborting move", old_doc.path);
                    for key in copied_keys(&progress) {
                        self.discard_blob(ctx, &key).await;
                    }
                    return Err(corrupt(old_doc));
                }
                Err(e) => {
                    progress.orphaned_blobs = copied_keys(&progress);
                    return Err(interrupted(progress, &old_doc.path, e.into()));
                }
            }
        }

        // Phase 2: rewrite records leaf-to-root.
        for (done, (old, new)) in plan.iter().enumerate() {
            let failure = if ctx.is_cancelled() {
                Some(None)
            } else {
                match ctx.call("metadata.update", self.metadata.update(new)).await {
                    Ok(()) => None,
                    Err(e) => match self.write_outcome(ctx, new.id(), new.path()).await {
                        WriteOutcome::Landed => {
                            debug!("Update of '{}' landed despite the error: {}", old.path(), e);
                            None
                        }
                        outcome => Some(Some((e, outcome))),
                    },
                }
            };
            let Some(failure) = failure else {
                progress.record(Step::RecordMoved { id: old.id(), from: old.path().clone(), to: new.path().clone() });
                continue;
            };
            // Records already moved no longer need their old blobs. Copies made for records
            // that did not move are unreferenced; a retry copies again. A record whose update
            // may or may not have landed keeps both of its blobs.
            self.drop_superseded(ctx, &plan[..done], &mut progress).await;
            let unsettled = matches!(failure, Some((_, WriteOutcome::Unknown)));
            let pending = if unsettled { done + 1 } else { done };
            progress
                .orphaned_blobs
                .extend(rekeyed(&plan[pending..]).map(|(_, new_doc)| new_doc.blob_key.clone()));
            return Err(match failure {
                None => Error::Cancelled(progress.stop(old.path(), "cancelled before record update")),
                Some((e, _)) => {
                    if unsettled {
                        warn!("Could not tell whether '{}' moved, keeping both of its blobs", old.path());
                    }
                    warn!("Updating '{}' failed after {} step(s): {}", old.path(), progress.completed.len(), e);
                    interrupted(progress, old.path(), e.into())
                }
            });
        }

        // Phase 3: drop superseded blobs. Failures leave garbage, never broken records.
        self.drop_superseded(ctx, &plan, &mut progress).await;

        let (_, moved) = plan
            .pop()
            .ok_or_else(|| Error::NotFound(format!("folder '{}'", from)))?;
        debug!("Moved folder '{}' to '{}'", from, to);
        Ok(moved)
    }

    async fn drop_superseded(&self, ctx: &OpContext, moved: &[(Entry, Entry)], progress: &mut Progress) {
        for (old_doc, _) in rekeyed(moved) {
            match ctx.call("blob.delete", self.blobs.delete(&old_doc.blob_key)).await {
                Ok(()) | Err(BlobError::NotFound(_)) => {
                    progress.record(Step::BlobDeleted { key: old_doc.blob_key.clone() })
                }
                Err(e) => {
                    warn!("Could not delete superseded blob '{}': {}", old_doc.blob_key, e);
                    progress.orphaned_blobs.push(old_doc.blob_key.clone());
                }
            }
        }
    }

    /// Deletes a folder. Without `recursive`, only empty folders are deleted.
    pub(super) async fn delete_folder(
        &self,
        ctx: &OpContext,
        folder: FolderRecord,
        recursive: bool,
    ) -> Result<DeleteSummary> {
        let path = folder.path.clone();
        if !recursive {
            let mut children = self.listing(path.clone(), false);
            if ctx.call("metadata.list", children.next()).await?.is_some() {
                return Err(Error::NotEmpty(format!("'{}'", path)));
            }
            match ctx.call("metadata.delete", self.metadata.delete(self.workspace, &path)).await {
                Ok(()) | Err(MetadataError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(DeleteSummary { folders: 1, ..Default::default() });
        }

        let mut entries = self.descendants_leaf_first(ctx, &path).await?;
        entries.push(Entry::Folder(folder));
        let mut progress = Progress::new(Operation::Delete { path: path.clone() });
        let mut summary = DeleteSummary::default();

        // Blobs first, so no surviving record ever points at a deleted blob for long.
        for document in entries.iter().filter_map(Entry::as_document) {
            if ctx.is_cancelled() {
                return Err(Error::Cancelled(progress.stop(&document.path, "cancelled before blob delete")));
            }
            match ctx.call("blob.delete", self.blobs.delete(&document.blob_key)).await {
                Ok(()) => {
                    summary.blobs += 1;
                    progress.record(Step::BlobDeleted { key: document.blob_key.clone() });
                }
                Err(BlobError::NotFound(_)) => {
                    warn!("Blob '{}' for '{}' was already gone", document.blob_key, document.path);
                }
                Err(e) => return Err(interrupted(progress, &document.path, e.into())),
            }
        }

        for entry in &entries {
            if ctx.is_cancelled() {
                return Err(Error::Cancelled(progress.stop(entry.path(), "cancelled before record delete")));
            }
            match ctx
                .call("metadata.delete", self.metadata.delete(self.workspace, entry.path()))
                .await
            {
                Ok(()) | Err(MetadataError::NotFound(_)) => {}
                Err(e) => return Err(interrupted(progress, entry.path(), e.into())),
            }
            match entry {
                Entry::Folder(_) => summary.folders += 1,
                Entry::Document(_) => summary.documents += 1,
            }
            progress.record(Step::RecordDeleted { id: entry.id(), path: entry.path().clone() });
        }

        debug!(
            "Deleted '{}': {} folder(s), {} document(s), {} blob(s)",
            path, summary.folders, summary.documents, summary.blobs
        );
        Ok(summary)
    }
}

/// Planned document moves.
fn documents(plan: &[(Entry, Entry)]) -> impl Iterator<Item = (&DocumentRecord, &DocumentRecord)> {
    plan.iter().filter_map(|pair| match pair {
        (Entry::Document(old), Entry::Document(new)) => Some((old, new)),
        _ => None,
    })
}

/// Planned document moves whose blob key changes.
fn rekeyed(plan: &[(Entry, Entry)]) -> impl Iterator<Item = (&DocumentRecord, &DocumentRecord)> {
    documents(plan).filter(|(old, new)| old.blob_key != new.blob_key)
}

fn copied_keys(progress: &Progress) -> Vec<BlobKey> {
    progress
        .completed
        .iter()
        .filter_map(|step| match step {
            Step::BlobCopied { to, .. } => Some(to.clone()),
            _ => None,
        })
        .collect()
}
