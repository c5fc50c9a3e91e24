//! Two-backend storage for a legal knowledge base.
//!
//! File bytes live in a blob store ([`BlobStore`]) while folder and document metadata (path,
//! size, tags, category) live in a separate metadata store ([`MetadataStore`]). The two
//! backends share no transaction, so every structural operation goes through the
//! [`Coordinator`], which runs it as an ordered, idempotent sequence of steps.
//!
//! # Core Concepts
//!
//! *   **Workspace / Category:** plain catalog records with no blob counterpart, managed by the
//!     [`Catalog`].
//! *   **Folder:** a container addressed by a [`KbPath`](crate::path::KbPath). There is no
//!     pointer hierarchy; a folder's children are whatever entries have its path as a prefix.
//! *   **Document:** a leaf entry whose record references exactly one blob by
//!     [`BlobKey`]. A record whose blob is missing is *corrupt* and is reported as
//!     [`Error::Corrupt`], never hidden.
//!
//! # Ordering Rules
//!
//! The coordinator owns the rule "a metadata record implies its blob exists, except while an
//! operation is in flight":
//!
//! 1.  **Create:** blob first, then the record. If the record write fails the fresh blob is
//!     discarded on a best-effort basis; an orphan blob is garbage, a dangling record is a
//!     correctness hazard.
//! 2.  **Rename/move:** blob copies (when keys depend on the path) before any metadata update,
//!     metadata updates leaf-to-root, old blobs deleted last.
//! 3.  **Delete:** blobs first, then records leaf-to-root.
//!
//! Retrying a failed call with the same arguments converges. A multi-step operation that stops
//! partway returns [`Error::PartialFailure`] (or [`Error::Cancelled`]) with the list of steps
//! that were applied.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use casebase_core::context::OpContext;
//! use casebase_core::storage::{Catalog, Coordinator, MemoryBlobStore, MemoryMetadataStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = Arc::new(MemoryMetadataStore::new());
//!     let blobs = Arc::new(MemoryBlobStore::new());
//!     let ctx = OpContext::default();
//!
//!     let workspace = Catalog::new(metadata.clone()).create_workspace(&ctx, "Family Law").await?;
//!     let kb = Coordinator::new(workspace.id, metadata, blobs);
//!
//!     kb.ensure_path(&ctx, "clients/smith").await?;
//!     let doc = kb
//!         .create_document(&ctx, "clients/smith/intake.txt", b"Initial intake notes".to_vec(), "text/plain")
//!         .await?;
//!     kb.rename_or_move(&ctx, "clients/smith", "clients/smith-jones").await?;
//!     assert_eq!(kb.get(&ctx, "clients/smith-jones/intake.txt").await?.id(), doc.id);
//!     Ok(())
//! }
//! ```

pub use self::blob::{BlobError, BlobKey, BlobKeying, BlobStore};
pub use self::coordinator::{Coordinator, DeleteSummary, DEFAULT_PAGE_SIZE};
pub use self::document::checksum;
pub use self::memory::{MemoryBlobStore, MemoryMetadataStore, MetadataSnapshot};
pub use self::metadata::{
    CategoryRecord, DocumentRecord, Entry, FolderRecord, Listing, MetadataError, MetadataStore,
    WorkspaceRecord,
};
pub use self::progress::{Operation, Progress, Step};
pub use self::workspace::Catalog;

mod blob;
mod coordinator;
mod document;
mod folder;
mod memory;
mod metadata;
mod progress;
mod workspace;

use crate::path::{KbPath, PathError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Folder is not empty: {0}")]
    NotEmpty(String),

    #[error("Document '{path}' is corrupt: blob '{key}' is missing")]
    Corrupt { path: KbPath, key: BlobKey },

    #[error("Operation stopped partway: {0}")]
    PartialFailure(Box<Progress>),

    #[error("Operation cancelled: {0}")]
    Cancelled(Box<Progress>),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Progress report carried by `PartialFailure` and `Cancelled`.
    pub fn progress(&self) -> Option<&Progress> {
        match self {
            Error::PartialFailure(progress) | Error::Cancelled(progress) => Some(progress),
            _ => None,
        }
    }

    /// True for outcomes a caller is expected to retry with the same arguments.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::PartialFailure(_) | Error::Conflict(_))
    }
}

impl From<PathError> for Error {
    fn from(err: PathError) -> Self {
        Error::InvalidPath(err.to_string())
    }
}

impl From<MetadataError> for Error {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(what) => Error::NotFound(what),
            MetadataError::Conflict(what) => Error::Conflict(what),
            MetadataError::Unavailable(why) => Error::Unavailable(why),
        }
    }
}

impl From<BlobError> for Error {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(key) => Error::NotFound(format!("blob '{}'", key)),
            BlobError::InvalidKey(key) => Error::InvalidInput(format!("invalid blob key '{}'", key)),
            BlobError::Unavailable(why) => Error::Unavailable(why),
        }
    }
}

// Define a standard Result type for the library
pub type Result<T> = std::result::Result<T, Error>;
