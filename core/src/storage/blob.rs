//! Contract over the external blob (object) store.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::context::FromTimeout;
use crate::path::KbPath;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(BlobKey),

    #[error("Invalid blob key: {0}")]
    InvalidKey(BlobKey),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
}

impl FromTimeout for BlobError {
    fn from_timeout(message: String) -> Self {
        BlobError::Unavailable(message)
    }
}

/// Opaque object key, chosen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl BlobKey {
    pub fn new(key: impl Into<String>) -> Self {
        BlobKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How document blobs are keyed.
///
/// `ById` keys never change, so renames and moves leave blobs untouched. `ByPath` keys mirror
/// the document path and force the copy-then-delete sequence on every rename or move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKeying {
    #[default]
    ById,
    ByPath,
}

impl BlobKeying {
    pub fn key_for(&self, workspace: Uuid, document: Uuid, path: &KbPath) -> BlobKey {
        match self {
            BlobKeying::ById => BlobKey(format!("{}/{}", workspace, document)),
            BlobKeying::ByPath => BlobKey(format!("{}/{}", workspace, path)),
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<(), BlobError>;

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError>;

    async fn delete(&self, key: &BlobKey) -> Result<(), BlobError>;

    /// Server-side copy. Backends without one may read and re-write.
    async fn copy(&self, src: &BlobKey, dst: &BlobKey) -> Result<(), BlobError> {
        let bytes = self.get(src).await?;
        self.put(dst, &bytes).await
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, BlobError>;

    /// Relocates a blob as copy-then-delete. The coordinator does not use this for
    /// multi-record operations, where it must interleave metadata updates between the two
    /// halves.
    async fn rename(&self, src: &BlobKey, dst: &BlobKey) -> Result<(), BlobError> {
        self.copy(src, dst).await?;
        match self.delete(src).await {
            Ok(()) | Err(BlobError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
