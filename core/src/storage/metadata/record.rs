use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::path::KbPath;
use crate::storage::BlobKey;

/// A top-level namespace. Names are unique across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceRecord {
    pub fn new(name: impl Into<String>) -> Self {
        WorkspaceRecord { id: Uuid::new_v4(), name: name.into(), created_at: Utc::now() }
    }
}

/// Optional topical classification inside a workspace. Purely organizational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub path: KbPath,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub path: KbPath,
    pub size: u64,
    pub content_type: String,
    /// Hex-encoded SHA-256 of the blob bytes.
    pub checksum: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    /// Reference into the vector index; `None` until the document has been indexed.
    #[serde(default)]
    pub index_ref: Option<Uuid>,
    pub blob_key: BlobKey,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Tag membership, ignoring case and surrounding whitespace. Folding is Unicode-aware.
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        !tag.is_empty() && self.tags.iter().any(|t| t.to_lowercase() == tag)
    }
}

/// A folder or document record as held by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    Folder(FolderRecord),
    Document(DocumentRecord),
}

impl Entry {
    pub fn id(&self) -> Uuid {
        match self {
            Entry::Folder(f) => f.id,
            Entry::Document(d) => d.id,
        }
    }

    pub fn workspace_id(&self) -> Uuid {
        match self {
            Entry::Folder(f) => f.workspace_id,
            Entry::Document(d) => d.workspace_id,
        }
    }

    pub fn path(&self) -> &KbPath {
        match self {
            Entry::Folder(f) => &f.path,
            Entry::Document(d) => &d.path,
        }
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        match self {
            Entry::Folder(f) => f.modified_at,
            Entry::Document(d) => d.modified_at,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Entry::Folder(_))
    }

    pub fn as_document(&self) -> Option<&DocumentRecord> {
        match self {
            Entry::Document(d) => Some(d),
            Entry::Folder(_) => None,
        }
    }

    /// Returns a copy relocated to `path`, with the modification time bumped.
    pub(crate) fn relocated(&self, path: KbPath, now: DateTime<Utc>) -> Entry {
        match self {
            Entry::Folder(f) => Entry::Folder(FolderRecord { path, modified_at: now, ..f.clone() }),
            Entry::Document(d) => Entry::Document(DocumentRecord { path, modified_at: now, ..d.clone() }),
        }
    }
}
