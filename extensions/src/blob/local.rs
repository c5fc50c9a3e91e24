use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use casebase_core::storage::{BlobError, BlobKey, BlobStore};
use tokio::fs;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Blob store keeping one file per key below a root directory.
///
/// Keys are slash-separated and map to nested directories. Writes go to a temporary file
/// that is renamed into place, so a reader never sees a half-written blob.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| unavailable(&root, e))?;
        Ok(LocalBlobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, key: &BlobKey) -> Result<PathBuf, BlobError> {
        let mut path = self.root.clone();
        for segment in key.as_str().split('/') {
            let unsafe_segment = segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.starts_with(".tmp-")
                || segment.contains(['\\', '\0', ':']);
            if unsafe_segment {
                return Err(BlobError::InvalidKey(key.clone()));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> BlobError {
    BlobError::Unavailable(format!("{}: {}", path.display(), err))
}

fn map_io(key: &BlobKey, path: &Path, err: std::io::Error) -> BlobError {
    if err.kind() == ErrorKind::NotFound {
        BlobError::NotFound(key.clone())
    } else {
        unavailable(path, err)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), BlobError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| unavailable(parent, e))?;
    }
    Ok(())
}

/// Writes `bytes` next to `path` and renames the result over it.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), BlobError> {
    ensure_parent(path).await?;
    let tmp = path.with_file_name(format!(".tmp-{}", Uuid::new_v4()));
    fs::write(&tmp, bytes).await.map_err(|e| unavailable(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(unavailable(path, e));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, bytes), fields(key = %key, size = bytes.len()))]
    async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.file_for(key)?;
        write_atomically(&path, bytes).await?;
        debug!("Wrote blob");
        Ok(())
    }

    async fn get(&self, key: &BlobKey) -> Result<Vec<u8>, BlobError> {
        let path = self.file_for(key)?;
        fs::read(&path).await.map_err(|e| map_io(key, &path, e))
    }

    async fn delete(&self, key: &BlobKey) -> Result<(), BlobError> {
        let path = self.file_for(key)?;
        fs::remove_file(&path).await.map_err(|e| map_io(key, &path, e))
    }

    async fn copy(&self, src: &BlobKey, dst: &BlobKey) -> Result<(), BlobError> {
        let from = self.file_for(src)?;
        let to = self.file_for(dst)?;
        let bytes = fs::read(&from).await.map_err(|e| map_io(src, &from, e))?;
        write_atomically(&to, &bytes).await
    }

    async fn exists(&self, key: &BlobKey) -> Result<bool, BlobError> {
        let path = self.file_for(key)?;
        fs::try_exists(&path).await.map_err(|e| unavailable(&path, e))
    }
}
