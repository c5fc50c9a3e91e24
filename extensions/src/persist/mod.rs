//! Metadata and vector index stores that keep their state in a JSON file.
//!
//! Both wrap the in-memory stores from `casebase_core` and rewrite their file after every
//! successful mutation. The file is written to a sibling temporary file and renamed into
//! place, so a crash leaves either the old or the new image on disk.

mod index;
mod metadata;

pub use index::JsonVectorIndex;
pub use metadata::JsonMetadataStore;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and parses `path`, or returns `None` if it does not exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(PersistError::Io { path: path.to_path_buf(), source }),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PersistError::Parse { path: path.to_path_buf(), source })
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let io = |source: std::io::Error| PersistError::Io { path: path.to_path_buf(), source };
    let json = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Parse { path: path.to_path_buf(), source })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io)?;
    }
    let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
    fs::write(&tmp, json).await.map_err(io)?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io(e));
    }
    Ok(())
}
