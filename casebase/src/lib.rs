use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use casebase_core::config::Config;
use casebase_core::context::OpContext;
use casebase_core::embedding::EmbeddingClient;
use casebase_core::search::{Indexer, SearchEngine};
use casebase_core::storage::{Catalog, Coordinator, WorkspaceRecord};
use casebase_extensions::blob::LocalBlobStore;
use casebase_extensions::embedding::HashingEmbedder;
use casebase_extensions::persist::{JsonMetadataStore, JsonVectorIndex};
use tracing::debug;

pub mod cli;
pub mod commands;

/// Stores and settings shared by every command.
pub struct AppContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub catalog: Catalog,
    pub blobs: Arc<LocalBlobStore>,
    pub index: Arc<JsonVectorIndex>,
    pub embedder: Arc<HashingEmbedder>,
    /// Workspace requested on the command line, if any.
    pub workspace: Option<String>,
    /// Context for the current command; cancelled on Ctrl-C.
    pub ctx: OpContext,
}

impl AppContext {
    /// Opens the stores under `data_dir`, creating the directory on first use.
    pub async fn open(data_dir: &Path, config_file: Option<&Path>, workspace: Option<String>) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = match config_file {
            Some(file) => Config::load(file)
                .await
                .with_context(|| format!("Failed to load config from {}", file.display()))?,
            None => Config::load_or_default(&data_dir.join("config.json")).await?,
        };
        debug!("Using configuration {:?}", config);

        let metadata = Arc::new(JsonMetadataStore::open(data_dir.join("metadata.json")).await?);
        let blobs = Arc::new(LocalBlobStore::open(data_dir.join("blobs")).await?);
        let index = Arc::new(JsonVectorIndex::open(data_dir.join("index.json")).await?);

        Ok(AppContext {
            ctx: config.op_context(),
            config,
            data_dir: data_dir.to_path_buf(),
            catalog: Catalog::new(metadata),
            blobs,
            index,
            embedder: Arc::new(HashingEmbedder::default()),
            workspace,
        })
    }

    /// The workspace named on the command line, or the only one that exists.
    pub async fn workspace(&self) -> Result<WorkspaceRecord> {
        if let Some(name) = &self.workspace {
            return self
                .catalog
                .workspace_by_name(&self.ctx, name)
                .await
                .with_context(|| format!("Unknown workspace '{}'", name));
        }
        let mut workspaces = self.catalog.list_workspaces(&self.ctx).await?;
        match workspaces.len() {
            1 => Ok(workspaces.remove(0)),
            0 => anyhow::bail!("No workspace exists yet; create one with `casebase workspace create <name>`"),
            _ => anyhow::bail!("Several workspaces exist; pick one with --workspace"),
        }
    }

    pub async fn coordinator(&self) -> Result<Coordinator> {
        let workspace = self.workspace().await?;
        Ok(self.catalog.coordinator(&workspace, self.blobs.clone(), &self.config.storage))
    }

    pub fn client(&self) -> EmbeddingClient {
        EmbeddingClient::new(self.embedder.clone(), self.index.clone())
    }

    pub async fn indexer(&self) -> Result<Indexer> {
        Ok(Indexer::new(self.coordinator().await?, self.client()))
    }

    /// A search engine using the configured ranking. `case_sensitive` forces exact-case
    /// keyword matching on top of the configuration.
    pub async fn search_engine(&self, case_sensitive: bool) -> Result<SearchEngine> {
        let ranking = self.config.ranking.clone();
        let ranking = if case_sensitive { ranking.with_case_sensitive(true) } else { ranking };
        Ok(SearchEngine::new(self.coordinator().await?, self.client(), ranking))
    }
}
