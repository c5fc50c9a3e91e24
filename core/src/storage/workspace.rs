use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::context::OpContext;
use crate::path::KbPath;
use crate::storage::{
    BlobStore, CategoryRecord, Coordinator, Error, MetadataError, MetadataStore, Result,
    WorkspaceRecord,
};

/// Workspace and category bookkeeping. These records have no blob counterpart, so every
/// operation here is a single metadata call plus validation.
#[derive(Clone)]
pub struct Catalog {
    metadata: Arc<dyn MetadataStore>,
}

impl Catalog {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Catalog { metadata }
    }

    /// Opens a coordinator for the documents and folders of `workspace`.
    pub fn coordinator(&self, workspace: &WorkspaceRecord, blobs: Arc<dyn BlobStore>, config: &StorageConfig) -> Coordinator {
        Coordinator::from_config(workspace.id, self.metadata.clone(), blobs, config)
    }

    /// Creates a workspace.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank name and `Conflict` if the name is taken.
    #[instrument(skip(self, ctx))]
    pub async fn create_workspace(&self, ctx: &OpContext, name: &str) -> Result<WorkspaceRecord> {
        let name = validate_name(name)?;
        match ctx.call("metadata.workspace_by_name", self.metadata.workspace_by_name(name)).await {
            Ok(_) => return Err(Error::Conflict(format!("workspace '{}'", name))),
            Err(MetadataError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let record = WorkspaceRecord::new(name);
        ctx.call("metadata.create_workspace", self.metadata.create_workspace(&record))
            .await?;
        debug!("Created workspace '{}' ({})", record.name, record.id);
        Ok(record)
    }

    pub async fn workspace(&self, ctx: &OpContext, id: Uuid) -> Result<WorkspaceRecord> {
        Ok(ctx.call("metadata.get_workspace", self.metadata.get_workspace(id)).await?)
    }

    pub async fn workspace_by_name(&self, ctx: &OpContext, name: &str) -> Result<WorkspaceRecord> {
        Ok(ctx
            .call("metadata.workspace_by_name", self.metadata.workspace_by_name(name.trim()))
            .await?)
    }

    /// All workspaces, ordered by name.
    pub async fn list_workspaces(&self, ctx: &OpContext) -> Result<Vec<WorkspaceRecord>> {
        let mut workspaces = ctx
            .call("metadata.list_workspaces", self.metadata.list_workspaces())
            .await?;
        workspaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workspaces)
    }

    /// Deletes an empty workspace.
    ///
    /// # Errors
    ///
    /// Returns `NotEmpty` while any folder, document or category remains in it.
    #[instrument(skip(self, ctx))]
    pub async fn delete_workspace(&self, ctx: &OpContext, id: Uuid) -> Result<()> {
        let workspace = self.workspace(ctx, id).await?;
        let entries = ctx
            .call("metadata.list", self.metadata.list_page(id, &KbPath::root(), false, None, 1))
            .await?;
        if !entries.is_empty() {
            return Err(Error::NotEmpty(format!("workspace '{}'", workspace.name)));
        }
        let categories = self.list_categories(ctx, id).await?;
        if !categories.is_empty() {
            return Err(Error::NotEmpty(format!(
                "workspace '{}' still has {} categor{}",
                workspace.name,
                categories.len(),
                if categories.len() == 1 { "y" } else { "ies" }
            )));
        }
        ctx.call("metadata.delete_workspace", self.metadata.delete_workspace(id))
            .await?;
        debug!("Deleted workspace '{}'", workspace.name);
        Ok(())
    }

    /// Creates a category in `workspace`. Names are unique per workspace, ignoring case.
    #[instrument(skip(self, ctx))]
    pub async fn create_category(&self, ctx: &OpContext, workspace: Uuid, name: &str) -> Result<CategoryRecord> {
        let name = validate_name(name)?;
        self.workspace(ctx, workspace).await?;
        self.ensure_category_name_free(ctx, workspace, name, None).await?;
        let record = CategoryRecord {
            id: Uuid::new_v4(),
            workspace_id: workspace,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        ctx.call("metadata.upsert_category", self.metadata.upsert_category(&record))
            .await?;
        Ok(record)
    }

    /// Categories of `workspace`, ordered by name.
    pub async fn list_categories(&self, ctx: &OpContext, workspace: Uuid) -> Result<Vec<CategoryRecord>> {
        let mut categories = ctx
            .call("metadata.list_categories", self.metadata.list_categories(workspace))
            .await?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    pub async fn category_by_name(&self, ctx: &OpContext, workspace: Uuid, name: &str) -> Result<CategoryRecord> {
        self.list_categories(ctx, workspace)
            .await?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::NotFound(format!("category '{}'", name.trim())))
    }

    #[instrument(skip(self, ctx))]
    pub async fn rename_category(&self, ctx: &OpContext, workspace: Uuid, id: Uuid, name: &str) -> Result<CategoryRecord> {
        let name = validate_name(name)?;
        let mut record = ctx
            .call("metadata.get_category", self.metadata.get_category(workspace, id))
            .await?;
        self.ensure_category_name_free(ctx, workspace, name, Some(id)).await?;
        record.name = name.to_string();
        ctx.call("metadata.upsert_category", self.metadata.upsert_category(&record))
            .await?;
        Ok(record)
    }

    /// Deletes a category. Documents that referenced it keep a stale id, which matches no
    /// category filter.
    pub async fn delete_category(&self, ctx: &OpContext, workspace: Uuid, id: Uuid) -> Result<()> {
        ctx.call("metadata.delete_category", self.metadata.delete_category(workspace, id))
            .await?;
        Ok(())
    }

    async fn ensure_category_name_free(
        &self,
        ctx: &OpContext,
        workspace: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<()> {
        let taken = self
            .list_categories(ctx, workspace)
            .await?
            .into_iter()
            .any(|c| c.name.eq_ignore_ascii_case(name) && Some(c.id) != except);
        if taken {
            return Err(Error::Conflict(format!("category '{}'", name)));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("name must not be blank".to_string()));
    }
    Ok(name)
}
