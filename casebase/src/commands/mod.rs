use std::path::Path;

use anyhow::{Context, Result};
use casebase_core::path::KbPath;
use casebase_core::search::SearchFilters;
use casebase_core::storage::{DocumentRecord, Entry};
use console::style;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppContext;
use crate::cli::{
    CatArgs, CategoryArgs, CategoryCommands, IndexArgs, LsArgs, MkdirArgs, MvArgs, PutArgs, RmArgs,
    SearchArgs, TagArgs, WorkspaceArgs, WorkspaceCommands,
};

// --- Handler Functions ---

pub async fn handle_workspace(args: WorkspaceArgs, cx: &AppContext) -> Result<()> {
    match args.command {
        WorkspaceCommands::Create { name } => {
            let workspace = cx.catalog.create_workspace(&cx.ctx, &name).await?;
            println!("Created workspace '{}' ({})", workspace.name, style(workspace.id).dim());
        }
        WorkspaceCommands::List {} => {
            for workspace in cx.catalog.list_workspaces(&cx.ctx).await? {
                println!("{}  {}", workspace.name, style(workspace.id).dim());
            }
        }
        WorkspaceCommands::Delete { name } => {
            let workspace = cx.catalog.workspace_by_name(&cx.ctx, &name).await?;
            cx.catalog.delete_workspace(&cx.ctx, workspace.id).await?;
            println!("Deleted workspace '{}'", workspace.name);
        }
    }
    Ok(())
}

pub async fn handle_category(args: CategoryArgs, cx: &AppContext) -> Result<()> {
    let workspace = cx.workspace().await?;
    match args.command {
        CategoryCommands::Create { name } => {
            let category = cx.catalog.create_category(&cx.ctx, workspace.id, &name).await?;
            println!("Created category '{}'", category.name);
        }
        CategoryCommands::List {} => {
            for category in cx.catalog.list_categories(&cx.ctx, workspace.id).await? {
                println!("{}", category.name);
            }
        }
        CategoryCommands::Rename { name, new_name } => {
            let category = cx.catalog.category_by_name(&cx.ctx, workspace.id, &name).await?;
            let renamed = cx
                .catalog
                .rename_category(&cx.ctx, workspace.id, category.id, &new_name)
                .await?;
            println!("Renamed category '{}' to '{}'", category.name, renamed.name);
        }
        CategoryCommands::Delete { name } => {
            let category = cx.catalog.category_by_name(&cx.ctx, workspace.id, &name).await?;
            cx.catalog.delete_category(&cx.ctx, workspace.id, category.id).await?;
            println!("Deleted category '{}'", category.name);
        }
    }
    Ok(())
}

pub async fn handle_mkdir(args: MkdirArgs, cx: &AppContext) -> Result<()> {
    let kb = cx.coordinator().await?;
    let folder = if args.parents {
        kb.ensure_path(&cx.ctx, &args.path).await?
    } else {
        kb.create_folder(&cx.ctx, &args.path).await?
    };
    info!("Folder '{}' is ready", folder.path);
    Ok(())
}

pub async fn handle_put(args: PutArgs, cx: &AppContext) -> Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let dest = match args.dest {
        Some(dest) => dest,
        None => args
            .file
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .context("Cannot derive a document name from the file path; pass a destination")?,
    };
    let content_type = args.content_type.unwrap_or_else(|| guess_content_type(&args.file));

    let kb = cx.coordinator().await?;
    let mut document = kb.create_document(&cx.ctx, &dest, bytes, &content_type).await?;
    if !args.tag.is_empty() {
        document = kb.set_tags(&cx.ctx, &dest, &args.tag).await?;
    }
    if args.index {
        document = cx.indexer().await?.index_document(&cx.ctx, &dest).await?;
    }
    println!("{} ({} bytes, {})", document.path, document.size, document.content_type);
    Ok(())
}

pub async fn handle_cat(args: CatArgs, cx: &AppContext) -> Result<()> {
    let kb = cx.coordinator().await?;
    let (_, bytes) = kb.read_document(&cx.ctx, &args.path).await?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&bytes).await?;
    stdout.flush().await?;
    Ok(())
}

pub async fn handle_ls(args: LsArgs, cx: &AppContext) -> Result<()> {
    let kb = cx.coordinator().await?;
    if let Some(pattern) = &args.pattern {
        let documents = kb.find(&cx.ctx, &args.path, pattern, args.case_sensitive).await?;
        if documents.is_empty() {
            println!("No document names match '{}'.", pattern);
        }
        documents.iter().for_each(print_document);
        return Ok(());
    }
    for entry in kb.list(&cx.ctx, &args.path, args.recursive).await? {
        match entry {
            Entry::Folder(folder) => println!("{}/", style(&folder.path).blue().bold()),
            Entry::Document(document) => print_document(&document),
        }
    }
    Ok(())
}

fn print_document(document: &DocumentRecord) {
    let tags = document.tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    let indexed = if document.index_ref.is_some() { "indexed" } else { "" };
    println!(
        "{}  {}  {}  {}",
        document.path,
        style(format!("{} B", document.size)).dim(),
        style(tags).cyan(),
        style(indexed).dim()
    );
}

pub async fn handle_mv(args: MvArgs, cx: &AppContext) -> Result<()> {
    let kb = cx.coordinator().await?;
    let moved = kb.rename_or_move(&cx.ctx, &args.from, &args.to).await?;
    println!("{} -> {}", args.from, moved.path());
    Ok(())
}

pub async fn handle_rm(args: RmArgs, cx: &AppContext) -> Result<()> {
    let kb = cx.coordinator().await?;
    let doomed: Vec<Uuid> = match kb.get(&cx.ctx, &args.path).await? {
        Entry::Document(document) => vec![document.id],
        Entry::Folder(_) if args.recursive => kb
            .list(&cx.ctx, &args.path, true)
            .await?
            .iter()
            .filter_map(Entry::as_document)
            .filter(|document| document.index_ref.is_some())
            .map(|document| document.id)
            .collect(),
        Entry::Folder(_) => Vec::new(),
    };

    let summary = kb.delete(&cx.ctx, &args.path, args.recursive).await?;

    // Index entries of deleted documents are stale; search skips them, but drop them anyway.
    let indexer = cx.indexer().await?;
    for id in doomed {
        if let Err(e) = indexer.forget(&cx.ctx, id).await {
            warn!("Could not remove index entry {}: {}", id, e);
        }
    }
    println!(
        "Deleted {} folder(s), {} document(s) and {} blob(s)",
        summary.folders, summary.documents, summary.blobs
    );
    Ok(())
}

pub async fn handle_tag(args: TagArgs, cx: &AppContext) -> Result<()> {
    let kb = cx.coordinator().await?;
    let mut document = kb.set_tags(&cx.ctx, &args.path, &args.tags).await?;
    if let Some(name) = &args.category {
        let category = cx.catalog.category_by_name(&cx.ctx, kb.workspace_id(), name).await?;
        document = kb.set_category(&cx.ctx, &args.path, Some(category.id)).await?;
    } else if args.no_category {
        document = kb.set_category(&cx.ctx, &args.path, None).await?;
    }
    print_document(&document);
    Ok(())
}

pub async fn handle_index(args: IndexArgs, cx: &AppContext) -> Result<()> {
    let indexer = cx.indexer().await?;
    match args.path {
        Some(path) => {
            let document = indexer.index_document(&cx.ctx, &path).await?;
            println!("Indexed {}", document.path);
        }
        None => {
            let count = indexer.index_all(&cx.ctx).await?;
            println!("Indexed {} document(s)", count);
        }
    }
    Ok(())
}

pub async fn handle_search(args: SearchArgs, cx: &AppContext) -> Result<()> {
    let engine = cx.search_engine(args.case_sensitive).await?;

    let mut filters = SearchFilters::new();
    for tag in args.tag {
        filters = filters.with_tag(tag);
    }
    if let Some(name) = &args.category {
        let workspace = cx.workspace().await?;
        let category = cx.catalog.category_by_name(&cx.ctx, workspace.id, name).await?;
        filters = filters.with_category(category.id);
    }
    if let Some(under) = &args.under {
        let prefix: KbPath = under.parse()?;
        filters = filters.with_path_prefix(prefix);
    }

    let results = engine.search(&cx.ctx, &args.query, &filters, args.limit).await?;
    if results.is_empty() {
        println!("No matching documents.");
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:3}. {}  {}",
            rank + 1,
            style(&result.document.path).bold(),
            style(format!(
                "score {:.3} (similarity {:.3}, keywords {:.3})",
                result.score, result.normalized_similarity, result.keyword_score
            ))
            .dim()
        );
    }
    Ok(())
}

fn guess_content_type(file: &Path) -> String {
    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("txt") => mime::TEXT_PLAIN.to_string(),
        Some("md") => "text/markdown".to_string(),
        Some("csv") => mime::TEXT_CSV.to_string(),
        Some("html") | Some("htm") => mime::TEXT_HTML.to_string(),
        Some("json") => mime::APPLICATION_JSON.to_string(),
        Some("pdf") => mime::APPLICATION_PDF.to_string(),
        Some("png") => mime::IMAGE_PNG.to_string(),
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG.to_string(),
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}
