use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Casebase: organize and search a legal knowledge base.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the metadata snapshot, the vector index and the blobs.
    #[arg(long, global = true, env = "CASEBASE_DATA_DIR", default_value = ".casebase")]
    pub data_dir: PathBuf,

    /// JSON configuration file. Defaults to `config.json` in the data directory.
    #[arg(long, global = true, env = "CASEBASE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace to operate on. May be omitted when only one workspace exists.
    #[arg(long, short, global = true, env = "CASEBASE_WORKSPACE")]
    pub workspace: Option<String>,

    /// Increase verbosity (use multiple times for more).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage workspaces.
    Workspace(WorkspaceArgs),
    /// Manage the categories of a workspace.
    Category(CategoryArgs),
    /// Create a folder.
    Mkdir(MkdirArgs),
    /// Upload a local file as a document.
    Put(PutArgs),
    /// Write a document's content to stdout.
    Cat(CatArgs),
    /// List a folder.
    Ls(LsArgs),
    /// Rename or move a document or folder.
    Mv(MvArgs),
    /// Delete a document or folder.
    Rm(RmArgs),
    /// Replace the tags (and optionally the category) of a document.
    Tag(TagArgs),
    /// Add documents to the search index.
    Index(IndexArgs),
    /// Search the workspace.
    Search(SearchArgs),
}

#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub command: WorkspaceCommands,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommands {
    /// Create a new workspace.
    Create {
        name: String,
    },
    /// List all workspaces.
    List {},
    /// Delete an empty workspace.
    Delete {
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct CategoryArgs {
    #[command(subcommand)]
    pub command: CategoryCommands,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommands {
    Create { name: String },
    List {},
    Rename { name: String, new_name: String },
    Delete { name: String },
}

#[derive(Args, Debug)]
pub struct MkdirArgs {
    pub path: String,

    /// Create missing parent folders as well.
    #[arg(short, long)]
    pub parents: bool,
}

#[derive(Args, Debug)]
pub struct PutArgs {
    /// Local file to upload.
    pub file: PathBuf,

    /// Destination path in the knowledge base. Defaults to the file name at the root.
    pub dest: Option<String>,

    /// Content type; guessed from the file extension when omitted.
    #[arg(long)]
    pub content_type: Option<String>,

    /// Tags to attach to the new document.
    #[arg(long, short)]
    pub tag: Vec<String>,

    /// Index the document for search right away.
    #[arg(long)]
    pub index: bool,
}

#[derive(Args, Debug)]
pub struct CatArgs {
    pub path: String,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Folder to list. Defaults to the workspace root.
    #[arg(default_value = "")]
    pub path: String,

    /// List the whole subtree.
    #[arg(short, long)]
    pub recursive: bool,

    /// Only documents below the folder whose file name contains this text.
    #[arg(long = "match", short = 'm', value_name = "TEXT")]
    pub pattern: Option<String>,

    /// Match file names with exact case.
    #[arg(long, requires = "pattern")]
    pub case_sensitive: bool,
}

#[derive(Args, Debug)]
pub struct MvArgs {
    pub from: String,
    pub to: String,
}

#[derive(Args, Debug)]
pub struct RmArgs {
    pub path: String,

    /// Delete a folder together with its contents.
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args, Debug)]
pub struct TagArgs {
    pub path: String,

    /// New tag set. Pass no tags to clear them.
    pub tags: Vec<String>,

    /// Category name to assign.
    #[arg(long, conflicts_with = "no_category")]
    pub category: Option<String>,

    /// Remove the document's category.
    #[arg(long)]
    pub no_category: bool,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Document to index. Indexes every document when omitted.
    pub path: Option<String>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// The search query.
    #[arg(required = true)]
    pub query: String,

    /// Number of results to return.
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,

    /// Only documents carrying this tag (repeatable; all must match).
    #[arg(long, short)]
    pub tag: Vec<String>,

    /// Only documents in this category.
    #[arg(long)]
    pub category: Option<String>,

    /// Only documents at or below this folder.
    #[arg(long)]
    pub under: Option<String>,

    /// Match file-name keywords with exact case.
    #[arg(long)]
    pub case_sensitive: bool,
}
