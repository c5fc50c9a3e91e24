use anyhow::Result;
use casebase::cli::{Cli, Commands};
use casebase::{AppContext, commands};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let cx = AppContext::open(&cli.data_dir, cli.config.as_deref(), cli.workspace.clone()).await?;

    // Multi-step operations stop between steps and report what they completed.
    let token = cx.ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            token.cancel();
        }
    });

    match cli.command {
        Commands::Workspace(args) => commands::handle_workspace(args, &cx).await?,
        Commands::Category(args) => commands::handle_category(args, &cx).await?,
        Commands::Mkdir(args) => commands::handle_mkdir(args, &cx).await?,
        Commands::Put(args) => commands::handle_put(args, &cx).await?,
        Commands::Cat(args) => commands::handle_cat(args, &cx).await?,
        Commands::Ls(args) => commands::handle_ls(args, &cx).await?,
        Commands::Mv(args) => commands::handle_mv(args, &cx).await?,
        Commands::Rm(args) => commands::handle_rm(args, &cx).await?,
        Commands::Tag(args) => commands::handle_tag(args, &cx).await?,
        Commands::Index(args) => commands::handle_index(args, &cx).await?,
        Commands::Search(args) => commands::handle_search(args, &cx).await?,
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the level follows `-v` and `--quiet`.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
