//! CLI entry point for sitewatch.

use anyhow::{Context, Result};
use clap::Parser;
use sitewatch_core::Database;
use sitewatch_core::store::Store;
use tracing::debug;

mod app;
mod cli;
mod commands;

use app::{config, terminal};
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    let no_color = terminal::should_disable_color(
        cli.no_color,
        terminal::no_color_env_requested(),
        terminal::is_dumb_terminal(),
    );
    terminal::init_tracing(terminal::default_log_level(cli.verbose, cli.quiet), no_color);
    debug!(?cli, "CLI arguments parsed");

    let loaded = config::load_default_file_config()?;
    if let Some(path) = &loaded.path {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file resolved");
    }

    let db_path = config::resolve_db_path(cli.db.as_deref(), loaded.config.as_ref())?;
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;
    let store = Store::new(db.clone());

    let result = run(&cli, &store, loaded.config.as_ref()).await;
    db.close().await;
    result
}

async fn run(cli: &Cli, store: &Store, file_config: Option<&config::FileConfig>) -> Result<()> {
    match &cli.command {
        Command::List(args) => commands::run_list_command(store, args).await,
        Command::Show(args) => commands::run_show_command(store, args.site_id).await,
        Command::Links(args) => commands::run_links_command(store, args.site_id).await,
        Command::Add(args) => commands::run_add_command(store, args.clone()).await,
        Command::Modify(args) => commands::run_modify_command(store, args.clone()).await,
        Command::Remove(args) => commands::run_remove_command(store, args.site_id).await,
        Command::Check(args) => {
            let settings = config::resolve_check_settings(args, file_config)?;
            debug!(?settings, "check settings resolved");
            let progress = terminal::progress_enabled(cli.quiet);
            commands::run_check_command(store, args.site_id, &settings, progress).await?;
            Ok(())
        }
    }
}
