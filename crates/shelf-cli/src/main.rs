//! shelf CLI
//!
//! Command-line interface for shelf, a reading list kept in SQLite.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shelf_core::{Config, Item, ListObserver, ReadingList, SqliteStore};

mod commands;
mod output;

use commands::item::ListFilter;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "shelf - a reading list on your own disk")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a URL to the reading list
    Add {
        /// URL to save
        url: String,
        /// Title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Short excerpt
        #[arg(short, long)]
        excerpt: Option<String>,
        /// Mark as favorite
        #[arg(short, long)]
        favorite: bool,
    },
    /// List items
    #[command(alias = "ls")]
    List {
        /// Only unread items
        #[arg(short, long)]
        unread: bool,
        /// Only favorites
        #[arg(short, long)]
        favorite: bool,
        /// Match specification as JSON, e.g. '[{"unread": true}, {"status": [2, 3]}]'
        #[arg(short, long = "where")]
        where_json: Option<String>,
        /// Field to sort by
        #[arg(short, long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Maximum number of items (defaults to page_size)
        #[arg(short, long, conflicts_with = "all")]
        limit: Option<usize>,
        /// Show every match
        #[arg(short, long)]
        all: bool,
    },
    /// Show item details
    Show {
        /// Item URL
        url: String,
    },
    /// Edit an item
    Edit {
        /// Item URL
        url: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// New excerpt
        #[arg(short, long)]
        excerpt: Option<String>,
        /// Set or clear the favorite flag
        #[arg(short, long)]
        favorite: Option<bool>,
    },
    /// Mark an item as read
    Read {
        /// Item URL
        url: String,
        /// Who read it
        #[arg(long)]
        by: Option<String>,
    },
    /// Delete an item
    #[command(alias = "rm")]
    Delete {
        /// Item URL
        url: String,
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
    /// Count matching items
    Count {
        /// Match specification as JSON
        #[arg(short, long = "where")]
        where_json: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, database, page_size)
        key: String,
        /// Configuration value
        value: String,
    },
}

/// Logs every list mutation
struct LogObserver;

impl ListObserver for LogObserver {
    fn on_item_added(&self, item: &Item) -> anyhow::Result<()> {
        info!(url = item.url(), "item added");
        Ok(())
    }

    fn on_item_updated(&self, item: &Item) -> anyhow::Result<()> {
        info!(url = item.url(), "item updated");
        Ok(())
    }

    fn on_item_deleted(&self, item: &Item) -> anyhow::Result<()> {
        info!(url = item.url(), "item deleted");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &output);
    }

    let config = Config::load().context("Failed to load configuration")?;
    let store = SqliteStore::open(config.sqlite_path())
        .with_context(|| format!("Failed to open database: {:?}", config.sqlite_path()))?;

    let list = ReadingList::new(store);
    list.add_listener(Arc::new(LogObserver));

    let result = run(cli.command, &list, &config, &output).await;
    list.destroy().await.context("Failed to close database")?;
    result
}

async fn run(command: Commands, list: &ReadingList, config: &Config, output: &Output) -> Result<()> {
    match command {
        Commands::Add {
            url,
            title,
            excerpt,
            favorite,
        } => commands::item::add(list, url, title, excerpt, favorite, output).await,
        Commands::List {
            unread,
            favorite,
            where_json,
            sort,
            desc,
            limit,
            all,
        } => {
            let filter = ListFilter {
                unread,
                favorite,
                where_json,
                sort,
                descending: desc,
                limit,
                all,
            };
            commands::item::list(list, filter, config.page_size, output).await
        }
        Commands::Show { url } => commands::item::show(list, url, output).await,
        Commands::Edit {
            url,
            title,
            excerpt,
            favorite,
        } => commands::item::edit(list, url, title, excerpt, favorite, output).await,
        Commands::Read { url, by } => commands::item::read(list, url, by, output).await,
        Commands::Delete { url, force } => commands::item::delete(list, url, force, output).await,
        Commands::Count { where_json } => commands::item::count(list, where_json, output).await,
        Commands::Config { .. } => unreachable!(), // Handled in main
    }
}

fn handle_config_command(command: Option<ConfigCommands>, output: &Output) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(output),
        Some(ConfigCommands::Set { key, value }) => commands::config::set(key, value, output),
    }
}

/// Install the stderr log subscriber
///
/// Without `-v`, the filter comes from `SHELF_LOG` and defaults to `warn`.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("SHELF_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("shelf_core=info,shelf_cli=info"),
        _ => EnvFilter::new("shelf_core=debug,shelf_cli=debug"),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
