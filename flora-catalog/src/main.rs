//! flora-catalog - command-line front end
//!
//! Thin driver over the catalog library: searches, lookups, favorites and
//! cache maintenance, printing JSON to stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flora_catalog::{
    Catalog, CatalogConfig, FavoritesStore, Kingdom, KeyValueStore, SearchOptions, SqliteStore,
};
use flora_common::config::{config_file_path, database_path, load_or_default, RootFolderResolver};
use serde::Serialize;
use tracing::info;

/// Command-line arguments for flora-catalog
#[derive(Parser, Debug)]
#[command(name = "flora-catalog")]
#[command(about = "Plant and fungi catalog aggregating several public databases")]
#[command(version)]
struct Args {
    /// Root folder holding the local database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to FLORA_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search every enabled source
    Search {
        /// Free text; omit to browse
        query: Vec<String>,

        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Restrict to plantae or fungi
        #[arg(long)]
        kingdom: Option<Kingdom>,

        /// Deduplicate across sources instead of listing per source
        #[arg(long)]
        merged: bool,
    },

    /// Show one record by id (e.g. perenual-1, inat-47170)
    Show { id: String },

    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Manage the local response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum FavoritesAction {
    List,
    /// Look the record up and add it
    Add { id: String },
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove cached entries (favorites are kept)
    Clear {
        /// Only keys starting with this prefix, e.g. "species_" or "search_"
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(config_file_path);
    let toml_config = load_or_default(config_path.as_deref());

    flora_common::logging::init_tracing(&toml_config.logging)
        .context("Failed to initialize logging")?;

    let root_folder = RootFolderResolver::new(&toml_config).resolve(args.root_folder.as_deref());
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let store: Arc<dyn KeyValueStore> = Arc::new(
        SqliteStore::open(&db_path)
            .await
            .context("Failed to open local database")?,
    );

    let config = CatalogConfig::from_toml(&toml_config).context("Invalid source configuration")?;
    let catalog = Catalog::from_config(config, store.clone()).context("Failed to build source clients")?;

    match args.command {
        Command::Search {
            query,
            page,
            kingdom,
            merged,
        } => {
            let query = query.join(" ");
            let options = SearchOptions { page, kingdom };
            if merged {
                print_json(&catalog.search_merged(&query, &options).await)?;
            } else {
                print_json(&catalog.search(&query, &options).await)?;
            }
        }
        Command::Show { id } => {
            let record = catalog
                .fetch_by_id(&id)
                .await
                .with_context(|| format!("Could not load {}", id))?;
            print_json(&record)?;
        }
        Command::Favorites { action } => {
            let favorites = FavoritesStore::new(store);
            match action {
                FavoritesAction::List => print_json(&favorites.list().await?)?,
                FavoritesAction::Add { id } => {
                    let record = catalog
                        .fetch_by_id(&id)
                        .await
                        .with_context(|| format!("Could not load {}", id))?;
                    let added = favorites.add(record).await?;
                    print_json(&serde_json::json!({ "id": id, "added": added }))?;
                }
                FavoritesAction::Remove { id } => {
                    let removed = favorites.remove(&id).await?;
                    print_json(&serde_json::json!({ "id": id, "removed": removed }))?;
                }
            }
        }
        Command::Cache {
            action: CacheAction::Clear { prefix },
        } => {
            let removed = catalog.cache().clear(prefix.as_deref()).await?;
            info!(removed, prefix = ?prefix, "Cache cleared");
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}
