use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use tantivy::schema::document::Document;

use cinesync::index::IndexDoc;
use cinesync::{
    DocKind, Genre, Movie, Person, SearchIndex, Settings, Shutdown, SyncService, logging,
};

const CONFIG_FILE: &str = "cinesync.toml";

const CONFIG_TEMPLATE: &str = r#"# cinesync configuration
#
# Every value below can also be set through CS_-prefixed environment
# variables with double underscores between levels, e.g.
# CS_ETL__BATCH_SIZE=500.

[source]
# Path to the catalog database
db_path = "catalog.db"

[index]
# Directory holding one search index per document kind
root = ".cinesync/index"

[etl]
# Seconds to sleep between change-detection cycles
interval_secs = 60
# Maximum ids per page throughout the pipeline
batch_size = 100
# Persisted watermark file
state_path = ".cinesync/state.json"

[backoff]
base_ms = 500
factor = 2
max_delay_ms = 60000
max_attempts = 8

[logging]
default = "info"
"#;

#[derive(Parser)]
#[command(name = "cinesync")]
#[command(about = "Incremental synchronizer from a relational movie catalog into search indexes")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Run the sync loop
    Sync {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Query a target index
    Search {
        /// Index to query: movies, genres, or persons
        index: DocKind,

        /// Free-text query
        query: String,

        /// Maximum number of hits
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the resolved configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = &cli.command {
        return cmd_init(*force);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Settings::load().context("failed to load configuration")?,
    };
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Sync { once } => cmd_sync(settings, once),
        Commands::Search {
            index,
            query,
            limit,
        } => cmd_search(settings, index, &query, limit),
        Commands::Config => cmd_config(&settings),
    }
}

fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() && !force {
        anyhow::bail!("{CONFIG_FILE} already exists (use --force to overwrite)");
    }
    std::fs::write(&path, CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write {CONFIG_FILE}"))?;
    println!("Wrote {CONFIG_FILE}");
    Ok(())
}

fn cmd_sync(settings: Settings, once: bool) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone())?;

    let service = SyncService::new(settings, shutdown);
    if once {
        let stats = service.run_once().context("sync cycle failed")?;
        println!(
            "Cycle complete: {} change pages, {} documents upserted",
            stats.pages, stats.documents
        );
    } else {
        service.run().context("sync loop failed")?;
    }
    Ok(())
}

fn cmd_search(settings: Settings, kind: DocKind, query: &str, limit: usize) -> anyhow::Result<()> {
    let root = &settings.index.root;
    match kind {
        DocKind::Movies => print_hits::<Movie>(root, query, limit),
        DocKind::Genres => print_hits::<Genre>(root, query, limit),
        DocKind::Persons => print_hits::<Person>(root, query, limit),
    }
}

fn print_hits<D: IndexDoc>(
    root: &std::path::Path,
    query: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let index = SearchIndex::<D>::open(root)
        .with_context(|| format!("failed to open {} index", D::KIND))?;
    let hits = index.search(query, limit)?;
    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }
    for (score, doc) in hits {
        let named = doc.to_named_doc(index.schema());
        println!("{score:.3}\t{}", serde_json::to_string(&named)?);
    }
    Ok(())
}

fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}

/// Flips the shutdown flag on Ctrl-C; the loop finishes its current page
/// before exiting so watermark state stays consistent.
fn spawn_signal_listener(shutdown: Shutdown) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received; stopping after the current page");
                    shutdown.request();
                }
            });
        })
        .context("failed to spawn signal listener")?;
    Ok(())
}
