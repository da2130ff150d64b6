//! # Package indexer CLI (`pkg-index`)
//!
//! Builds the package search index from a repository dump.
//!
//! ```bash
//! # Index the repository described by the config file
//! pkg-index --config ./indexer.toml index
//!
//! # Write the index somewhere else
//! pkg-index --config ./indexer.toml index --index /srv/search/packages
//!
//! # Print the index field schema
//! pkg-index schema
//! ```

use clap::{Parser, Subcommand};
use package_indexer::index::index_schema;
use package_indexer::{index_repository, load_config};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Package indexer: a weighted full-text catalog of distribution packages.
#[derive(Parser)]
#[command(name = "pkg-index", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./indexer.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the configured repository once and report the document count.
    Index {
        /// Destination index directory, overriding `[index] path`.
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Print the index field schema as JSON.
    Schema,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Index { index } => {
            let mut config = load_config(&cli.config)?;
            if let Some(index) = index {
                config.index.path = index;
            }
            info!(index = %config.index.path.display(), "Indexing repository");

            let report = index_repository(&config).await?;
            if report.failed > 0 {
                info!(failed = report.failed, "Some packages could not be indexed");
            }
            println!("Indexed {} packages", report.documents);
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&index_schema())?);
        }
    }
    Ok(())
}
