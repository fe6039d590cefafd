//! MosaicDB Inspector
//!
//! Prints the schema and the fragments of an array on the local disk.

use clap::{Parser, Subcommand};
use mosaicdb::{Config, StorageManager};
use tracing_subscriber::{fmt, EnvFilter};

/// MosaicDB array inspector
#[derive(Parser, Debug)]
#[command(name = "mosaic-inspect")]
#[command(about = "Inspect MosaicDB arrays")]
#[command(version)]
struct Args {
    /// Skip checksum verification when loading metadata
    #[arg(long)]
    no_verify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the array schema
    Schema {
        /// Array directory
        uri: String,
    },

    /// List the visible fragments, oldest first
    Fragments {
        /// Array directory
        uri: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mosaicdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let config = match Config::builder().verify_checksums(!args.no_verify).build() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    let manager = StorageManager::local(config);

    if let Err(e) = run(&manager, &args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(manager: &StorageManager, command: &Commands) -> mosaicdb::Result<()> {
    match command {
        Commands::Schema { uri } => {
            let array = manager.array_open(uri)?;
            print!("{}", array.schema());
        }
        Commands::Fragments { uri } => {
            let array = manager.array_open(uri)?;
            let fragments = array.fragment_metadata()?;
            println!("{} fragment(s)", fragments.len());
            for metadata in fragments {
                println!(
                    "{}  {}  cells={}  tiles={}  domain={}  timestamp_ms={}",
                    metadata.name(),
                    if metadata.dense() { "dense" } else { "sparse" },
                    metadata.cell_num(),
                    metadata.tile_num(),
                    array.schema().rect_string(metadata.non_empty_domain()),
                    metadata.timestamp_ms(),
                );
            }
        }
    }
    Ok(())
}
