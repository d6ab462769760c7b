//! partidx CLI
//!
//! Command-line tools for partitioned collection indexes.
//!
//! # Commands
//!
//! - `inspect` - Display partition files and index statistics
//! - `verify` - Read every collection through the self-healing path
//! - `rebuild` - Regenerate the location index from the partition files
//! - `demo` - Fill a fresh index with sample data

mod commands;

use clap::{Parser, Subcommand};
use commands::Geometry;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// partidx command-line index tools.
#[derive(Parser)]
#[command(name = "partidx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the index files
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// File name prefix of the index
    #[arg(global = true, long, default_value = "index")]
    prefix: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(flatten)]
    geometry: Geometry,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display partition files and index statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Read every collection and report the repairs that were needed
    Verify,

    /// Delete the location index and regenerate it from the partition files
    Rebuild,

    /// Write sample collections into a fresh index
    Demo {
        /// Number of extra keys to write
        #[arg(short, long, default_value = "1000")]
        keys: usize,

        /// Largest number of elements merged into one key
        #[arg(short, long, default_value = "40")]
        max_elements: usize,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Index path required for inspect")?;
            commands::inspect::run(&path, &cli.prefix, &cli.geometry, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Index path required for verify")?;
            commands::verify::run(&path, &cli.prefix, &cli.geometry)?;
        }
        Commands::Rebuild => {
            let path = cli.path.ok_or("Index path required for rebuild")?;
            commands::rebuild::run(&path, &cli.prefix, &cli.geometry)?;
        }
        Commands::Demo { keys, max_elements } => {
            let path = cli.path.ok_or("Index path required for demo")?;
            commands::demo::run(&path, &cli.prefix, &cli.geometry, keys, max_elements)?;
        }
        Commands::Version => {
            println!("partidx CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("partidx core v{}", partidx_core::VERSION);
        }
    }

    Ok(())
}
