//! SyncDB CLI
//!
//! Command-line tools for SyncDB collection directories.
//!
//! # Commands
//!
//! - `inspect` - Display collection statistics and digest
//! - `verify` - Verify journal log integrity
//! - `compact` - Rewrite the journal log as one snapshot transaction
//! - `dump-journal` - Dump journal records for debugging
//! - `export` - Print the full snapshot as JSON

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SyncDB command-line collection tools.
#[derive(Parser)]
#[command(name = "syncdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the collection directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display collection statistics and digest
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal log integrity
    Verify,

    /// Rewrite the journal log as one snapshot transaction
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump journal records for debugging
    DumpJournal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip records before this byte offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print every journal entry joined with its row as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Collection path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Collection path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Collection path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::DumpJournal {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("Collection path required for dump-journal")?;
            commands::dump_journal::run(&path, limit, offset, &format)?;
        }
        Commands::Export { output } => {
            let path = cli.path.ok_or("Collection path required for export")?;
            commands::export::run(&path, output.as_deref())?;
        }
        Commands::Version => {
            println!("SyncDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Journal format v{}",
                syncdb_core::journal::JOURNAL_VERSION
            );
        }
    }

    Ok(())
}
