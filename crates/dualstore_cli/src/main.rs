//! dualstore CLI
//!
//! Command-line tools for offline-first record journals.
//!
//! # Commands
//!
//! - `inspect` - Display journal size and record counts per status
//! - `delayed` - List records awaiting remote replay
//! - `compact` - Rewrite the journal as a single snapshot

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// dualstore journal tools.
#[derive(Parser)]
#[command(name = "dualstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal file
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
    /// Display journal size and record counts per status
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List records whose last remote write failed
    Delayed {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite the journal as a single snapshot
    Compact,

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
            let path = cli.path.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Delayed { format } => {
            let path = cli.path.ok_or("Journal path required for delayed")?;
            commands::delayed::run(&path, &format)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Journal path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("dualstore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("dualstore core v{}", dualstore_core::VERSION);
        }
    }

    Ok(())
}
