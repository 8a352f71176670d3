//! Overwatch CLI
//!
//! Audits replication across a CouchDB hub and its spokes.
//!
//! # Commands
//!
//! - `watch` - Follow every database on every node and report replication
//!   that does not arrive in time
//! - `version` - Show version information

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::config::{FileConfig, Overrides};
use commands::output::Format;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CouchDB replication auditor.
#[derive(Parser)]
#[command(name = "overwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit replication until interrupted
    Watch {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Add a spoke
        #[arg(long = "couch", value_name = "URL")]
        couches: Vec<String>,

        /// Add the hub
        #[arg(long, value_name = "URL")]
        hub: Option<String>,

        /// Add a spoke that only receives changes
        #[arg(long = "pull-only", value_name = "URL")]
        pull_only: Vec<String>,

        /// Audit this database instead of every database on the hub
        #[arg(long = "db", value_name = "NAME")]
        dbs: Vec<String>,

        /// Skip this database
        #[arg(long, value_name = "NAME")]
        exclude: Vec<String>,

        /// Fulfillment timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the events.
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
        Commands::Watch {
            config,
            couches,
            hub,
            pull_only,
            dbs,
            exclude,
            timeout_ms,
            format,
        } => {
            let file = match &config {
                Some(path) => FileConfig::load(path)?,
                None => FileConfig::default(),
            };
            let overrides = Overrides {
                couches,
                hub,
                pull_only,
                dbs,
                exclude,
                timeout_ms,
            };
            let stats = commands::watch::run(file.into_audit_config(overrides), format).await?;
            info!(
                changes = stats.changes_processed,
                expectations = stats.expectations_set,
                fulfilled = stats.fulfilled,
                false_positives = stats.false_positives,
                unfulfilled = stats.unfulfilled,
                errors = stats.errors,
                "audit summary"
            );
        }
        Commands::Version => {
            println!("Overwatch CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Overwatch Core v{}", overwatch_core::VERSION);
        }
    }

    Ok(())
}
