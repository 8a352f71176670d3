//! CLI errors.

use overwatch_core::OverwatchError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// The config file could not be read.
    #[error("cannot read config {}: {source}", .path.display())]
    ReadConfig {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid.
    #[error("invalid config {}: {source}", .path.display())]
    ParseConfig {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The audit failed.
    #[error(transparent)]
    Audit(#[from] OverwatchError),
}
