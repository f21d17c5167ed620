//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Print each store change instead of the whole list
    #[arg(long)]
    pub changes: bool,
}

/// Toggle command arguments.
#[derive(Debug, Args)]
pub struct ToggleCommand {
    /// Id of the record to toggle
    pub id: String,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        file: Option<PathBuf>,
    },
}
