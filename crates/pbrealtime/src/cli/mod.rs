//! Command-line interface for pbrealtime.
//!
//! This module provides the CLI structure for the `pbrt` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ListCommand, ToggleCommand, WatchCommand};

/// pbrt - Watch a PocketBase collection in realtime
///
/// Logs in, loads the collection, and keeps it in sync with server-sent
/// change events.
#[derive(Debug, Parser)]
#[command(name = "pbrt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Login identity (overrides configuration)
    #[arg(short, long, global = true, value_name = "EMAIL")]
    pub identity: Option<String>,

    /// Login password (overrides configuration)
    #[arg(short, long, global = true)]
    pub password: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the current records
    List(ListCommand),

    /// Follow the collection until interrupted
    Watch(WatchCommand),

    /// Flip the done flag of a record
    Toggle(ToggleCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }

    /// Resolve login credentials, preferring flags over configuration.
    #[must_use]
    pub fn credentials<'a>(&'a self, config: &'a crate::Config) -> Option<(&'a str, &'a str)> {
        let identity = self
            .identity
            .as_deref()
            .or(config.auth.identity.as_deref())?;
        let password = self
            .password
            .as_deref()
            .or(config.auth.password.as_deref())?;
        Some((identity, password))
    }
}
