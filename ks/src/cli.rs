//! CLI argument parsing for keyset

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ks")]
#[command(author, version, about = "Inspect and maintain a persisted key set", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Key set file (overrides the configured store path)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List stored keys
    List {
        /// Include the time each key was added
        #[arg(short, long)]
        long: bool,
    },

    /// Add one or more keys
    Add {
        /// Keys to add
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Check whether a key is stored (exit code 1 if not)
    Contains {
        /// Key to look up
        #[arg(required = true)]
        key: String,
    },

    /// Print the number of stored keys
    Count,

    /// Remove every key
    Clear {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}
