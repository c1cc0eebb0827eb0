//! Command-line interface for onevoneme.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 1v1me - queue up and play tic-tac-toe or rock-paper-scissors
#[derive(Parser, Debug)]
#[command(name = "onevoneme")]
#[command(about = "Terminal client for 1v1me matches", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backend API root (overrides config and ONEVONEME_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a username and remember it
    Register {
        /// Desired username (3-32 letters, digits, '_' or '-')
        name: String,
    },

    /// Show the remembered username
    Whoami,

    /// Forget the remembered username
    Logout,

    /// Check that the backend is up
    Health,

    /// Show players ranked by wins
    Leaderboard {
        /// Maximum rows to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Queue for a match and play it
    Play {
        /// Register and play as this name instead of the remembered one
        #[arg(long)]
        name: Option<String>,
    },
}
