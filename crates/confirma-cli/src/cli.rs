//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Confirma - Match bank confirmations against your trades
#[derive(Parser)]
#[command(name = "confirma")]
#[command(about = "Trade confirmation matching, settlement rules and automation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "confirma.db", global = true)]
    pub db: PathBuf,

    /// Engine configuration override (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Client whose data the command works on
    #[arg(long, default_value = "default", global = true)]
    pub client: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CONFIRMA_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage trades
    Trades {
        #[command(subcommand)]
        action: Option<TradesAction>,
    },

    /// Manage confirmations
    Confirmations {
        #[command(subcommand)]
        action: Option<ConfirmationsAction>,
    },

    /// Match a confirmation, or every open one with --all
    Match {
        /// Confirmation ID
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        confirmation_id: Option<i64>,

        /// Match all pending and unrecognized confirmations
        #[arg(long)]
        all: bool,
    },

    /// Review and reverse matches
    Matches {
        #[command(subcommand)]
        action: Option<MatchesAction>,
    },

    /// Manage settlement rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Show or change automation settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },

    /// List or cancel scheduled actions
    Actions {
        #[command(subcommand)]
        action: Option<ActionsAction>,
    },

    /// Fire every due scheduled action once
    Sweep,

    /// Show the client's audit trail
    Audit {
        /// Only entries with this action (e.g. match, action_fired)
        #[arg(short, long)]
        action: Option<String>,

        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Do not run the automation sweeper in this process
        #[arg(long)]
        no_sweeper: bool,
    },
}

#[derive(Subcommand)]
pub enum TradesAction {
    /// List trades
    List {
        /// Filter by status (unmatched, matched, disputed, confirmed, rejected)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Add trades from a JSON file (one object or an array)
    Add {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Close a matched or disputed trade
    Close {
        /// Trade ID
        id: i64,
        /// Terminal status: confirmed or rejected
        #[arg(short, long)]
        status: String,
    },
}

#[derive(Subcommand)]
pub enum ConfirmationsAction {
    /// List confirmations
    List {
        /// Filter by status (pending, matched, duplicate, unrecognized)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Ingest confirmations from a JSON file (one object or an array)
    Ingest {
        #[arg(short, long)]
        file: PathBuf,
        /// Match each confirmation right after ingesting it
        #[arg(long = "match")]
        auto_match: bool,
    },
}

#[derive(Subcommand)]
pub enum MatchesAction {
    /// List matches
    List {
        /// Include reversed matches
        #[arg(long)]
        all: bool,
    },
    /// Show a match with its field-by-field discrepancy report
    Show {
        /// Match ID
        id: i64,
    },
    /// Reverse a match and cancel its pending actions
    Reverse {
        /// Match ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules in priority order
    List,
    /// Add rules from a JSON file (one object or an array)
    Add {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Replace a rule with the JSON object in a file
    Update {
        /// Rule ID
        id: i64,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete a rule
    Delete {
        /// Rule ID
        id: i64,
    },
    /// Set the full priority order, highest first
    Reorder {
        /// Every rule ID of the client
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Show which accounts a trade settles to
    Resolve {
        /// Trade ID
        trade_id: i64,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show automation settings
    Show,
    /// Change automation settings
    Set {
        /// Automatically confirm matches classified as confirmed
        #[arg(long)]
        auto_confirm: Option<bool>,
        /// Minutes to wait before confirming
        #[arg(long)]
        confirm_delay: Option<i64>,
        /// Automatically dispute matches classified as disputed
        #[arg(long)]
        auto_dispute: Option<bool>,
        /// Minutes to wait before disputing
        #[arg(long)]
        dispute_delay: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum ActionsAction {
    /// List scheduled actions
    List {
        /// Filter by state (scheduled, fired, canceled)
        #[arg(short, long)]
        state: Option<String>,
    },
    /// Cancel a scheduled action
    Cancel {
        /// Action ID
        id: i64,
    },
}
