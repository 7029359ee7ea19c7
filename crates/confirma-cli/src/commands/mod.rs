//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config, JSON input files)
//! - `trades` - Trade commands (list, add, close)
//! - `confirmations` - Confirmation ingestion and matching
//! - `matches` - Match review and reversal
//! - `rules` - Settlement rule management and account resolution
//! - `automation` - Settings, scheduled actions and sweeps
//! - `audit` - Audit log
//! - `serve` - Web server command

pub mod audit;
pub mod automation;
pub mod confirmations;
pub mod core;
pub mod matches;
pub mod rules;
pub mod serve;
pub mod trades;

// Re-export command functions for main.rs
pub use audit::*;
pub use automation::*;
pub use confirmations::*;
pub use core::*;
pub use matches::*;
pub use rules::*;
pub use serve::*;
pub use trades::*;

/// Actor recorded in the audit log for CLI mutations
pub const CLI_ACTOR: &str = "cli";

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
