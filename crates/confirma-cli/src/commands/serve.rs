//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};

use confirma_core::EngineConfig;
use confirma_server::ServerConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_encrypt: bool,
    engine: EngineConfig,
    no_sweeper: bool,
) -> Result<()> {
    println!("🚀 Starting Confirma web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Matching: floor {}%, auto-confirm {}%",
        engine.matching.match_floor, engine.matching.auto_confirm_floor
    );
    if no_sweeper {
        println!("   ⚠️  Automation sweeper DISABLED - scheduled actions will not fire here");
    } else {
        println!(
            "   ⏰ Automation sweeper: every {}s",
            engine.automation.sweep_interval_secs
        );
    }
    println!();

    let db = open_db(db_path, no_encrypt)?;
    let config = ServerConfig {
        engine,
        run_sweeper: !no_sweeper,
    };

    confirma_server::serve_with_config(db, host, port, config)
        .await
        .context("Server error")
}
