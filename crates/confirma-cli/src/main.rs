//! Confirma CLI - Trade confirmation matching
//!
//! Usage:
//!   confirma init                               Initialize database
//!   confirma --client acme trades add --file t.json
//!   confirma --client acme confirmations ingest --file c.json --match
//!   confirma --client acme match --all          Match every open confirmation
//!   confirma serve --port 3000                  Start web server and sweeper

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    if let Commands::Init = cli.command {
        return commands::cmd_init(&cli.db, cli.no_encrypt);
    }

    let config = commands::load_config(cli.config.as_deref())?;
    let client = cli.client.as_str();

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Serve {
            port,
            host,
            no_sweeper,
        } => commands::cmd_serve(&cli.db, &host, port, cli.no_encrypt, config, no_sweeper).await,
        Commands::Trades { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_trades_list(&db, client, None),
                Some(TradesAction::List { status }) => {
                    commands::cmd_trades_list(&db, client, status.as_deref())
                }
                Some(TradesAction::Add { file }) => commands::cmd_trades_add(&db, client, &file),
                Some(TradesAction::Close { id, status }) => {
                    commands::cmd_trades_close(&db, client, id, &status)
                }
            }
        }
        Commands::Confirmations { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_confirmations_list(&db, client, None),
                Some(ConfirmationsAction::List { status }) => {
                    commands::cmd_confirmations_list(&db, client, status.as_deref())
                }
                Some(ConfirmationsAction::Ingest { file, auto_match }) => {
                    commands::cmd_confirmations_ingest(&db, &config, client, &file, auto_match)
                }
            }
        }
        Commands::Match {
            confirmation_id,
            all,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match (confirmation_id, all) {
                (Some(id), false) => commands::cmd_match(&db, &config, client, id),
                _ => commands::cmd_match_all(&db, &config, client),
            }
        }
        Commands::Matches { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_matches_list(&db, client, false),
                Some(MatchesAction::List { all }) => commands::cmd_matches_list(&db, client, all),
                Some(MatchesAction::Show { id }) => {
                    commands::cmd_matches_show(&db, &config, client, id)
                }
                Some(MatchesAction::Reverse { id }) => {
                    commands::cmd_matches_reverse(&db, &config, client, id)
                }
            }
        }
        Commands::Rules { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(RulesAction::List) => commands::cmd_rules_list(&db, client),
                Some(RulesAction::Add { file }) => commands::cmd_rules_add(&db, client, &file),
                Some(RulesAction::Update { id, file }) => {
                    commands::cmd_rules_update(&db, client, id, &file)
                }
                Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, client, id),
                Some(RulesAction::Reorder { ids }) => {
                    commands::cmd_rules_reorder(&db, client, &ids)
                }
                Some(RulesAction::Resolve { trade_id }) => {
                    commands::cmd_rules_resolve(&db, &config, client, trade_id)
                }
            }
        }
        Commands::Settings { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(SettingsAction::Show) => commands::cmd_settings_show(&db, client),
                Some(SettingsAction::Set {
                    auto_confirm,
                    confirm_delay,
                    auto_dispute,
                    dispute_delay,
                }) => {
                    let update = confirma_core::models::AutomationSettingsUpdate {
                        auto_confirm_enabled: auto_confirm,
                        confirm_delay_minutes: confirm_delay,
                        auto_dispute_enabled: auto_dispute,
                        dispute_delay_minutes: dispute_delay,
                    };
                    commands::cmd_settings_set(&db, &config, client, &update)
                }
            }
        }
        Commands::Actions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_actions_list(&db, client, None),
                Some(ActionsAction::List { state }) => {
                    commands::cmd_actions_list(&db, client, state.as_deref())
                }
                Some(ActionsAction::Cancel { id }) => commands::cmd_actions_cancel(&db, client, id),
            }
        }
        Commands::Sweep => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_sweep(&db).await
        }
        Commands::Audit { action, limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, client, action.as_deref(), limit)
        }
    }
}
