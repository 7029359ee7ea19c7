//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use confirma_core::db::Database;
use confirma_core::models::{
    ActionState, AutomationSettingsUpdate, ConfirmationStatus, DirectionFilter, NewTrade,
    TradeStatus,
};
use confirma_core::test_utils::{
    ingest, insert_trade, physical_rule, sample_confirmation_fields, sample_trade_fields, setup_db,
    CLIENT,
};
use confirma_core::{EngineConfig, MockNotifier};
use serde_json::json;
use tempfile::NamedTempFile;

use crate::cli::{Cli, Commands, RulesAction};
use crate::commands::{self, read_json_file, truncate, CLI_ACTOR};

fn json_file(value: serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", value).unwrap();
    file
}

fn config() -> EngineConfig {
    EngineConfig::default()
}

fn enable_auto_confirm(db: &Database, delay: i64) {
    let update = AutomationSettingsUpdate {
        auto_confirm_enabled: Some(true),
        confirm_delay_minutes: Some(delay),
        ..Default::default()
    };
    commands::cmd_settings_set(db, &config(), CLIENT, &update).unwrap();
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_match_all() {
    let cli = Cli::try_parse_from(["confirma", "--client", "acme", "match", "--all"]).unwrap();
    assert_eq!(cli.client, "acme");
    assert!(matches!(
        cli.command,
        Commands::Match {
            confirmation_id: None,
            all: true
        }
    ));
}

#[test]
fn test_parse_match_requires_id_or_all() {
    assert!(Cli::try_parse_from(["confirma", "match"]).is_err());
    assert!(Cli::try_parse_from(["confirma", "match", "3", "--all"]).is_err());
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "confirma",
        "rules",
        "reorder",
        "3",
        "1",
        "2",
        "--no-encrypt",
        "--db",
        "test.db",
    ])
    .unwrap();
    assert!(cli.no_encrypt);
    assert_eq!(cli.db.to_str(), Some("test.db"));
    match cli.command {
        Commands::Rules {
            action: Some(RulesAction::Reorder { ids }),
        } => assert_eq!(ids, vec![3, 1, 2]),
        _ => panic!("expected rules reorder"),
    }
}

// ========== Input File Tests ==========

#[test]
fn test_read_json_file_object_and_array() {
    let single = json_file(json!({ "counterparty": "Banco Uno" }));
    let trades: Vec<NewTrade> = read_json_file(single.path()).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].fields.counterparty.as_deref(), Some("Banco Uno"));

    let many = json_file(json!([{ "amount": "100" }, { "amount": 250 }]));
    let trades: Vec<NewTrade> = read_json_file(many.path()).unwrap();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[1].fields.amount.as_deref(), Some("250"));
}

#[test]
fn test_read_json_file_rejects_scalar() {
    let file = json_file(json!("not an object"));
    assert!(read_json_file::<NewTrade>(file.path()).is_err());
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a very long counterparty", 10), "a very ...");
    assert_eq!(truncate("Operación número", 8), "Opera...");
}

// ========== Trade Command Tests ==========

#[test]
fn test_cmd_trades_add_and_list() {
    let db = setup_db();
    let file = json_file(json!([sample_trade_fields(), { "counterparty": "Banco Dos" }]));

    commands::cmd_trades_add(&db, CLIENT, file.path()).unwrap();

    let trades = db.list_trades(CLIENT, None).unwrap();
    assert_eq!(trades.len(), 2);
    assert!(commands::cmd_trades_list(&db, CLIENT, Some("unmatched")).is_ok());
    assert!(commands::cmd_trades_list(&db, CLIENT, Some("bogus")).is_err());

    let entries = db.list_audit_log(CLIENT, None, 10).unwrap();
    assert_eq!(entries.iter().filter(|e| e.action == "create").count(), 2);
    assert!(entries.iter().all(|e| e.actor == CLI_ACTOR));
}

#[test]
fn test_cmd_trades_close_requires_match() {
    let db = setup_db();
    let trade_id = insert_trade(&db, CLIENT, sample_trade_fields());
    assert!(commands::cmd_trades_close(&db, CLIENT, trade_id, "confirmed").is_err());

    let conf_id = ingest(&db, CLIENT, sample_confirmation_fields());
    commands::cmd_match(&db, &config(), CLIENT, conf_id).unwrap();
    commands::cmd_trades_close(&db, CLIENT, trade_id, "rejected").unwrap();

    let trade = db.require_trade(CLIENT, trade_id).unwrap();
    assert_eq!(trade.status, TradeStatus::Rejected);
}

// ========== Confirmation and Matching Command Tests ==========

#[test]
fn test_cmd_confirmations_ingest_and_match() {
    let db = setup_db();
    let trade_id = insert_trade(&db, CLIENT, sample_trade_fields());

    let mut body = serde_json::to_value(sample_confirmation_fields()).unwrap();
    body["source"] = json!("email");
    let file = json_file(body);
    commands::cmd_confirmations_ingest(&db, &config(), CLIENT, file.path(), true).unwrap();

    let confirmations = db.list_confirmations(CLIENT, None).unwrap();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].status, ConfirmationStatus::Matched);
    assert_eq!(confirmations[0].source.as_deref(), Some("email"));

    let m = db.get_active_match_for_trade(CLIENT, trade_id).unwrap().unwrap();
    assert_eq!(m.resolved_by, CLI_ACTOR);
    assert!(commands::cmd_matches_show(&db, &config(), CLIENT, m.id).is_ok());
}

#[test]
fn test_cmd_confirmations_ingest_extracted() {
    let db = setup_db();
    let file = json_file(json!({
        "source": "attachment",
        "extracted": {
            "Contraparte": "Banco Uno",
            "Monto": "1.000.000,00",
            "Fecha Valuta": "17/01/2025"
        }
    }));

    commands::cmd_confirmations_ingest(&db, &config(), CLIENT, file.path(), false).unwrap();

    let confirmations = db.list_confirmations(CLIENT, None).unwrap();
    assert_eq!(confirmations[0].fields.counterparty.as_deref(), Some("Banco Uno"));
    assert_eq!(confirmations[0].fields.amount.as_deref(), Some("1.000.000,00"));
    assert_eq!(confirmations[0].status, ConfirmationStatus::Pending);
}

#[test]
fn test_cmd_match_all_counts_duplicates() {
    let db = setup_db();
    insert_trade(&db, CLIENT, sample_trade_fields());
    ingest(&db, CLIENT, sample_confirmation_fields());
    let resent = ingest(&db, CLIENT, sample_confirmation_fields());

    commands::cmd_match_all(&db, &config(), CLIENT).unwrap();

    let resent = db.require_confirmation(CLIENT, resent).unwrap();
    assert_eq!(resent.status, ConfirmationStatus::Duplicate);
    assert_eq!(db.list_matches(CLIENT, false).unwrap().len(), 1);
}

#[test]
fn test_cmd_matches_reverse() {
    let db = setup_db();
    let trade_id = insert_trade(&db, CLIENT, sample_trade_fields());
    let conf_id = ingest(&db, CLIENT, sample_confirmation_fields());
    commands::cmd_match(&db, &config(), CLIENT, conf_id).unwrap();
    let m = db.get_active_match_for_trade(CLIENT, trade_id).unwrap().unwrap();

    commands::cmd_matches_reverse(&db, &config(), CLIENT, m.id).unwrap();

    assert_eq!(
        db.require_trade(CLIENT, trade_id).unwrap().status,
        TradeStatus::Unmatched
    );
    assert!(commands::cmd_matches_list(&db, CLIENT, true).is_ok());
    // A second reversal has nothing to undo
    assert!(commands::cmd_matches_reverse(&db, &config(), CLIENT, m.id).is_err());
}

// ========== Rule Command Tests ==========

#[test]
fn test_cmd_rules_add_reorder_delete() {
    let db = setup_db();
    let file = json_file(json!([
        physical_rule(None, DirectionFilter::Any, "Account X"),
        physical_rule(Some("Banco Uno"), DirectionFilter::Buy, "Account Y"),
    ]));
    commands::cmd_rules_add(&db, CLIENT, file.path()).unwrap();

    let rules = db.list_settlement_rules(CLIENT).unwrap();
    assert_eq!(rules.len(), 2);
    let (generic, specific) = (rules[0].id, rules[1].id);

    let mut audited: Vec<Option<i64>> = db
        .list_audit_log(CLIENT, Some("create"), 10)
        .unwrap()
        .iter()
        .map(|e| e.entity_id)
        .collect();
    audited.reverse();
    assert_eq!(audited, vec![Some(generic), Some(specific)]);

    let trade_id = insert_trade(&db, CLIENT, sample_trade_fields());
    commands::cmd_rules_resolve(&db, &config(), CLIENT, trade_id).unwrap();

    commands::cmd_rules_reorder(&db, CLIENT, &[specific, generic]).unwrap();
    let rules = db.list_settlement_rules(CLIENT).unwrap();
    assert_eq!(rules[0].id, specific);
    assert_eq!(rules[0].priority, 1);

    commands::cmd_rules_delete(&db, CLIENT, specific).unwrap();
    let rules = db.list_settlement_rules(CLIENT).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].priority, 1);
}

#[test]
fn test_cmd_rules_update_needs_single_rule() {
    let db = setup_db();
    let file = json_file(json!(physical_rule(None, DirectionFilter::Any, "Account X")));
    commands::cmd_rules_add(&db, CLIENT, file.path()).unwrap();
    let id = db.list_settlement_rules(CLIENT).unwrap()[0].id;

    let two = json_file(json!([
        physical_rule(None, DirectionFilter::Any, "A"),
        physical_rule(None, DirectionFilter::Sell, "B"),
    ]));
    assert!(commands::cmd_rules_update(&db, CLIENT, id, two.path()).is_err());

    let one = json_file(json!(physical_rule(None, DirectionFilter::Sell, "Account Z")));
    commands::cmd_rules_update(&db, CLIENT, id, one.path()).unwrap();
    let rule = db.get_settlement_rule(CLIENT, id).unwrap();
    assert_eq!(rule.direction, DirectionFilter::Sell);
    assert_eq!(rule.pay.bank, "Account Z");
}

#[test]
fn test_cmd_rules_resolve_without_rule_fails() {
    let db = setup_db();
    let trade_id = insert_trade(&db, CLIENT, sample_trade_fields());
    let err = commands::cmd_rules_resolve(&db, &config(), CLIENT, trade_id).unwrap_err();
    assert!(err.to_string().contains("Banco Uno"));
}

// ========== Automation Command Tests ==========

#[test]
fn test_cmd_settings_set_rejects_out_of_range() {
    let db = setup_db();
    let update = AutomationSettingsUpdate {
        confirm_delay_minutes: Some(100_000),
        ..Default::default()
    };
    assert!(commands::cmd_settings_set(&db, &config(), CLIENT, &update).is_err());
    assert!(commands::cmd_settings_show(&db, CLIENT).is_ok());
}

#[test]
fn test_cmd_actions_cancel() {
    let db = setup_db();
    enable_auto_confirm(&db, 30);
    insert_trade(&db, CLIENT, sample_trade_fields());
    let conf_id = ingest(&db, CLIENT, sample_confirmation_fields());
    commands::cmd_match(&db, &config(), CLIENT, conf_id).unwrap();

    let actions = db
        .list_scheduled_actions(CLIENT, Some(ActionState::Scheduled))
        .unwrap();
    assert_eq!(actions.len(), 1);

    commands::cmd_actions_cancel(&db, CLIENT, actions[0].id).unwrap();
    let action = db.get_scheduled_action(CLIENT, actions[0].id).unwrap().unwrap();
    assert_eq!(action.state, ActionState::Canceled);

    // Canceling again is reported, not an error
    assert!(commands::cmd_actions_cancel(&db, CLIENT, actions[0].id).is_ok());
    assert!(commands::cmd_actions_list(&db, CLIENT, Some("canceled")).is_ok());
}

#[tokio::test]
async fn test_run_sweep_fires_due_confirm() {
    let db = setup_db();
    enable_auto_confirm(&db, 0);
    let trade_id = insert_trade(&db, CLIENT, sample_trade_fields());
    let conf_id = ingest(&db, CLIENT, sample_confirmation_fields());
    commands::cmd_match(&db, &config(), CLIENT, conf_id).unwrap();

    let notifier = Arc::new(MockNotifier::new());
    let report = commands::run_sweep(&db, notifier.clone()).await.unwrap();
    assert_eq!(report.fired, 1);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(
        db.require_trade(CLIENT, trade_id).unwrap().status,
        TradeStatus::Confirmed
    );

    // Nothing left to fire
    let report = commands::run_sweep(&db, notifier.clone()).await.unwrap();
    assert_eq!(report.fired, 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn test_cmd_init_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("init.db");
    commands::cmd_init(&path, true).unwrap();

    let db = commands::open_db(&path, true).unwrap();
    assert!(!db.is_encrypted().unwrap());
    assert!(db.table_counts().unwrap().iter().all(|(_, n)| *n == 0));
}

#[test]
fn test_cmd_audit() {
    let db = setup_db();
    insert_trade(&db, CLIENT, sample_trade_fields());
    let file = json_file(json!(sample_trade_fields()));
    commands::cmd_trades_add(&db, CLIENT, file.path()).unwrap();

    assert!(commands::cmd_audit(&db, CLIENT, None, 0).is_ok());
    assert!(commands::cmd_audit(&db, CLIENT, Some("create"), 10).is_ok());
    assert!(db.list_audit_log("other", None, 10).unwrap().is_empty());
}
