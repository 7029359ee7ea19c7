//! Settlement rule commands

use std::path::Path;

use anyhow::{bail, Result};

use confirma_core::db::Database;
use confirma_core::models::{NewSettlementRule, SettlementRule};
use confirma_core::{EngineConfig, MatchResolver};

use super::{read_json_file, truncate, CLI_ACTOR};

fn print_rules(rules: &[SettlementRule]) {
    if rules.is_empty() {
        println!("No settlement rules.");
        return;
    }

    println!(
        "{:>4} {:>5}  {:<20} {:<5} {:<8} {:<18} {:<4} {:<28} {:<28}",
        "Pri", "ID", "Counterparty", "Side", "Product", "Modality", "Ccy", "Pay", "Receive"
    );
    println!("{}", "-".repeat(130));
    for r in rules {
        println!(
            "{:>4} {:>5}  {:<20} {:<5} {:<8} {:<18} {:<4} {:<28} {:<28}{}",
            r.priority,
            r.id,
            truncate(r.counterparty.as_deref().unwrap_or("*"), 20),
            r.direction.as_str(),
            r.product.as_str(),
            r.modality.as_str(),
            r.settlement_currency.as_deref().unwrap_or("-"),
            truncate(&format!("{} {}", r.pay.bank, r.pay.account_number), 28),
            truncate(
                &format!("{} {}", r.receive.bank, r.receive.account_number),
                28
            ),
            if r.active { "" } else { "  (inactive)" }
        );
    }
}

fn describe(rule: &NewSettlementRule) -> String {
    format!(
        "counterparty={}, direction={}, product={}, modality={}",
        rule.counterparty.as_deref().unwrap_or("*"),
        rule.direction.as_str(),
        rule.product.as_str(),
        rule.modality.as_str()
    )
}

pub fn cmd_rules_list(db: &Database, client_id: &str) -> Result<()> {
    print_rules(&db.list_settlement_rules(client_id)?);
    Ok(())
}

pub fn cmd_rules_add(db: &Database, client_id: &str, file: &Path) -> Result<()> {
    let new_rules: Vec<NewSettlementRule> = read_json_file(file)?;

    let mut rules = Vec::new();
    for rule in &new_rules {
        let (created, updated) = db.create_settlement_rule(client_id, rule)?;
        rules = updated;
        db.log_audit(
            client_id,
            CLI_ACTOR,
            "create",
            Some("settlement_rule"),
            Some(created),
            Some(&describe(rule)),
        )?;
    }

    println!("✅ Added {} rule(s)", new_rules.len());
    print_rules(&rules);
    Ok(())
}

pub fn cmd_rules_update(db: &Database, client_id: &str, id: i64, file: &Path) -> Result<()> {
    let mut rules: Vec<NewSettlementRule> = read_json_file(file)?;
    if rules.len() != 1 {
        bail!("{} must hold exactly one rule", file.display());
    }
    let rule = rules.remove(0);

    let rules = db.update_settlement_rule(client_id, id, &rule)?;
    db.log_audit(
        client_id,
        CLI_ACTOR,
        "update",
        Some("settlement_rule"),
        Some(id),
        Some(&describe(&rule)),
    )?;

    println!("✅ Rule #{} updated", id);
    print_rules(&rules);
    Ok(())
}

pub fn cmd_rules_delete(db: &Database, client_id: &str, id: i64) -> Result<()> {
    let rules = db.delete_settlement_rule(client_id, id)?;
    db.log_audit(
        client_id,
        CLI_ACTOR,
        "delete",
        Some("settlement_rule"),
        Some(id),
        Some(&format!("remaining={}", rules.len())),
    )?;

    println!("🗑️  Rule #{} deleted", id);
    print_rules(&rules);
    Ok(())
}

pub fn cmd_rules_reorder(db: &Database, client_id: &str, ids: &[i64]) -> Result<()> {
    let rules = db.reorder_settlement_rules(client_id, ids)?;
    let order: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    db.log_audit(
        client_id,
        CLI_ACTOR,
        "reorder",
        Some("settlement_rule"),
        None,
        Some(&format!("order={}", order.join(","))),
    )?;

    println!("✅ Rules reordered");
    print_rules(&rules);
    Ok(())
}

pub fn cmd_rules_resolve(
    db: &Database,
    config: &EngineConfig,
    client_id: &str,
    trade_id: i64,
) -> Result<()> {
    let resolver = MatchResolver::new(db, &config.matching);
    let binding = resolver.resolve_account(client_id, trade_id)?;

    println!(
        "Trade #{} settles via rule #{} (priority {}, {})",
        trade_id,
        binding.rule_id,
        binding.priority,
        binding.modality.as_str()
    );
    for (label, leg) in [("Pay", &binding.pay), ("Receive", &binding.receive)] {
        println!(
            "   {:<8} {} {} {} {}",
            label,
            leg.bank,
            leg.swift,
            leg.account_number,
            leg.currency.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
