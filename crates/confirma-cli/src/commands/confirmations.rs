//! Confirmation commands (list, ingest) and matching

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use serde_json::Value;

use confirma_core::db::Database;
use confirma_core::ingest::fields_from_extracted;
use confirma_core::models::{ConfirmationStatus, NewConfirmation, TradeFields};
use confirma_core::{EngineConfig, MatchOutcome, MatchResolver};

use super::{read_json_file, truncate, CLI_ACTOR};

/// One confirmation in an ingestion file: flat fields or a parser's `extracted` map
#[derive(Debug, Deserialize)]
pub struct ConfirmationInput {
    #[serde(flatten)]
    pub confirmation: NewConfirmation,
    #[serde(default)]
    pub extracted: Option<HashMap<String, Value>>,
}

impl ConfirmationInput {
    pub fn into_new_confirmation(self) -> Result<NewConfirmation> {
        let mut confirmation = self.confirmation;
        if let Some(extracted) = &self.extracted {
            if confirmation.fields != TradeFields::default() {
                bail!("give either flat fields or an extracted map, not both");
            }
            confirmation.fields = fields_from_extracted(extracted)?;
        }
        Ok(confirmation)
    }
}

pub fn cmd_confirmations_list(db: &Database, client_id: &str, status: Option<&str>) -> Result<()> {
    let status = status
        .map(str::parse::<ConfirmationStatus>)
        .transpose()
        .map_err(|e| anyhow!(e))?;
    let confirmations = db.list_confirmations(client_id, status)?;

    if confirmations.is_empty() {
        println!("No confirmations for client '{}'.", client_id);
        return Ok(());
    }

    println!(
        "{:>6}  {:<19} {:<12} {:<24} {:>16}  {:<12}",
        "ID", "Received", "Number", "Counterparty", "Amount", "Status"
    );
    println!("{}", "-".repeat(96));
    for c in &confirmations {
        println!(
            "{:>6}  {:<19} {:<12} {:<24} {:>16}  {:<12}",
            c.id,
            c.received_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(c.fields.trade_number.as_deref().unwrap_or("-"), 12),
            truncate(c.fields.counterparty.as_deref().unwrap_or("-"), 24),
            c.fields.amount.as_deref().unwrap_or("-"),
            c.status
        );
    }
    println!();
    println!("{} confirmation(s)", confirmations.len());

    Ok(())
}

pub fn cmd_confirmations_ingest(
    db: &Database,
    config: &EngineConfig,
    client_id: &str,
    file: &Path,
    auto_match: bool,
) -> Result<()> {
    let inputs: Vec<ConfirmationInput> = read_json_file(file)?;
    let resolver = MatchResolver::new(db, &config.matching);

    println!(
        "📥 Ingesting {} confirmation(s) for '{}'...",
        inputs.len(),
        client_id
    );
    for input in inputs {
        let confirmation = input.into_new_confirmation()?;
        let id = db.ingest_confirmation(client_id, &confirmation)?;
        db.log_audit(
            client_id,
            CLI_ACTOR,
            "ingest",
            Some("confirmation"),
            Some(id),
            Some(&format!(
                "source={}",
                confirmation.source.as_deref().unwrap_or("-")
            )),
        )?;
        println!("   #{} ingested", id);

        if auto_match {
            let outcome = resolver.perform_matching(client_id, id, CLI_ACTOR)?;
            audit_outcome(db, client_id, &outcome)?;
            print_outcome(&outcome);
        }
    }
    println!("✅ Done");

    Ok(())
}

pub fn cmd_match(
    db: &Database,
    config: &EngineConfig,
    client_id: &str,
    confirmation_id: i64,
) -> Result<()> {
    let resolver = MatchResolver::new(db, &config.matching);
    let outcome = resolver.perform_matching(client_id, confirmation_id, CLI_ACTOR)?;
    audit_outcome(db, client_id, &outcome)?;
    print_outcome(&outcome);
    Ok(())
}

pub fn cmd_match_all(db: &Database, config: &EngineConfig, client_id: &str) -> Result<()> {
    println!("🔗 Matching open confirmations for '{}'...", client_id);

    let resolver = MatchResolver::new(db, &config.matching);
    let report = resolver.perform_matching_all_pending(client_id, CLI_ACTOR)?;
    for outcome in &report.outcomes {
        audit_outcome(db, client_id, outcome)?;
        print_outcome(outcome);
    }

    println!();
    println!("   Processed:    {}", report.processed);
    println!("   Matched:      {}", report.matched);
    println!("   Disputed:     {}", report.disputed);
    println!("   Duplicates:   {}", report.duplicates);
    println!("   Unrecognized: {}", report.unrecognized);
    if report.conflicts > 0 {
        println!("   ⚠️  Conflicts: {} (left open, rerun to retry)", report.conflicts);
    }

    Ok(())
}

fn print_outcome(outcome: &MatchOutcome) {
    match outcome {
        MatchOutcome::Matched {
            matched,
            account,
            account_error,
            scheduled,
        } => {
            println!(
                "   ✅ Confirmation #{} → trade #{} (match #{}, {}%, {})",
                matched.confirmation_id,
                matched.trade_id,
                matched.id,
                matched.confidence,
                matched.classification.as_str()
            );
            if !matched.differing_fields.is_empty() {
                println!("      Differs: {}", matched.differing_fields.join(", "));
            }
            match (account, account_error) {
                (Some(binding), _) => println!(
                    "      Settles via rule #{}: pay {} {} / receive {} {}",
                    binding.rule_id,
                    binding.pay.bank,
                    binding.pay.account_number,
                    binding.receive.bank,
                    binding.receive.account_number
                ),
                (None, Some(err)) => println!("      ⚠️  {}", err),
                (None, None) => {}
            }
            if let Some(action) = scheduled {
                println!(
                    "      ⏰ {} scheduled for {}",
                    action.kind.as_str(),
                    action.fire_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        MatchOutcome::Duplicate {
            confirmation_id,
            existing_match_id,
        } => println!(
            "   ♻️  Confirmation #{} duplicates match #{}",
            confirmation_id, existing_match_id
        ),
        MatchOutcome::Unrecognized {
            confirmation_id,
            best_trade_id,
            best_confidence,
        } => match best_trade_id {
            Some(trade_id) => println!(
                "   ❓ Confirmation #{} unrecognized (closest: trade #{} at {}%)",
                confirmation_id, trade_id, best_confidence
            ),
            None => println!(
                "   ❓ Confirmation #{} unrecognized (no open trades)",
                confirmation_id
            ),
        },
        MatchOutcome::Skipped {
            confirmation_id,
            status,
        } => println!(
            "   ⏭️  Confirmation #{} is {}, skipped",
            confirmation_id, status
        ),
    }
}

fn audit_outcome(db: &Database, client_id: &str, outcome: &MatchOutcome) -> Result<()> {
    match outcome {
        MatchOutcome::Matched { matched, .. } => {
            db.log_audit(
                client_id,
                CLI_ACTOR,
                "match",
                Some("match"),
                Some(matched.id),
                Some(&format!(
                    "trade={}, confirmation={}, confidence={}, classification={}",
                    matched.trade_id,
                    matched.confirmation_id,
                    matched.confidence,
                    matched.classification.as_str()
                )),
            )?;
        }
        MatchOutcome::Duplicate {
            confirmation_id,
            existing_match_id,
        } => {
            db.log_audit(
                client_id,
                CLI_ACTOR,
                "duplicate",
                Some("confirmation"),
                Some(*confirmation_id),
                Some(&format!("match={}", existing_match_id)),
            )?;
        }
        MatchOutcome::Unrecognized {
            confirmation_id,
            best_confidence,
            ..
        } => {
            db.log_audit(
                client_id,
                CLI_ACTOR,
                "unrecognized",
                Some("confirmation"),
                Some(*confirmation_id),
                Some(&format!(
                    "best_confidence={}",
                    best_confidence
                )),
            )?;
        }
        MatchOutcome::Skipped { .. } => {}
    }
    Ok(())
}
