//! Match commands (list, show, reverse)

use anyhow::Result;

use confirma_core::db::Database;
use confirma_core::{compare_fields, EngineConfig, FieldOutcome, MatchResolver};

use super::{truncate, CLI_ACTOR};

pub fn cmd_matches_list(db: &Database, client_id: &str, include_reversed: bool) -> Result<()> {
    let matches = db.list_matches(client_id, include_reversed)?;

    if matches.is_empty() {
        println!("No matches for client '{}'.", client_id);
        return Ok(());
    }

    println!(
        "{:>6}  {:>6}  {:>6}  {:>4}  {:<10} {:<30} {:<10}",
        "ID", "Trade", "Conf", "%", "Class", "Differs", "State"
    );
    println!("{}", "-".repeat(84));
    for m in &matches {
        println!(
            "{:>6}  {:>6}  {:>6}  {:>4}  {:<10} {:<30} {:<10}",
            m.id,
            m.trade_id,
            m.confirmation_id,
            m.confidence,
            m.classification.as_str(),
            truncate(&m.differing_fields.join(","), 30),
            if m.is_active() { "active" } else { "reversed" }
        );
    }

    Ok(())
}

pub fn cmd_matches_show(
    db: &Database,
    config: &EngineConfig,
    client_id: &str,
    id: i64,
) -> Result<()> {
    let m = db.require_match(client_id, id)?;
    let trade = db.require_trade(client_id, m.trade_id)?;
    let confirmation = db.require_confirmation(client_id, m.confirmation_id)?;

    println!("Match #{}", m.id);
    println!("   Trade:          #{} ({})", trade.id, trade.status);
    println!(
        "   Confirmation:   #{} ({})",
        confirmation.id, confirmation.status
    );
    println!("   Confidence:     {}%", m.confidence);
    println!("   Classification: {}", m.classification.as_str());
    println!("   Resolved by:    {}", m.resolved_by);
    if let Some(reversed_at) = m.reversed_at {
        println!("   Reversed at:    {}", reversed_at.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();

    println!(
        "   {:<20} {:>3}  {:<22} {:<22} {}",
        "Field", "W", "Trade", "Confirmation", "Outcome"
    );
    let verdicts = compare_fields(
        &trade.fields,
        &confirmation.fields,
        &config.matching.tolerance(),
    );
    for v in &verdicts {
        let marker = match v.outcome {
            FieldOutcome::Equal => "✓",
            FieldOutcome::Skipped => "·",
            _ if v.critical => "✗",
            _ => "~",
        };
        println!(
            "   {:<20} {:>3}  {:<22} {:<22} {} {:?}",
            v.field.as_str(),
            v.weight,
            truncate(v.trade_value.as_deref().unwrap_or("-"), 22),
            truncate(v.confirmation_value.as_deref().unwrap_or("-"), 22),
            marker,
            v.outcome
        );
    }

    let actions = db.list_actions_for_match(m.id)?;
    if !actions.is_empty() {
        println!();
        println!("   Actions:");
        for a in &actions {
            println!(
                "     #{} {} at {} ({})",
                a.id,
                a.kind.as_str(),
                a.fire_at.format("%Y-%m-%d %H:%M:%S"),
                a.state
            );
        }
    }

    Ok(())
}

pub fn cmd_matches_reverse(
    db: &Database,
    config: &EngineConfig,
    client_id: &str,
    id: i64,
) -> Result<()> {
    let resolver = MatchResolver::new(db, &config.matching);
    let reversal = resolver.reverse_match(client_id, id)?;

    db.log_audit(
        client_id,
        CLI_ACTOR,
        "reverse",
        Some("match"),
        Some(id),
        Some(&format!(
            "trade={}, confirmation={}, canceled_actions={}",
            reversal.reversed.trade_id,
            reversal.reversed.confirmation_id,
            reversal.canceled_actions
        )),
    )?;

    println!(
        "↩️  Match #{} reversed: trade #{} and confirmation #{} are open again",
        id, reversal.reversed.trade_id, reversal.reversed.confirmation_id
    );
    if reversal.canceled_actions > 0 {
        println!("   Canceled {} scheduled action(s)", reversal.canceled_actions);
    }

    Ok(())
}
