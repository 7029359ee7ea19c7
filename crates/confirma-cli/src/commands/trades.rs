//! Trade commands (list, add, close)

use std::path::Path;

use anyhow::{anyhow, Result};

use confirma_core::db::Database;
use confirma_core::models::{NewTrade, TradeStatus};

use super::{read_json_file, truncate, CLI_ACTOR};

pub fn cmd_trades_list(db: &Database, client_id: &str, status: Option<&str>) -> Result<()> {
    let status = status
        .map(str::parse::<TradeStatus>)
        .transpose()
        .map_err(|e| anyhow!(e))?;
    let trades = db.list_trades(client_id, status)?;

    if trades.is_empty() {
        println!("No trades for client '{}'.", client_id);
        return Ok(());
    }

    println!(
        "{:>6}  {:<12} {:<24} {:<10} {:<5} {:<7} {:>16} {:>12}  {:<10}",
        "ID", "Number", "Counterparty", "Date", "Side", "Pair", "Amount", "Price", "Status"
    );
    println!("{}", "-".repeat(112));
    for trade in &trades {
        let f = &trade.fields;
        println!(
            "{:>6}  {:<12} {:<24} {:<10} {:<5} {:<7} {:>16} {:>12}  {:<10}",
            trade.id,
            truncate(f.trade_number.as_deref().unwrap_or("-"), 12),
            truncate(f.counterparty.as_deref().unwrap_or("-"), 24),
            truncate(f.trade_date.as_deref().unwrap_or("-"), 10),
            truncate(f.direction.as_deref().unwrap_or("-"), 5),
            format!(
                "{}/{}",
                f.currency_1.as_deref().unwrap_or("?"),
                f.currency_2.as_deref().unwrap_or("?")
            ),
            f.amount.as_deref().unwrap_or("-"),
            f.price.as_deref().unwrap_or("-"),
            trade.status
        );
    }
    println!();
    println!("{} trade(s)", trades.len());

    Ok(())
}

pub fn cmd_trades_add(db: &Database, client_id: &str, file: &Path) -> Result<()> {
    let trades: Vec<NewTrade> = read_json_file(file)?;

    println!("📥 Adding {} trade(s) for '{}'...", trades.len(), client_id);
    for trade in &trades {
        let id = db.insert_trade(client_id, trade)?;
        db.log_audit(
            client_id,
            CLI_ACTOR,
            "create",
            Some("trade"),
            Some(id),
            Some(&format!(
                "trade_number={}",
                trade.fields.trade_number.as_deref().unwrap_or("-")
            )),
        )?;
        println!(
            "   #{} {} {}",
            id,
            trade.fields.trade_number.as_deref().unwrap_or("(no number)"),
            trade.fields.counterparty.as_deref().unwrap_or("")
        );
    }
    println!("✅ Done");

    Ok(())
}

pub fn cmd_trades_close(db: &Database, client_id: &str, id: i64, status: &str) -> Result<()> {
    let status: TradeStatus = status.parse().map_err(|e: String| anyhow!(e))?;
    let trade = db.close_trade(client_id, id, status)?;

    db.log_audit(
        client_id,
        CLI_ACTOR,
        "close",
        Some("trade"),
        Some(id),
        Some(&format!("status={}", trade.status)),
    )?;

    println!("✅ Trade #{} is now {}", trade.id, trade.status);
    Ok(())
}
