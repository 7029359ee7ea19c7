//! Audit log command

use anyhow::Result;

use confirma_core::db::Database;

use super::truncate;

pub fn cmd_audit(db: &Database, client_id: &str, action: Option<&str>, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(client_id, action, limit.clamp(1, 1000))?;

    if entries.is_empty() {
        println!("No audit entries for client {}.", client_id);
        return Ok(());
    }

    println!(
        "{:<19}  {:<20} {:<14} {:<18} {:>6}  {}",
        "Time", "Actor", "Action", "Entity", "ID", "Details"
    );
    println!("{}", "-".repeat(110));
    for e in &entries {
        println!(
            "{:<19}  {:<20} {:<14} {:<18} {:>6}  {}",
            e.timestamp,
            truncate(&e.actor, 20),
            e.action,
            e.entity_type.as_deref().unwrap_or("-"),
            e.entity_id.map(|id| id.to_string()).unwrap_or_default(),
            e.details.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
