//! Audit log, one trail per client

use rusqlite::{params, Row};

use super::{AuditEntry, Database};
use crate::error::Result;

const AUDIT_SELECT: &str = r#"
    SELECT id, client_id, timestamp, actor, action, entity_type, entity_id, details
    FROM audit_log
"#;

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        client_id: row.get(1)?,
        timestamp: row.get(2)?,
        actor: row.get(3)?,
        action: row.get(4)?,
        entity_type: row.get(5)?,
        entity_id: row.get(6)?,
        details: row.get(7)?,
    })
}

impl Database {
    /// Record an operator-visible event against a client's trail
    pub fn log_audit(
        &self,
        client_id: &str,
        actor: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_log (client_id, actor, action, entity_type, entity_id, details)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![client_id, actor, action, entity_type, entity_id, details],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// A client's most recent entries first, optionally only one action
    pub fn list_audit_log(
        &self,
        client_id: &str,
        action: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let entries = match action {
            Some(action) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? AND action = ? ORDER BY id DESC LIMIT ?",
                    AUDIT_SELECT
                ))?;
                let rows = stmt.query_map(params![client_id, action, limit], row_to_entry)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? ORDER BY id DESC LIMIT ?",
                    AUDIT_SELECT
                ))?;
                let rows = stmt.query_map(params![client_id, limit], row_to_entry)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(entries)
    }
}
