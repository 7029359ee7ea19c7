//! Settlement rule storage
//!
//! Every mutation validates first, checks for duplicates, plans the new
//! order in `settlement`, and then rewrites all priorities of the client in
//! the same immediate transaction. Each call returns the full ordered rule set.

use rusqlite::{params, Connection, Row, TransactionBehavior};
use tracing::info;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{AccountLeg, NewSettlementRule, SettlementRule};
use crate::settlement;

const RULE_SELECT: &str = r#"
    SELECT id, client_id, priority, active, direction, counterparty, product, modality,
           settlement_currency, pay_bank, pay_swift, pay_account, pay_currency,
           receive_bank, receive_swift, receive_account, receive_currency, created_at, updated_at
    FROM settlement_rules
"#;

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<SettlementRule> {
    let direction: String = row.get(4)?;
    let product: String = row.get(6)?;
    let modality: String = row.get(7)?;
    let created_at: String = row.get(17)?;
    let updated_at: String = row.get(18)?;

    let parse_err = |col: usize, msg: String| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(msg),
        )
    };

    Ok(SettlementRule {
        id: row.get(0)?,
        client_id: row.get(1)?,
        priority: row.get(2)?,
        active: row.get(3)?,
        direction: direction.parse().unwrap_or_default(),
        counterparty: row.get(5)?,
        product: product.parse().map_err(|e| parse_err(6, e))?,
        modality: modality.parse().map_err(|e| parse_err(7, e))?,
        settlement_currency: row.get(8)?,
        pay: AccountLeg {
            bank: row.get(9)?,
            swift: row.get(10)?,
            account_number: row.get(11)?,
            currency: row.get(12)?,
        },
        receive: AccountLeg {
            bank: row.get(13)?,
            swift: row.get(14)?,
            account_number: row.get(15)?,
            currency: row.get(16)?,
        },
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn load_rules(conn: &Connection, client_id: &str) -> Result<Vec<SettlementRule>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE client_id = ? ORDER BY priority, id",
        RULE_SELECT
    ))?;
    let rules = stmt
        .query_map(params![client_id], row_to_rule)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rules)
}

fn rule_ids(rules: &[SettlementRule]) -> Vec<i64> {
    rules.iter().map(|r| r.id).collect()
}

/// Rewrite priorities as 1..N in `order`.
///
/// Two passes because of UNIQUE(client_id, priority): first park every rule
/// on a negative priority, then assign the final ones.
fn apply_order(conn: &Connection, client_id: &str, order: &[i64]) -> Result<()> {
    conn.execute(
        "UPDATE settlement_rules SET priority = -id WHERE client_id = ?",
        params![client_id],
    )?;
    for (index, id) in order.iter().enumerate() {
        let updated = conn.execute(
            "UPDATE settlement_rules SET priority = ? WHERE client_id = ? AND id = ?",
            params![index as i64 + 1, client_id, id],
        )?;
        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "settlement rule {} disappeared during renumbering",
                id
            )));
        }
    }
    Ok(())
}

fn rule_params(rule: &NewSettlementRule) -> [Option<String>; 13] {
    [
        Some(rule.direction.as_str().to_string()),
        rule.counterparty.clone(),
        Some(rule.product.as_str().to_string()),
        Some(rule.modality.as_str().to_string()),
        rule.settlement_currency.clone(),
        Some(rule.pay.bank.clone()),
        Some(rule.pay.swift.clone()),
        Some(rule.pay.account_number.clone()),
        rule.pay.currency.clone(),
        Some(rule.receive.bank.clone()),
        Some(rule.receive.swift.clone()),
        Some(rule.receive.account_number.clone()),
        rule.receive.currency.clone(),
    ]
}

impl Database {
    /// A client's rules in priority order
    pub fn list_settlement_rules(&self, client_id: &str) -> Result<Vec<SettlementRule>> {
        let conn = self.conn()?;
        load_rules(&conn, client_id)
    }

    /// Get one rule
    pub fn get_settlement_rule(&self, client_id: &str, id: i64) -> Result<SettlementRule> {
        self.list_settlement_rules(client_id)?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("settlement rule {}", id)))
    }

    /// Create a rule at its requested priority (appended when absent).
    ///
    /// Returns the new rule's id and the client's reordered rule set.
    pub fn create_settlement_rule(
        &self,
        client_id: &str,
        rule: &NewSettlementRule,
    ) -> Result<(i64, Vec<SettlementRule>)> {
        let rule = settlement::validate_rule(rule)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = load_rules(&tx, client_id)?;
        settlement::check_duplicate(&existing, &rule, None)?;
        // Range check before anything is written
        let order = rule_ids(&existing);
        settlement::plan_insert(&order, 0, rule.priority)?;

        let p = rule_params(&rule);
        tx.execute(
            r#"
            INSERT INTO settlement_rules (
                client_id, priority, active, direction, counterparty, product, modality,
                settlement_currency, pay_bank, pay_swift, pay_account, pay_currency,
                receive_bank, receive_swift, receive_account, receive_currency
            ) VALUES (?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                client_id, rule.active, p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], p[8],
                p[9], p[10], p[11], p[12]
            ],
        )?;
        let id = tx.last_insert_rowid();

        let planned = settlement::plan_insert(&order, id, rule.priority)?;
        apply_order(&tx, client_id, &planned)?;

        let rules = load_rules(&tx, client_id)?;
        tx.commit()?;

        info!("Created settlement rule {} for client {}", id, client_id);
        Ok((id, rules))
    }

    /// Replace a rule's definition; a priority moves it, otherwise it keeps its place
    pub fn update_settlement_rule(
        &self,
        client_id: &str,
        id: i64,
        rule: &NewSettlementRule,
    ) -> Result<Vec<SettlementRule>> {
        let rule = settlement::validate_rule(rule)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = load_rules(&tx, client_id)?;
        if !existing.iter().any(|r| r.id == id) {
            return Err(Error::NotFound(format!("settlement rule {}", id)));
        }
        settlement::check_duplicate(&existing, &rule, Some(id))?;

        let order = rule_ids(&existing);
        let planned = match rule.priority {
            Some(priority) => settlement::plan_move(&order, id, priority)?,
            None => order,
        };

        let p = rule_params(&rule);
        tx.execute(
            r#"
            UPDATE settlement_rules SET
                active = ?, direction = ?, counterparty = ?, product = ?, modality = ?,
                settlement_currency = ?, pay_bank = ?, pay_swift = ?, pay_account = ?,
                pay_currency = ?, receive_bank = ?, receive_swift = ?, receive_account = ?,
                receive_currency = ?, updated_at = datetime('now')
            WHERE client_id = ? AND id = ?
            "#,
            params![
                rule.active, p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], p[8], p[9], p[10],
                p[11], p[12], client_id, id
            ],
        )?;

        apply_order(&tx, client_id, &planned)?;

        let rules = load_rules(&tx, client_id)?;
        tx.commit()?;

        info!("Updated settlement rule {} for client {}", id, client_id);
        Ok(rules)
    }

    /// Delete a rule and close the gap it leaves
    pub fn delete_settlement_rule(&self, client_id: &str, id: i64) -> Result<Vec<SettlementRule>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = load_rules(&tx, client_id)?;
        let planned = settlement::plan_remove(&rule_ids(&existing), id)?;

        tx.execute(
            "DELETE FROM settlement_rules WHERE client_id = ? AND id = ?",
            params![client_id, id],
        )?;
        apply_order(&tx, client_id, &planned)?;

        let rules = load_rules(&tx, client_id)?;
        tx.commit()?;

        info!("Deleted settlement rule {} for client {}", id, client_id);
        Ok(rules)
    }

    /// Renumber a client's rules from a complete new order
    pub fn reorder_settlement_rules(
        &self,
        client_id: &str,
        new_order: &[i64],
    ) -> Result<Vec<SettlementRule>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = load_rules(&tx, client_id)?;
        let planned = settlement::plan_reorder(&rule_ids(&existing), new_order)?;
        apply_order(&tx, client_id, &planned)?;

        let rules = load_rules(&tx, client_id)?;
        tx.commit()?;

        info!(
            "Reordered {} settlement rule(s) for client {}",
            rules.len(),
            client_id
        );
        Ok(rules)
    }
}
