//! Trade operations

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::info;

use super::{field_columns, field_values, fields_from_row, parse_datetime, placeholders, Database};
use crate::error::{Error, Result};
use crate::models::{Field, NewTrade, Trade, TradeStatus};

fn trade_select() -> String {
    format!(
        "SELECT id, client_id, {}, status, created_at, updated_at FROM trades",
        field_columns()
    )
}

fn row_to_trade(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let n = Field::ALL.len();
    let status: String = row.get(2 + n)?;
    let created_at: String = row.get(3 + n)?;
    let updated_at: String = row.get(4 + n)?;
    Ok(Trade {
        id: row.get(0)?,
        client_id: row.get(1)?,
        fields: fields_from_row(row, 2)?,
        status: status.parse().unwrap_or_default(),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

impl Database {
    /// Insert a trade in `unmatched` status
    pub fn insert_trade(&self, client_id: &str, trade: &NewTrade) -> Result<i64> {
        let conn = self.conn()?;

        let mut values = vec![Some(client_id.to_string())];
        values.extend(field_values(&trade.fields));

        conn.execute(
            &format!(
                "INSERT INTO trades (client_id, {}) VALUES ({})",
                field_columns(),
                placeholders(values.len())
            ),
            params_from_iter(values.iter()),
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a trade by id
    pub fn get_trade(&self, client_id: &str, id: i64) -> Result<Option<Trade>> {
        let conn = self.conn()?;
        let trade = conn
            .query_row(
                &format!("{} WHERE client_id = ? AND id = ?", trade_select()),
                params![client_id, id],
                row_to_trade,
            )
            .optional()?;
        Ok(trade)
    }

    /// Get a trade by id or fail with `NotFound`
    pub fn require_trade(&self, client_id: &str, id: i64) -> Result<Trade> {
        self.get_trade(client_id, id)?
            .ok_or_else(|| Error::NotFound(format!("trade {} for client {}", id, client_id)))
    }

    /// List a client's trades, optionally filtered by status
    pub fn list_trades(&self, client_id: &str, status: Option<TradeStatus>) -> Result<Vec<Trade>> {
        let conn = self.conn()?;

        let trades = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? AND status = ? ORDER BY id",
                    trade_select()
                ))?;
                let rows = stmt.query_map(params![client_id, status.as_str()], row_to_trade)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? ORDER BY id",
                    trade_select()
                ))?;
                let rows = stmt.query_map(params![client_id], row_to_trade)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(trades)
    }

    /// Candidate trades for matching
    pub fn list_unmatched_trades(&self, client_id: &str) -> Result<Vec<Trade>> {
        self.list_trades(client_id, Some(TradeStatus::Unmatched))
    }

    /// Move a matched or disputed trade to a terminal status
    pub fn close_trade(&self, client_id: &str, id: i64, status: TradeStatus) -> Result<Trade> {
        if !status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "trades can only be closed as confirmed or rejected, not {}",
                status
            )));
        }

        let current = self.require_trade(client_id, id)?;
        if !matches!(current.status, TradeStatus::Matched | TradeStatus::Disputed) {
            return Err(Error::InvalidData(format!(
                "trade {} is {}; only matched or disputed trades can be closed",
                id, current.status
            )));
        }

        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE trades SET status = ?, updated_at = datetime('now')
             WHERE client_id = ? AND id = ? AND status = ?",
            params![status.as_str(), client_id, id, current.status.as_str()],
        )?;

        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "trade {} changed status while closing",
                id
            )));
        }

        info!("Trade {} closed as {}", id, status);
        self.require_trade(client_id, id)
    }
}
