//! Confirmation operations

use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{
    field_columns, field_values, fields_from_row, format_datetime, parse_datetime, placeholders,
    Database,
};
use crate::error::{Error, Result};
use crate::matching::fingerprint;
use crate::models::{Confirmation, ConfirmationStatus, Field, NewConfirmation};

fn confirmation_select() -> String {
    format!(
        "SELECT id, client_id, {}, sender, subject, received_at, source, fingerprint, status, created_at
         FROM confirmations",
        field_columns()
    )
}

fn row_to_confirmation(row: &Row<'_>) -> rusqlite::Result<Confirmation> {
    let n = Field::ALL.len();
    let received_at: String = row.get(4 + n)?;
    let status: String = row.get(7 + n)?;
    let created_at: String = row.get(8 + n)?;
    Ok(Confirmation {
        id: row.get(0)?,
        client_id: row.get(1)?,
        fields: fields_from_row(row, 2)?,
        sender: row.get(2 + n)?,
        subject: row.get(3 + n)?,
        received_at: parse_datetime(&received_at),
        source: row.get(5 + n)?,
        fingerprint: row.get(6 + n)?,
        status: status.parse().unwrap_or_default(),
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Store a parsed confirmation in `pending` status
    pub fn ingest_confirmation(&self, client_id: &str, confirmation: &NewConfirmation) -> Result<i64> {
        let conn = self.conn()?;

        let received_at = confirmation.received_at.unwrap_or_else(Utc::now);

        let mut values = vec![Some(client_id.to_string())];
        values.extend(field_values(&confirmation.fields));
        values.push(confirmation.sender.clone());
        values.push(confirmation.subject.clone());
        values.push(Some(format_datetime(&received_at)));
        values.push(confirmation.source.clone());
        values.push(Some(fingerprint(&confirmation.fields)));

        conn.execute(
            &format!(
                "INSERT INTO confirmations (client_id, {}, sender, subject, received_at, source, fingerprint)
                 VALUES ({})",
                field_columns(),
                placeholders(values.len())
            ),
            params_from_iter(values.iter()),
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a confirmation by id
    pub fn get_confirmation(&self, client_id: &str, id: i64) -> Result<Option<Confirmation>> {
        let conn = self.conn()?;
        let confirmation = conn
            .query_row(
                &format!("{} WHERE client_id = ? AND id = ?", confirmation_select()),
                params![client_id, id],
                row_to_confirmation,
            )
            .optional()?;
        Ok(confirmation)
    }

    /// Get a confirmation by id or fail with `NotFound`
    pub fn require_confirmation(&self, client_id: &str, id: i64) -> Result<Confirmation> {
        self.get_confirmation(client_id, id)?.ok_or_else(|| {
            Error::NotFound(format!("confirmation {} for client {}", id, client_id))
        })
    }

    /// List a client's confirmations, optionally filtered by status
    pub fn list_confirmations(
        &self,
        client_id: &str,
        status: Option<ConfirmationStatus>,
    ) -> Result<Vec<Confirmation>> {
        let conn = self.conn()?;

        let confirmations = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? AND status = ? ORDER BY received_at, id",
                    confirmation_select()
                ))?;
                let rows =
                    stmt.query_map(params![client_id, status.as_str()], row_to_confirmation)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? ORDER BY received_at, id",
                    confirmation_select()
                ))?;
                let rows = stmt.query_map(params![client_id], row_to_confirmation)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(confirmations)
    }

    /// Pending and unrecognized confirmations, oldest first
    pub fn list_open_confirmations(&self, client_id: &str) -> Result<Vec<Confirmation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE client_id = ? AND status IN ('pending', 'unrecognized') ORDER BY received_at, id",
            confirmation_select()
        ))?;
        let confirmations = stmt
            .query_map(params![client_id], row_to_confirmation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(confirmations)
    }

    /// Conditionally move a confirmation from `from` to `to`
    pub fn transition_confirmation(
        &self,
        client_id: &str,
        id: i64,
        from: ConfirmationStatus,
        to: ConfirmationStatus,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE confirmations SET status = ? WHERE client_id = ? AND id = ? AND status = ?",
            params![to.as_str(), client_id, id, from.as_str()],
        )?;

        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "confirmation {} is no longer {}",
                id, from
            )));
        }
        Ok(())
    }

    /// Active match held by another confirmation with the same fingerprint
    pub fn find_active_match_for_fingerprint(
        &self,
        client_id: &str,
        fingerprint: &str,
        exclude_confirmation_id: i64,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                r#"
                SELECT m.id
                FROM matches m
                JOIN confirmations c ON c.id = m.confirmation_id
                WHERE m.client_id = ? AND m.reversed_at IS NULL
                  AND c.fingerprint = ? AND c.id != ?
                ORDER BY m.id
                LIMIT 1
                "#,
                params![client_id, fingerprint, exclude_confirmation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }
}
