//! Match commit and reversal
//!
//! Both run as one immediate transaction: the match row, the trade status and
//! the confirmation status (plus any scheduled action) change together or not
//! at all. The automation settings that decide the scheduled action are read
//! inside the same transaction, so a concurrent settings change either sees
//! the new action (and cancels it) or is seen by the commit.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::info;

use super::automation::read_settings;
use super::{format_datetime, is_constraint_violation, parse_datetime, parse_optional_datetime, Database};
use crate::automation::plan_for_match;
use crate::error::{Error, Result};
use crate::models::{ConfirmationStatus, Match, NewMatch, ScheduledAction, TradeStatus};

const MATCH_SELECT: &str = r#"
    SELECT id, client_id, trade_id, confirmation_id, confidence, classification,
           differing_fields, resolved_by, created_at, reversed_at, confirmation_prior_status
    FROM matches
"#;

fn row_to_match(row: &Row<'_>) -> rusqlite::Result<Match> {
    let confidence: i64 = row.get(4)?;
    let classification: String = row.get(5)?;
    let differing: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let reversed_at: Option<String> = row.get(9)?;
    let prior: String = row.get(10)?;
    Ok(Match {
        id: row.get(0)?,
        client_id: row.get(1)?,
        trade_id: row.get(2)?,
        confirmation_id: row.get(3)?,
        confidence: confidence.clamp(0, 100) as u8,
        classification: classification
            .parse()
            .unwrap_or(crate::models::MatchClassification::Disputed),
        differing_fields: serde_json::from_str(&differing).unwrap_or_default(),
        resolved_by: row.get(7)?,
        created_at: parse_datetime(&created_at),
        reversed_at: parse_optional_datetime(reversed_at),
        confirmation_prior_status: prior.parse().unwrap_or_default(),
    })
}

/// Result of reversing a match
#[derive(Debug, Clone, serde::Serialize)]
pub struct Reversal {
    #[serde(rename = "match")]
    pub reversed: Match,
    /// Scheduled actions canceled with the match
    pub canceled_actions: usize,
}

impl Database {
    /// Atomically create a match, move the trade and confirmation to their
    /// matched statuses and schedule the action the client's current
    /// automation settings call for, timed from `now`.
    ///
    /// Fails with `ConcurrentModification` (and changes nothing) when the trade
    /// is no longer unmatched, the confirmation is no longer open, either side
    /// already has an active match, or another confirmation with the same
    /// fingerprint was matched in the meantime.
    pub fn commit_match(
        &self,
        client_id: &str,
        new_match: &NewMatch,
        now: DateTime<Utc>,
    ) -> Result<(Match, Option<ScheduledAction>)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let confirmation: Option<(String, String)> = tx
            .query_row(
                "SELECT status, fingerprint FROM confirmations WHERE client_id = ? AND id = ?",
                params![client_id, new_match.confirmation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (prior_status, fingerprint) = confirmation.ok_or_else(|| {
            Error::NotFound(format!("confirmation {}", new_match.confirmation_id))
        })?;
        let prior_status: ConfirmationStatus = prior_status.parse().unwrap_or_default();
        if !prior_status.is_open() {
            return Err(Error::ConcurrentModification(format!(
                "confirmation {} is already {}",
                new_match.confirmation_id, prior_status
            )));
        }

        let duplicate_of: Option<i64> = tx
            .query_row(
                r#"
                SELECT m.id FROM matches m
                JOIN confirmations c ON c.id = m.confirmation_id
                WHERE m.client_id = ? AND m.reversed_at IS NULL AND c.fingerprint = ? AND c.id != ?
                LIMIT 1
                "#,
                params![client_id, fingerprint, new_match.confirmation_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = duplicate_of {
            return Err(Error::ConcurrentModification(format!(
                "confirmation {} duplicates active match {}",
                new_match.confirmation_id, existing
            )));
        }

        let differing = serde_json::to_string(&new_match.differing_fields)?;
        let inserted = tx.execute(
            r#"
            INSERT INTO matches (client_id, trade_id, confirmation_id, confidence, classification,
                                 differing_fields, resolved_by, confirmation_prior_status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                client_id,
                new_match.trade_id,
                new_match.confirmation_id,
                new_match.confidence as i64,
                new_match.classification.as_str(),
                differing,
                new_match.resolved_by,
                prior_status.as_str(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(Error::ConcurrentModification(format!(
                    "trade {} or confirmation {} already has an active match",
                    new_match.trade_id, new_match.confirmation_id
                )));
            }
            Err(e) => return Err(e.into()),
        }
        let match_id = tx.last_insert_rowid();

        let trade_status = new_match.classification.trade_status();
        let updated = tx.execute(
            "UPDATE trades SET status = ?, updated_at = datetime('now')
             WHERE client_id = ? AND id = ? AND status = 'unmatched'",
            params![trade_status.as_str(), client_id, new_match.trade_id],
        )?;
        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "trade {} is no longer unmatched",
                new_match.trade_id
            )));
        }

        let updated = tx.execute(
            "UPDATE confirmations SET status = 'matched' WHERE client_id = ? AND id = ? AND status = ?",
            params![client_id, new_match.confirmation_id, prior_status.as_str()],
        )?;
        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "confirmation {} changed status during matching",
                new_match.confirmation_id
            )));
        }

        let settings = read_settings(&tx, client_id)?;
        let action_id = match plan_for_match(&settings, new_match.classification, now) {
            Some(plan) => {
                tx.execute(
                    "INSERT INTO scheduled_actions (client_id, match_id, kind, fire_at) VALUES (?, ?, ?, ?)",
                    params![client_id, match_id, plan.kind.as_str(), format_datetime(&plan.fire_at)],
                )?;
                Some(tx.last_insert_rowid())
            }
            None => None,
        };

        tx.commit()?;

        info!(
            "Committed match {} (trade {} <-> confirmation {}, confidence {}, {})",
            match_id,
            new_match.trade_id,
            new_match.confirmation_id,
            new_match.confidence,
            new_match.classification
        );

        let committed = self
            .get_match(client_id, match_id)?
            .ok_or_else(|| Error::NotFound(format!("match {}", match_id)))?;
        let action = match action_id {
            Some(id) => self.get_scheduled_action(client_id, id)?,
            None => None,
        };
        Ok((committed, action))
    }

    /// Get a match by id (active or reversed)
    pub fn get_match(&self, client_id: &str, id: i64) -> Result<Option<Match>> {
        let conn = self.conn()?;
        let m = conn
            .query_row(
                &format!("{} WHERE client_id = ? AND id = ?", MATCH_SELECT),
                params![client_id, id],
                row_to_match,
            )
            .optional()?;
        Ok(m)
    }

    /// Get a match by id or fail with `NotFound`
    pub fn require_match(&self, client_id: &str, id: i64) -> Result<Match> {
        self.get_match(client_id, id)?
            .ok_or_else(|| Error::NotFound(format!("match {} for client {}", id, client_id)))
    }

    /// List a client's matches, newest first
    pub fn list_matches(&self, client_id: &str, include_reversed: bool) -> Result<Vec<Match>> {
        let conn = self.conn()?;
        let sql = if include_reversed {
            format!("{} WHERE client_id = ? ORDER BY id DESC", MATCH_SELECT)
        } else {
            format!(
                "{} WHERE client_id = ? AND reversed_at IS NULL ORDER BY id DESC",
                MATCH_SELECT
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let matches = stmt
            .query_map(params![client_id], row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    /// Number of active matches referencing a trade
    pub fn count_active_matches_for_trade(&self, trade_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM matches WHERE trade_id = ? AND reversed_at IS NULL",
            params![trade_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Active match for a trade, if any
    pub fn get_active_match_for_trade(&self, client_id: &str, trade_id: i64) -> Result<Option<Match>> {
        let conn = self.conn()?;
        let m = conn
            .query_row(
                &format!(
                    "{} WHERE client_id = ? AND trade_id = ? AND reversed_at IS NULL",
                    MATCH_SELECT
                ),
                params![client_id, trade_id],
                row_to_match,
            )
            .optional()?;
        Ok(m)
    }

    /// Reverse an active match: the trade goes back to `unmatched`, the
    /// confirmation to its pre-match status, and scheduled actions are canceled.
    pub fn reverse_match(&self, client_id: &str, match_id: i64, now: DateTime<Utc>) -> Result<Reversal> {
        let existing = self.require_match(client_id, match_id)?;
        if !existing.is_active() {
            return Err(Error::InvalidData(format!(
                "match {} is already reversed",
                match_id
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now_str = format_datetime(&now);

        let trade_status: String = tx.query_row(
            "SELECT status FROM trades WHERE client_id = ? AND id = ?",
            params![client_id, existing.trade_id],
            |row| row.get(0),
        )?;
        let trade_status: TradeStatus = trade_status.parse().unwrap_or_default();
        if trade_status.is_terminal() {
            return Err(Error::InvalidData(format!(
                "trade {} is already {}; its match can no longer be reversed",
                existing.trade_id, trade_status
            )));
        }

        let updated = tx.execute(
            "UPDATE matches SET reversed_at = ? WHERE client_id = ? AND id = ? AND reversed_at IS NULL",
            params![now_str, client_id, match_id],
        )?;
        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "match {} was reversed concurrently",
                match_id
            )));
        }

        let updated = tx.execute(
            "UPDATE trades SET status = 'unmatched', updated_at = datetime('now')
             WHERE client_id = ? AND id = ? AND status = ?",
            params![client_id, existing.trade_id, trade_status.as_str()],
        )?;
        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "trade {} changed status during reversal",
                existing.trade_id
            )));
        }

        let updated = tx.execute(
            "UPDATE confirmations SET status = ? WHERE client_id = ? AND id = ? AND status = 'matched'",
            params![
                existing.confirmation_prior_status.as_str(),
                client_id,
                existing.confirmation_id
            ],
        )?;
        if updated == 0 {
            return Err(Error::ConcurrentModification(format!(
                "confirmation {} changed status during reversal",
                existing.confirmation_id
            )));
        }

        let canceled_actions = tx.execute(
            "UPDATE scheduled_actions SET state = 'canceled', canceled_at = ?
             WHERE match_id = ? AND state = 'scheduled'",
            params![now_str, match_id],
        )?;

        tx.commit()?;

        info!(
            "Reversed match {} (trade {}, confirmation {}), canceled {} scheduled action(s)",
            match_id, existing.trade_id, existing.confirmation_id, canceled_actions
        );

        Ok(Reversal {
            reversed: self.require_match(client_id, match_id)?,
            canceled_actions,
        })
    }
}
