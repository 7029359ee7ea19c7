//! Automation settings and scheduled actions

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Serialize;
use tracing::info;

use super::{format_datetime, parse_datetime, parse_optional_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{ActionKind, ActionState, AutomationSettings, ScheduledAction};

const ACTION_SELECT: &str = r#"
    SELECT id, client_id, match_id, kind, fire_at, state, fired_at, canceled_at, last_error, created_at
    FROM scheduled_actions
"#;

fn row_to_action(row: &Row<'_>) -> rusqlite::Result<ScheduledAction> {
    let kind: String = row.get(3)?;
    let fire_at: String = row.get(4)?;
    let state: String = row.get(5)?;
    let created_at: String = row.get(9)?;
    Ok(ScheduledAction {
        id: row.get(0)?,
        client_id: row.get(1)?,
        match_id: row.get(2)?,
        kind: kind.parse().unwrap_or(ActionKind::Dispute),
        fire_at: parse_datetime(&fire_at),
        state: state.parse().unwrap_or_default(),
        fired_at: parse_optional_datetime(row.get(6)?),
        canceled_at: parse_optional_datetime(row.get(7)?),
        last_error: row.get(8)?,
        created_at: parse_datetime(&created_at),
    })
}

/// Result of trying to fire a scheduled action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// This caller moved the action to `fired` and must notify
    Claimed,
    /// Another sweep fired it, or it was canceled first
    Lost,
    /// The match or trade moved on; the action was canceled instead
    Stale,
}

/// Settings as seen by `conn`, which may be an open transaction
pub(super) fn read_settings(conn: &Connection, client_id: &str) -> Result<AutomationSettings> {
    let settings = conn
        .query_row(
            r#"
            SELECT client_id, auto_confirm_enabled, confirm_delay_minutes,
                   auto_dispute_enabled, dispute_delay_minutes
            FROM automation_settings WHERE client_id = ?
            "#,
            params![client_id],
            |row| {
                Ok(AutomationSettings {
                    client_id: row.get(0)?,
                    auto_confirm_enabled: row.get(1)?,
                    confirm_delay_minutes: row.get(2)?,
                    auto_dispute_enabled: row.get(3)?,
                    dispute_delay_minutes: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(settings.unwrap_or_else(|| AutomationSettings::disabled(client_id)))
}

impl Database {
    /// Automation settings for a client (both disabled when never set)
    pub fn get_automation_settings(&self, client_id: &str) -> Result<AutomationSettings> {
        let conn = self.conn()?;
        read_settings(&conn, client_id)
    }

    /// Store settings; disabling a toggle cancels that kind's scheduled actions
    /// in the same transaction. Returns the number of canceled actions.
    ///
    /// Range validation of the delays belongs to `automation::update_settings`.
    pub fn save_automation_settings(
        &self,
        settings: &AutomationSettings,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            r#"
            INSERT INTO automation_settings (client_id, auto_confirm_enabled, confirm_delay_minutes,
                                             auto_dispute_enabled, dispute_delay_minutes, updated_at)
            VALUES (?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(client_id) DO UPDATE SET
                auto_confirm_enabled = excluded.auto_confirm_enabled,
                confirm_delay_minutes = excluded.confirm_delay_minutes,
                auto_dispute_enabled = excluded.auto_dispute_enabled,
                dispute_delay_minutes = excluded.dispute_delay_minutes,
                updated_at = excluded.updated_at
            "#,
            params![
                settings.client_id,
                settings.auto_confirm_enabled,
                settings.confirm_delay_minutes,
                settings.auto_dispute_enabled,
                settings.dispute_delay_minutes,
            ],
        )?;

        let now_str = format_datetime(&now);
        let mut canceled = 0;
        for (enabled, kind) in [
            (settings.auto_confirm_enabled, ActionKind::Confirm),
            (settings.auto_dispute_enabled, ActionKind::Dispute),
        ] {
            if !enabled {
                canceled += tx.execute(
                    "UPDATE scheduled_actions SET state = 'canceled', canceled_at = ?
                     WHERE client_id = ? AND kind = ? AND state = 'scheduled'",
                    params![now_str, settings.client_id, kind.as_str()],
                )?;
            }
        }

        tx.commit()?;

        if canceled > 0 {
            info!(
                "Canceled {} scheduled action(s) for client {} after disabling automation",
                canceled, settings.client_id
            );
        }
        Ok(canceled)
    }

    /// Get one scheduled action
    pub fn get_scheduled_action(&self, client_id: &str, id: i64) -> Result<Option<ScheduledAction>> {
        let conn = self.conn()?;
        let action = conn
            .query_row(
                &format!("{} WHERE client_id = ? AND id = ?", ACTION_SELECT),
                params![client_id, id],
                row_to_action,
            )
            .optional()?;
        Ok(action)
    }

    /// A client's scheduled actions, optionally filtered by state, soonest first
    pub fn list_scheduled_actions(
        &self,
        client_id: &str,
        state: Option<ActionState>,
    ) -> Result<Vec<ScheduledAction>> {
        let conn = self.conn()?;
        let actions = match state {
            Some(state) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? AND state = ? ORDER BY fire_at, id",
                    ACTION_SELECT
                ))?;
                let rows = stmt.query_map(params![client_id, state.as_str()], row_to_action)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE client_id = ? ORDER BY fire_at, id",
                    ACTION_SELECT
                ))?;
                let rows = stmt.query_map(params![client_id], row_to_action)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(actions)
    }

    /// Actions of a match
    pub fn list_actions_for_match(&self, match_id: i64) -> Result<Vec<ScheduledAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE match_id = ? ORDER BY id",
            ACTION_SELECT
        ))?;
        let actions = stmt
            .query_map(params![match_id], row_to_action)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(actions)
    }

    /// Scheduled actions due at `now`, across all clients, oldest first
    pub fn list_due_actions(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ScheduledAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE state = 'scheduled' AND fire_at <= ? ORDER BY fire_at, id LIMIT ?",
            ACTION_SELECT
        ))?;
        let actions = stmt
            .query_map(params![format_datetime(&now), limit], row_to_action)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(actions)
    }

    /// Earliest pending fire time, across all clients
    pub fn next_due_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let next: Option<String> = conn.query_row(
            "SELECT MIN(fire_at) FROM scheduled_actions WHERE state = 'scheduled'",
            [],
            |row| row.get(0),
        )?;
        Ok(next.map(|s| parse_datetime(&s)))
    }

    /// Fire an action: compare-and-swap `scheduled -> fired`.
    ///
    /// A confirm action also moves its trade `matched -> confirmed` in the same
    /// transaction. If the match was reversed, the trade left the status the
    /// action expects, or the client has since turned this automation off, the
    /// action is canceled instead and `Stale` returned.
    pub fn claim_action(&self, action: &ScheduledAction, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now_str = format_datetime(&now);

        let claimed = tx.execute(
            "UPDATE scheduled_actions SET state = 'fired', fired_at = ? WHERE id = ? AND state = 'scheduled'",
            params![now_str, action.id],
        )?;
        if claimed == 0 {
            return Ok(ClaimOutcome::Lost);
        }

        let target: Option<(i64, String)> = tx
            .query_row(
                r#"
                SELECT t.id, t.status FROM matches m
                JOIN trades t ON t.id = m.trade_id
                WHERE m.id = ? AND m.reversed_at IS NULL
                "#,
                params![action.match_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let expected = match action.kind {
            ActionKind::Confirm => "matched",
            ActionKind::Dispute => "disputed",
        };

        let settings = read_settings(&tx, &action.client_id)?;
        let enabled = match action.kind {
            ActionKind::Confirm => settings.auto_confirm_enabled,
            ActionKind::Dispute => settings.auto_dispute_enabled,
        };

        let valid = enabled && match &target {
            Some((trade_id, status)) if status == expected => {
                if action.kind == ActionKind::Confirm {
                    let updated = tx.execute(
                        "UPDATE trades SET status = 'confirmed', updated_at = datetime('now')
                         WHERE id = ? AND status = 'matched'",
                        params![trade_id],
                    )?;
                    updated == 1
                } else {
                    true
                }
            }
            _ => false,
        };

        if !valid {
            tx.execute(
                "UPDATE scheduled_actions SET state = 'canceled', fired_at = NULL, canceled_at = ?,
                     last_error = ?
                 WHERE id = ?",
                params![
                    now_str,
                    if enabled {
                        "match reversed or trade no longer awaiting this action"
                    } else {
                        "automation disabled before firing"
                    },
                    action.id
                ],
            )?;
            tx.commit()?;
            return Ok(ClaimOutcome::Stale);
        }

        tx.commit()?;
        Ok(ClaimOutcome::Claimed)
    }

    /// Cancel a scheduled action; returns false when it already fired or was canceled
    pub fn cancel_action(&self, client_id: &str, id: i64, now: DateTime<Utc>) -> Result<bool> {
        if self.get_scheduled_action(client_id, id)?.is_none() {
            return Err(Error::NotFound(format!("scheduled action {}", id)));
        }
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE scheduled_actions SET state = 'canceled', canceled_at = ?
             WHERE client_id = ? AND id = ? AND state = 'scheduled'",
            params![format_datetime(&now), client_id, id],
        )?;
        Ok(updated == 1)
    }

    /// Record a delivery failure on a fired action
    pub fn record_action_error(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scheduled_actions SET last_error = ? WHERE id = ?",
            params![error, id],
        )?;
        Ok(())
    }
}
