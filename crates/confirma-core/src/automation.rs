//! Deferred automation: scheduling and firing confirm/dispute notifications
//!
//! Per match the action state machine is `scheduled -> fired | canceled`.
//! Both transitions are conditional writes on `state = 'scheduled'`, so a
//! canceled action never fires and concurrent sweeps fire an action at most
//! once. Delivery happens after the state write; a failed delivery leaves the
//! action `fired` and is reported, never retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AutomationConfig;
use crate::db::{ClaimOutcome, Database};
use crate::error::{Error, Result};
use crate::models::{
    ActionKind, AutomationSettings, AutomationSettingsUpdate, MatchClassification, PlannedAction,
};
use crate::notify::Notifier;

/// Due actions handled per sweep
const SWEEP_BATCH: i64 = 200;

/// The action a freshly committed match should schedule, if any.
///
/// Confirmed matches schedule a confirm when auto-confirm is on; disputed
/// matches schedule a dispute when auto-dispute is on.
pub fn plan_for_match(
    settings: &AutomationSettings,
    classification: MatchClassification,
    now: DateTime<Utc>,
) -> Option<PlannedAction> {
    let (enabled, delay, kind) = match classification {
        MatchClassification::Confirmed => (
            settings.auto_confirm_enabled,
            settings.confirm_delay_minutes,
            ActionKind::Confirm,
        ),
        MatchClassification::Disputed => (
            settings.auto_dispute_enabled,
            settings.dispute_delay_minutes,
            ActionKind::Dispute,
        ),
    };

    enabled.then(|| PlannedAction {
        kind,
        fire_at: now + chrono::Duration::minutes(delay.max(0)),
    })
}

/// Reject delays outside 0..=max_delay_minutes
pub fn validate_settings(settings: &AutomationSettings, config: &AutomationConfig) -> Result<()> {
    for (name, delay) in [
        ("confirm_delay_minutes", settings.confirm_delay_minutes),
        ("dispute_delay_minutes", settings.dispute_delay_minutes),
    ] {
        if !(0..=config.max_delay_minutes).contains(&delay) {
            return Err(Error::InvalidData(format!(
                "{} must be between 0 and {}, got {}",
                name, config.max_delay_minutes, delay
            )));
        }
    }
    Ok(())
}

/// Apply a partial settings update.
///
/// Returns the stored settings and how many scheduled actions were canceled
/// because their toggle was turned off.
pub fn update_settings(
    db: &Database,
    client_id: &str,
    update: &AutomationSettingsUpdate,
    config: &AutomationConfig,
    now: DateTime<Utc>,
) -> Result<(AutomationSettings, usize)> {
    let mut settings = db.get_automation_settings(client_id)?;

    if let Some(v) = update.auto_confirm_enabled {
        settings.auto_confirm_enabled = v;
    }
    if let Some(v) = update.confirm_delay_minutes {
        settings.confirm_delay_minutes = v;
    }
    if let Some(v) = update.auto_dispute_enabled {
        settings.auto_dispute_enabled = v;
    }
    if let Some(v) = update.dispute_delay_minutes {
        settings.dispute_delay_minutes = v;
    }

    validate_settings(&settings, config)?;
    let canceled = db.save_automation_settings(&settings, now)?;
    Ok((settings, canceled))
}

/// Outcome counts of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Due actions examined
    pub due: usize,
    /// Claimed and delivered
    pub fired: usize,
    /// Claimed but delivery failed (stays fired)
    pub failed: usize,
    /// Lost the claim to another sweep or a cancellation
    pub suppressed: usize,
    /// Canceled at fire time because the match or trade moved on, or the
    /// client turned the automation off
    pub stale: usize,
}

/// Fires due scheduled actions through a notifier
pub struct AutomationScheduler {
    db: Database,
    notifier: Arc<dyn Notifier>,
}

impl AutomationScheduler {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Fire every action due at `now`
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let due = self.db.list_due_actions(now, SWEEP_BATCH)?;
        let mut report = SweepReport {
            due: due.len(),
            ..Default::default()
        };

        for action in due {
            match self.db.claim_action(&action, now)? {
                ClaimOutcome::Lost => {
                    // Not an error: a cancellation or another sweep won the CAS
                    info!(
                        "Scheduled action {} ({} for match {}) already taken, suppressed",
                        action.id, action.kind, action.match_id
                    );
                    report.suppressed += 1;
                }
                ClaimOutcome::Stale => {
                    warn!(
                        "Scheduled action {} ({} for match {}) canceled at fire time: match moved on or automation disabled",
                        action.id, action.kind, action.match_id
                    );
                    report.stale += 1;
                }
                ClaimOutcome::Claimed => {
                    match self
                        .notifier
                        .send_notification(action.kind, action.match_id)
                        .await
                    {
                        Ok(()) => {
                            info!(
                                "Fired {} for match {} (action {}) via {}",
                                action.kind,
                                action.match_id,
                                action.id,
                                self.notifier.name()
                            );
                            self.db.log_audit(
                                &action.client_id,
                                "scheduler",
                                "action_fired",
                                Some("scheduled_action"),
                                Some(action.id),
                                Some(&format!("{} match {}", action.kind, action.match_id)),
                            )?;
                            report.fired += 1;
                        }
                        Err(e) => {
                            let message = e.to_string();
                            error!(
                                "Notification for action {} ({} match {}) failed: {}",
                                action.id, action.kind, action.match_id, message
                            );
                            self.db.record_action_error(action.id, &message)?;
                            self.db.log_audit(
                                &action.client_id,
                                "scheduler",
                                "notification_failed",
                                Some("scheduled_action"),
                                Some(action.id),
                                Some(&message),
                            )?;
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if report.due > 0 {
            debug!("Sweep report: {:?}", report);
        }
        Ok(report)
    }

    /// How long to sleep before the next sweep: until the next due action,
    /// capped at the configured interval
    pub fn next_wait(&self, now: DateTime<Utc>, interval: Duration) -> Result<Duration> {
        let next = self.db.next_due_at()?;
        Ok(wait_until(next, now, interval))
    }
}

fn wait_until(next: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> Duration {
    match next {
        Some(at) if at <= now => Duration::ZERO,
        Some(at) => (at - now).to_std().map(|d| d.min(interval)).unwrap_or(interval),
        None => interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(confirm: bool, dispute: bool) -> AutomationSettings {
        AutomationSettings {
            client_id: "acme".into(),
            auto_confirm_enabled: confirm,
            confirm_delay_minutes: 15,
            auto_dispute_enabled: dispute,
            dispute_delay_minutes: 60,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_plan_confirm_after_delay() {
        let plan = plan_for_match(&settings(true, false), MatchClassification::Confirmed, now())
            .unwrap();
        assert_eq!(plan.kind, ActionKind::Confirm);
        assert_eq!(plan.fire_at, now() + chrono::Duration::minutes(15));
    }

    #[test]
    fn test_plan_respects_toggles() {
        assert!(
            plan_for_match(&settings(true, false), MatchClassification::Disputed, now()).is_none()
        );
        assert!(
            plan_for_match(&settings(false, true), MatchClassification::Confirmed, now()).is_none()
        );
        let plan =
            plan_for_match(&settings(false, true), MatchClassification::Disputed, now()).unwrap();
        assert_eq!(plan.kind, ActionKind::Dispute);
    }

    #[test]
    fn test_validate_delay_range() {
        let config = AutomationConfig::default();
        assert!(validate_settings(&settings(true, true), &config).is_ok());

        let mut s = settings(true, true);
        s.confirm_delay_minutes = 1441;
        assert!(matches!(
            validate_settings(&s, &config),
            Err(Error::InvalidData(_))
        ));

        s.confirm_delay_minutes = -1;
        assert!(validate_settings(&s, &config).is_err());
    }

    #[test]
    fn test_wait_until() {
        let interval = Duration::from_secs(30);
        assert_eq!(wait_until(None, now(), interval), interval);
        assert_eq!(
            wait_until(Some(now() - chrono::Duration::seconds(5)), now(), interval),
            Duration::ZERO
        );
        assert_eq!(
            wait_until(Some(now() + chrono::Duration::seconds(10)), now(), interval),
            Duration::from_secs(10)
        );
        assert_eq!(
            wait_until(Some(now() + chrono::Duration::minutes(10)), now(), interval),
            interval
        );
    }
}
