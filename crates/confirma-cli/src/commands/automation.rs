//! Automation commands (settings, scheduled actions, sweep)

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;

use confirma_core::automation;
use confirma_core::db::Database;
use confirma_core::models::{ActionState, AutomationSettings, AutomationSettingsUpdate};
use confirma_core::{AutomationScheduler, EngineConfig, Notifier, NotifierClient, SweepReport};

use super::CLI_ACTOR;

fn print_settings(settings: &AutomationSettings) {
    let toggle = |on: bool| if on { "on" } else { "off" };
    println!("Automation for '{}':", settings.client_id);
    println!(
        "   Auto-confirm: {:<3} after {} min",
        toggle(settings.auto_confirm_enabled),
        settings.confirm_delay_minutes
    );
    println!(
        "   Auto-dispute: {:<3} after {} min",
        toggle(settings.auto_dispute_enabled),
        settings.dispute_delay_minutes
    );
}

pub fn cmd_settings_show(db: &Database, client_id: &str) -> Result<()> {
    print_settings(&db.get_automation_settings(client_id)?);
    Ok(())
}

pub fn cmd_settings_set(
    db: &Database,
    config: &EngineConfig,
    client_id: &str,
    update: &AutomationSettingsUpdate,
) -> Result<()> {
    let (settings, canceled) =
        automation::update_settings(db, client_id, update, &config.automation, Utc::now())?;

    db.log_audit(
        client_id,
        CLI_ACTOR,
        "update",
        Some("automation_settings"),
        None,
        Some(&format!(
            "confirm={}/{}m, dispute={}/{}m, canceled={}",
            settings.auto_confirm_enabled,
            settings.confirm_delay_minutes,
            settings.auto_dispute_enabled,
            settings.dispute_delay_minutes,
            canceled
        )),
    )?;

    print_settings(&settings);
    if canceled > 0 {
        println!("   Canceled {} scheduled action(s)", canceled);
    }
    Ok(())
}

pub fn cmd_actions_list(db: &Database, client_id: &str, state: Option<&str>) -> Result<()> {
    let state = state
        .map(str::parse::<ActionState>)
        .transpose()
        .map_err(|e| anyhow!(e))?;
    let actions = db.list_scheduled_actions(client_id, state)?;

    if actions.is_empty() {
        println!("No scheduled actions.");
        return Ok(());
    }

    println!(
        "{:>6}  {:>6}  {:<8} {:<19}  {:<10} {}",
        "ID", "Match", "Kind", "Fire at", "State", "Error"
    );
    println!("{}", "-".repeat(80));
    for a in &actions {
        println!(
            "{:>6}  {:>6}  {:<8} {:<19}  {:<10} {}",
            a.id,
            a.match_id,
            a.kind.as_str(),
            a.fire_at.format("%Y-%m-%d %H:%M:%S"),
            a.state,
            a.last_error.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

pub fn cmd_actions_cancel(db: &Database, client_id: &str, id: i64) -> Result<()> {
    if !db.cancel_action(client_id, id, Utc::now())? {
        println!("Action #{} already fired or canceled", id);
        return Ok(());
    }

    db.log_audit(
        client_id,
        CLI_ACTOR,
        "cancel",
        Some("scheduled_action"),
        Some(id),
        None,
    )?;
    println!("🛑 Action #{} canceled", id);
    Ok(())
}

/// Run one sweep with the given notifier
pub async fn run_sweep(db: &Database, notifier: Arc<dyn Notifier>) -> Result<SweepReport> {
    let scheduler = AutomationScheduler::new(db.clone(), notifier);
    Ok(scheduler.run_due(Utc::now()).await?)
}

pub async fn cmd_sweep(db: &Database) -> Result<()> {
    let notifier: Arc<dyn Notifier> = Arc::new(NotifierClient::from_env());
    println!("⏰ Sweeping due actions (notifier: {})...", notifier.name());

    let report = run_sweep(db, notifier).await?;

    println!("   Due:        {}", report.due);
    println!("   Fired:      {}", report.fired);
    if report.failed > 0 {
        println!("   ⚠️  Failed:  {} (see `confirma audit`)", report.failed);
    }
    if report.stale > 0 {
        println!("   Stale:      {} (canceled)", report.stale);
    }
    if report.suppressed > 0 {
        println!("   Suppressed: {}", report.suppressed);
    }

    Ok(())
}
