//! Background sweeper for scheduled confirm/dispute actions
//!
//! Sleeps until the earliest due action or the configured sweep interval,
//! whichever comes first, then fires everything due. Several processes may
//! sweep the same database; the claim in the core guarantees each action
//! fires at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use confirma_core::{AutomationConfig, AutomationScheduler, Database, Notifier};

/// Lower bound between sweeps so a clock skew cannot spin the loop
const MIN_WAIT: Duration = Duration::from_millis(250);

/// Spawn the automation sweeper
pub fn start_automation_sweeper(
    db: Database,
    notifier: Arc<dyn Notifier>,
    config: AutomationConfig,
) -> JoinHandle<()> {
    let interval = config.sweep_interval();
    info!(
        "Automation sweeper started (interval {}s, notifier {})",
        interval.as_secs(),
        notifier.name()
    );

    tokio::spawn(async move {
        let scheduler = AutomationScheduler::new(db, notifier);

        loop {
            match scheduler.run_due(Utc::now()).await {
                Ok(report) if report.fired + report.failed + report.stale > 0 => {
                    info!(
                        "Sweep: {} fired, {} failed, {} stale, {} suppressed",
                        report.fired, report.failed, report.stale, report.suppressed
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Automation sweep failed: {}", e),
            }

            let wait = match scheduler.next_wait(Utc::now(), interval) {
                Ok(wait) => wait.max(MIN_WAIT),
                Err(e) => {
                    warn!("Could not compute next sweep time: {}", e);
                    interval
                }
            };
            tokio::time::sleep(wait).await;
        }
    })
}
