//! Background maintenance: RDP revocation, geocode cache pruning and
//! SQLite backups on cron schedules.
//!
//! A single Tokio task wakes every `interval_secs` and runs, in order, the
//! jobs whose cron fired since they last ran. Jobs never overlap.

pub mod scheduler;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::MaintenanceConfig;
use crate::rdp::RdpService;
use crate::store::Store;

use scheduler::Timetable;

/// Everything the builtin tasks touch.
#[derive(Debug, Clone)]
pub struct MaintenanceDeps {
    /// Tick interval and task list.
    pub config: MaintenanceConfig,
    /// Local database.
    pub store: Store,
    /// RDP grants and firewall.
    pub rdp: RdpService,
    /// Geocode cache lifetime.
    pub geocode_ttl: chrono::Duration,
    /// Where backups are written.
    pub backups_dir: PathBuf,
}

/// Run the maintenance loop until `shutdown_rx` flips to true or closes.
pub async fn run_maintenance(deps: MaintenanceDeps, mut shutdown_rx: watch::Receiver<bool>) {
    let mut table = Timetable::new(&deps.config.tasks);
    let period = Duration::from_secs(deps.config.interval_secs.max(1));
    info!(period_secs = period.as_secs(), jobs = table.len(), "maintenance started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_tick(&deps, &mut table).await,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("maintenance stopped");
}

/// Run the jobs due now and log each outcome.
pub async fn run_tick(deps: &MaintenanceDeps, table: &mut Timetable) {
    for report in table.run_due(deps, chrono::Utc::now()).await {
        let elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX);
        match report.result {
            Ok(summary) => {
                info!(task = %report.name, elapsed_ms, %summary, "maintenance task done");
            }
            Err(error) => {
                warn!(task = %report.name, elapsed_ms, %error, "maintenance task failed");
            }
        }
    }
}
