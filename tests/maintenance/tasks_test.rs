//! Tests for the builtin maintenance tasks and the shutdown path.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::watch;

use feira::config::{Builtin, MaintenanceConfig, ScheduledTask};
use feira::maintenance::scheduler::Timetable;
use feira::maintenance::{run_maintenance, MaintenanceDeps};
use feira::rdp::{LogOnlyFirewall, RdpService};
use feira::store::Store;

fn task(name: &str, builtin: Builtin) -> ScheduledTask {
    ScheduledTask {
        name: name.to_owned(),
        cron: "0 * * * * *".to_owned(),
        builtin,
        enabled: true,
    }
}

async fn deps(backups_dir: std::path::PathBuf) -> MaintenanceDeps {
    let store = Store::open_in_memory().await.expect("should open");
    let rdp = RdpService::new(
        store.clone(),
        Arc::new(LogOnlyFirewall),
        3389,
        Duration::seconds(1),
    );
    MaintenanceDeps {
        config: MaintenanceConfig {
            interval_secs: 1,
            tasks: Vec::new(),
        },
        store,
        rdp,
        geocode_ttl: Duration::days(30),
        backups_dir,
    }
}

#[tokio::test]
async fn revoke_task_removes_expired_grants() {
    let dir = tempfile::tempdir().expect("should create dir");
    let deps = deps(dir.path().to_path_buf()).await;
    deps.rdp
        .grant(
            Ipv4Addr::new(10, 0, 0, 1),
            "joana",
            Utc::now() - Duration::hours(1),
        )
        .await
        .expect("should grant");

    let mut table = Timetable::new(&[task("revoke_rdp", Builtin::RevokeRdp)]);
    let reports = table.run_due(&deps, Utc::now()).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result.as_deref(), Ok("1 RDP grants revoked"));
    assert!(table.last_run("revoke_rdp").is_some());
}

#[tokio::test]
async fn prune_task_reports_removed_entries() {
    let dir = tempfile::tempdir().expect("should create dir");
    let deps = deps(dir.path().to_path_buf()).await;
    deps.store
        .store_coordinates("Rua A", 1.0, 1.0, Utc::now() - Duration::days(60))
        .await
        .expect("should seed");

    let mut table = Timetable::new(&[task("prune_geocode", Builtin::PruneGeocode)]);
    let reports = table.run_due(&deps, Utc::now()).await;
    assert_eq!(reports[0].result.as_deref(), Ok("1 geocode entries pruned"));
}

#[tokio::test]
async fn failed_backup_is_reported_and_still_recorded() {
    let dir = tempfile::tempdir().expect("should create dir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").expect("should write");
    let deps = deps(blocker).await;

    let mut table = Timetable::new(&[task("backup", Builtin::Backup)]);
    let reports = table.run_due(&deps, Utc::now()).await;

    assert!(reports[0].result.is_err());
    assert!(table.last_run("backup").is_some());
}

#[tokio::test]
async fn loop_stops_on_shutdown() {
    let dir = tempfile::tempdir().expect("should create dir");
    let deps = deps(dir.path().to_path_buf()).await;
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(run_maintenance(deps, rx));
    tx.send(true).expect("loop should be listening");

    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("loop should stop")
        .expect("loop should not panic");
}
