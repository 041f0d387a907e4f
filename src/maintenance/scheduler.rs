//! Parsed cron timetable and builtin dispatch.

use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{debug, warn};

use crate::config::{Builtin, ScheduledTask};

use super::MaintenanceDeps;

struct Job {
    name: String,
    builtin: Builtin,
    schedule: Schedule,
    last_run: Option<DateTime<Utc>>,
}

impl Job {
    /// A job that never ran counts from the epoch, so it fires on the
    /// first tick.
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        let since = self.last_run.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        self.schedule
            .after(&since)
            .next()
            .is_some_and(|fire| fire <= now)
    }
}

/// Result of one job run.
#[derive(Debug)]
pub struct JobReport {
    /// Job name.
    pub name: String,
    /// Summary on success, error chain on failure.
    pub result: Result<String, String>,
    /// How long the job took.
    pub elapsed: Duration,
}

/// The enabled jobs with their parsed schedules and last runs.
pub struct Timetable {
    jobs: Vec<Job>,
}

impl std::fmt::Debug for Timetable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.jobs.iter().map(|j| &j.name))
            .finish()
    }
}

impl Timetable {
    /// Parse every enabled task. Tasks with an invalid cron expression are
    /// dropped with a warning.
    pub fn new(tasks: &[ScheduledTask]) -> Self {
        let jobs = tasks
            .iter()
            .filter(|task| task.enabled)
            .filter_map(|task| match Schedule::from_str(&task.cron) {
                Ok(schedule) => Some(Job {
                    name: task.name.clone(),
                    builtin: task.builtin,
                    schedule,
                    last_run: None,
                }),
                Err(e) => {
                    warn!(task = %task.name, cron = %task.cron, error = %e, "invalid cron expression, task disabled");
                    None
                }
            })
            .collect();
        Self { jobs }
    }

    /// Number of scheduled jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Names of the jobs due at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|job| job.is_due(now))
            .map(|job| job.name.as_str())
            .collect()
    }

    /// When `name` last ran.
    pub fn last_run(&self, name: &str) -> Option<DateTime<Utc>> {
        self.jobs
            .iter()
            .find(|job| job.name == name)
            .and_then(|job| job.last_run)
    }

    /// Record a run of `name` at `at`.
    pub fn mark_run(&mut self, name: &str, at: DateTime<Utc>) {
        if let Some(job) = self.jobs.iter_mut().find(|job| job.name == name) {
            job.last_run = Some(at);
        }
    }

    /// Run every job due at `now`, one after another. A job's run is
    /// recorded whether or not it succeeded.
    pub async fn run_due(&mut self, deps: &MaintenanceDeps, now: DateTime<Utc>) -> Vec<JobReport> {
        let mut reports = Vec::new();
        for job in self.jobs.iter_mut().filter(|job| job.is_due(now)) {
            debug!(task = %job.name, "running maintenance task");
            let started = Instant::now();
            let result = run_builtin(job.builtin, deps)
                .await
                .map_err(|e| format!("{e:#}"));
            job.last_run = Some(Utc::now());
            reports.push(JobReport {
                name: job.name.clone(),
                result,
                elapsed: started.elapsed(),
            });
        }
        reports
    }
}

/// Run one builtin and describe what it did.
///
/// # Errors
///
/// Returns the underlying store or firewall error.
pub async fn run_builtin(builtin: Builtin, deps: &MaintenanceDeps) -> anyhow::Result<String> {
    match builtin {
        Builtin::RevokeRdp => {
            let revoked = deps.rdp.revoke_expired(Utc::now()).await?;
            Ok(format!("{revoked} RDP grants revoked"))
        }
        Builtin::PruneGeocode => {
            let removed = deps
                .store
                .prune_geocode_cache(deps.geocode_ttl, Utc::now())
                .await?;
            Ok(format!("{removed} geocode entries pruned"))
        }
        Builtin::Backup => {
            let snapshot = deps.store.backup_into(&deps.backups_dir).await?;
            Ok(format!(
                "backup created at {} ({} bytes)",
                snapshot.backup_dir.display(),
                snapshot.size_bytes
            ))
        }
    }
}
