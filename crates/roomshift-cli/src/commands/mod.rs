pub mod agenda;
pub mod audience;
pub mod config;
pub mod day;
pub mod notes;
pub mod notify;
pub mod rules;
pub mod slots;

use chrono::NaiveDateTime;
use roomshift_core::calendar::local_now;
use roomshift_core::storage::SharedDatabase;
use roomshift_core::{
    Config, CoreError, Database, NotificationPlanner, OutboxSink, ReplanOutcome, ReplanReport,
    SqliteStore,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything a command needs: configuration, the database and "now".
pub struct Context {
    pub config: Config,
    pub now: NaiveDateTime,
    db: SharedDatabase,
}

impl Context {
    pub fn open(now: Option<NaiveDateTime>) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            config: Config::load()?,
            now: now.unwrap_or_else(local_now),
            db: Arc::new(Mutex::new(Database::open()?)),
        })
    }

    /// Locks the database. Drop the guard before awaiting the planner.
    pub fn db(&self) -> Result<MutexGuard<'_, Database>, Box<dyn std::error::Error>> {
        self.db.lock().map_err(|_| "database lock poisoned".into())
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(self.db.clone()))
    }

    pub fn sink(&self) -> Arc<OutboxSink> {
        Arc::new(OutboxSink::new(self.db.clone()))
    }

    pub fn planner(&self) -> NotificationPlanner {
        NotificationPlanner::new(self.store(), self.sink(), self.config.planner.clone())
    }

    /// Replans after a change to rules, slots or audience.
    ///
    /// The change itself is already saved, so failures only warn.
    pub async fn replan_after_change(&self) {
        match self.planner().replan(self.now).await {
            Ok(report) => tracing::debug!(?report, "Replanned after change"),
            Err(CoreError::PermissionDenied) => {
                eprintln!("warning: notification permission denied, nothing scheduled");
            }
            Err(e) => eprintln!("warning: replan failed: {e}"),
        }
    }
}

pub fn print_report(report: &ReplanReport) {
    match report.outcome {
        ReplanOutcome::Disabled => println!("notifications disabled, schedule cleared"),
        ReplanOutcome::Planned => {
            println!(
                "epoch {}: {} planned, {} scheduled, {} failed, {} stale removed",
                report.epoch, report.planned, report.scheduled, report.failed, report.swept
            );
        }
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
