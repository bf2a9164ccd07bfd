mod config;
pub mod database;

pub use config::{Config, DisplayConfig, LogConfig};
pub use database::{Database, OutboxSink, SharedDatabase, SqliteStore};

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::audience::AudienceFilter;
use crate::error::Result;
use crate::occurrence::OccurrenceView;
use crate::rule::ChangeRule;
use crate::timeslot::{IgnoredHours, TimeSlotOverrides};

/// Persisted state the engine reads.
///
/// Absent values come back as the type's default; an `Err` means the
/// backend itself failed.
#[async_trait::async_trait]
pub trait RoomChangeStore: Send + Sync {
    async fn get_rules(&self) -> Result<Vec<ChangeRule>>;
    async fn get_overrides(&self) -> Result<TimeSlotOverrides>;
    async fn get_ignored_hours(&self) -> Result<IgnoredHours>;
    async fn get_audience_filter(&self) -> Result<AudienceFilter>;
    async fn get_notifications_enabled(&self) -> Result<bool>;
    async fn get_dismissed_notes(&self) -> Result<BTreeSet<String>>;
    async fn get_last_replan(&self) -> Result<Option<NaiveDateTime>>;
    async fn set_last_replan(&self, at: NaiveDateTime) -> Result<()>;
}

/// Unwraps a storage read, degrading failures to the default value.
pub fn or_default<T: Default>(what: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(what, error = %e, "Storage read failed, using default");
        T::default()
    })
}

/// Reads everything one occurrence computation needs.
pub async fn load_view(store: &dyn RoomChangeStore) -> OccurrenceView {
    OccurrenceView {
        rules: or_default("rules", store.get_rules().await),
        overrides: or_default("overrides", store.get_overrides().await),
        ignored: or_default("ignored hours", store.get_ignored_hours().await),
        filter: or_default("audience filter", store.get_audience_filter().await),
    }
}

/// Returns the roomshift data directory.
///
/// `ROOMSHIFT_DATA_DIR` wins outright. Otherwise `~/.config/roomshift/`,
/// or `~/.config/roomshift-dev/` when `ROOMSHIFT_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("ROOMSHIFT_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("ROOMSHIFT_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("roomshift-dev")
            } else {
                base_dir.join("roomshift")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
