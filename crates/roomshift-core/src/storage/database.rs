//! SQLite-based persistence.
//!
//! Provides persistent storage for:
//! - Key-value application state (rules, slots, audience, flags), stored as JSON
//! - The local outbox of scheduled notifications
//!
//! [`SqliteStore`] and [`OutboxSink`] share one [`Database`] and expose it
//! to the engine through its storage and notification traits.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{data_dir, RoomChangeStore};
use crate::audience::AudienceFilter;
use crate::error::{CoreError, DatabaseError, Result, SchedulingError};
use crate::planner::{NotificationSink, NotificationTrigger};
use crate::rule::ChangeRule;
use crate::timeslot::{IgnoredHours, TimeSlotOverrides};

const KEY_RULES: &str = "rules";
const KEY_OVERRIDES: &str = "time_slot_overrides";
const KEY_IGNORED: &str = "ignored_hours";
const KEY_AUDIENCE: &str = "audience_filter";
const KEY_NOTIFICATIONS: &str = "notifications_enabled";
const KEY_DISMISSED: &str = "dismissed_notes";
const KEY_LAST_REPLAN: &str = "last_replan";
const KEY_EPOCH: &str = "outbox_epoch";

const FIRE_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQLite database behind the store and the outbox.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/roomshift/roomshift.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("roomshift.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scheduled_notifications (
                id       INTEGER PRIMARY KEY,
                fire_at  TEXT NOT NULL,
                epoch    INTEGER NOT NULL,
                trigger  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scheduled_fire_at ON scheduled_notifications(fire_at);",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Decode a JSON value; a missing key yields the default.
    fn json_get<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.kv_get(key)? {
            None => Ok(T::default()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                DatabaseError::CorruptValue {
                    key: key.to_string(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }

    fn json_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.kv_set(key, &serde_json::to_string(value)?)?;
        Ok(())
    }

    pub fn rules(&self) -> Result<Vec<ChangeRule>> {
        self.json_get(KEY_RULES)
    }

    pub fn set_rules(&self, rules: &[ChangeRule]) -> Result<()> {
        self.json_set(KEY_RULES, rules)
    }

    pub fn overrides(&self) -> Result<TimeSlotOverrides> {
        self.json_get(KEY_OVERRIDES)
    }

    pub fn set_overrides(&self, overrides: &TimeSlotOverrides) -> Result<()> {
        self.json_set(KEY_OVERRIDES, overrides)
    }

    pub fn ignored_hours(&self) -> Result<IgnoredHours> {
        self.json_get(KEY_IGNORED)
    }

    pub fn set_ignored_hours(&self, ignored: &IgnoredHours) -> Result<()> {
        self.json_set(KEY_IGNORED, ignored)
    }

    pub fn audience_filter(&self) -> Result<AudienceFilter> {
        self.json_get(KEY_AUDIENCE)
    }

    pub fn set_audience_filter(&self, filter: &AudienceFilter) -> Result<()> {
        self.json_set(KEY_AUDIENCE, filter)
    }

    pub fn notifications_enabled(&self) -> Result<bool> {
        self.json_get(KEY_NOTIFICATIONS)
    }

    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.json_set(KEY_NOTIFICATIONS, &enabled)
    }

    pub fn dismissed_notes(&self) -> Result<BTreeSet<String>> {
        self.json_get(KEY_DISMISSED)
    }

    /// Adds a note id to the dismissed set. Returns false if it was
    /// already dismissed.
    pub fn dismiss_note(&self, note_id: &str) -> Result<bool> {
        let mut dismissed = self.dismissed_notes()?;
        let added = dismissed.insert(note_id.to_string());
        if added {
            self.json_set(KEY_DISMISSED, &dismissed)?;
        }
        Ok(added)
    }

    pub fn last_replan(&self) -> Result<Option<NaiveDateTime>> {
        self.json_get(KEY_LAST_REPLAN)
    }

    pub fn set_last_replan(&self, at: NaiveDateTime) -> Result<()> {
        self.json_set(KEY_LAST_REPLAN, &at)
    }

    /// Increments and returns the outbox epoch counter.
    pub fn bump_epoch(&self) -> Result<u64> {
        let next = self.json_get::<u64>(KEY_EPOCH)? + 1;
        self.json_set(KEY_EPOCH, &next)?;
        Ok(next)
    }

    /// Insert or replace a scheduled notification.
    pub fn outbox_put(&self, trigger: &NotificationTrigger) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO scheduled_notifications (id, fire_at, epoch, trigger)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                trigger.id,
                trigger.fire_at.format(FIRE_AT_FORMAT).to_string(),
                i64::try_from(trigger.epoch).unwrap_or(i64::MAX),
                serde_json::to_string(trigger)?,
            ],
        )?;
        Ok(())
    }

    /// Scheduled notifications ordered by fire instant.
    pub fn outbox_list(&self) -> Result<Vec<NotificationTrigger>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, trigger FROM scheduled_notifications ORDER BY fire_at, id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut triggers = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            let trigger = serde_json::from_str(&raw).map_err(|e| DatabaseError::CorruptValue {
                key: format!("scheduled_notifications/{id}"),
                message: e.to_string(),
            })?;
            triggers.push(trigger);
        }
        Ok(triggers)
    }

    pub fn outbox_delete(&self, ids: &[i32]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            removed += self
                .conn
                .execute("DELETE FROM scheduled_notifications WHERE id = ?1", params![id])?;
        }
        Ok(removed)
    }

    /// Removes and returns every notification due at `now`.
    pub fn outbox_take_due(&self, now: NaiveDateTime) -> Result<Vec<NotificationTrigger>> {
        let due: Vec<NotificationTrigger> = self
            .outbox_list()?
            .into_iter()
            .filter(|t| t.fire_at <= now)
            .collect();
        let ids: Vec<i32> = due.iter().map(|t| t.id).collect();
        self.outbox_delete(&ids)?;
        Ok(due)
    }
}

/// A database shared by the store and the outbox.
pub type SharedDatabase = Arc<Mutex<Database>>;

fn lock(db: &SharedDatabase) -> Result<MutexGuard<'_, Database>> {
    db.lock().map_err(|_| CoreError::Database(DatabaseError::Locked))
}

/// [`RoomChangeStore`] over the kv table.
pub struct SqliteStore {
    db: SharedDatabase,
}

impl SqliteStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    fn read<T>(&self, what: &str, get: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        lock(&self.db)
            .and_then(|db| get(&*db))
            .map_err(|e| CoreError::unavailable(what, e))
    }
}

/// Read failures surface as [`CoreError::DataUnavailable`] naming the
/// value that could not be read.
#[async_trait::async_trait]
impl RoomChangeStore for SqliteStore {
    async fn get_rules(&self) -> Result<Vec<ChangeRule>> {
        self.read("rules", Database::rules)
    }

    async fn get_overrides(&self) -> Result<TimeSlotOverrides> {
        self.read("time slot overrides", Database::overrides)
    }

    async fn get_ignored_hours(&self) -> Result<IgnoredHours> {
        self.read("ignored hours", Database::ignored_hours)
    }

    async fn get_audience_filter(&self) -> Result<AudienceFilter> {
        self.read("audience filter", Database::audience_filter)
    }

    async fn get_notifications_enabled(&self) -> Result<bool> {
        self.read("notifications enabled", Database::notifications_enabled)
    }

    async fn get_dismissed_notes(&self) -> Result<BTreeSet<String>> {
        self.read("dismissed notes", Database::dismissed_notes)
    }

    async fn get_last_replan(&self) -> Result<Option<NaiveDateTime>> {
        self.read("last replan", Database::last_replan)
    }

    async fn set_last_replan(&self, at: NaiveDateTime) -> Result<()> {
        lock(&self.db)?.set_last_replan(at)
    }
}

/// Notification sink that parks triggers in the `scheduled_notifications`
/// table until they are collected with [`OutboxSink::due`].
pub struct OutboxSink {
    db: SharedDatabase,
}

impl OutboxSink {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Removes and returns the triggers whose fire instant has passed.
    pub fn due(&self, now: NaiveDateTime) -> Result<Vec<NotificationTrigger>> {
        let due = lock(&self.db)?.outbox_take_due(now)?;
        if !due.is_empty() {
            tracing::info!(count = due.len(), "Delivered due notifications");
        }
        Ok(due)
    }

    fn unavailable(e: CoreError) -> SchedulingError {
        SchedulingError::Unavailable(e.to_string())
    }
}

#[async_trait::async_trait]
impl NotificationSink for OutboxSink {
    async fn permission_granted(&self) -> bool {
        true
    }

    async fn pending(&self) -> Result<Vec<NotificationTrigger>, SchedulingError> {
        lock(&self.db)
            .and_then(|db| db.outbox_list())
            .map_err(Self::unavailable)
    }

    async fn schedule(&self, trigger: &NotificationTrigger) -> Result<(), SchedulingError> {
        lock(&self.db)
            .and_then(|db| db.outbox_put(trigger))
            .map_err(|e| SchedulingError::Rejected {
                id: trigger.id,
                reason: e.to_string(),
            })
    }

    async fn cancel(&self, ids: &[i32]) -> Result<(), SchedulingError> {
        let removed = lock(&self.db)
            .and_then(|db| db.outbox_delete(ids))
            .map_err(Self::unavailable)?;
        tracing::debug!(requested = ids.len(), removed, "Cancelled notifications");
        Ok(())
    }

    async fn next_epoch(&self) -> Result<u64, SchedulingError> {
        lock(&self.db)
            .and_then(|db| db.bump_epoch())
            .map_err(Self::unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::TriggerPayload;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 8)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn trigger(id: i32, fire_at: NaiveDateTime) -> NotificationTrigger {
        NotificationTrigger {
            id,
            fire_at,
            title: "3. hour - room change".into(),
            body: "9.A - Kiss Péter → Room: 204 (09:50 - 10:30)".into(),
            payload: TriggerPayload {
                rule_id: "r".into(),
                class_hour: 3,
                date: "2025-01-08".into(),
            },
            epoch: 1,
        }
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "value").unwrap();
        assert_eq!(db.kv_get("test").unwrap().as_deref(), Some("value"));
        db.kv_set("test", "other").unwrap();
        assert_eq!(db.kv_get("test").unwrap().as_deref(), Some("other"));
    }

    #[test]
    fn missing_values_are_defaults() {
        let db = Database::open_memory().unwrap();
        assert!(db.rules().unwrap().is_empty());
        assert!(db.overrides().unwrap().is_empty());
        assert!(!db.notifications_enabled().unwrap());
        assert!(db.audience_filter().unwrap().is_empty());
        assert!(db.last_replan().unwrap().is_none());
    }

    #[test]
    fn corrupt_value_is_reported() {
        let db = Database::open_memory().unwrap();
        db.kv_set(KEY_RULES, "{not json").unwrap();
        assert!(matches!(
            db.rules(),
            Err(CoreError::Database(DatabaseError::CorruptValue { .. }))
        ));
    }

    #[test]
    fn typed_values_roundtrip() {
        let db = Database::open_memory().unwrap();
        db.set_notifications_enabled(true).unwrap();
        db.set_audience_filter(&AudienceFilter::teachers(["Kiss Péter"]))
            .unwrap();
        db.set_last_replan(at(7, 0)).unwrap();
        assert!(db.notifications_enabled().unwrap());
        assert_eq!(
            db.audience_filter().unwrap(),
            AudienceFilter::teachers(["Kiss Péter"])
        );
        assert_eq!(db.last_replan().unwrap(), Some(at(7, 0)));
    }

    #[test]
    fn dismiss_note_is_idempotent() {
        let db = Database::open_memory().unwrap();
        assert!(db.dismiss_note("2025-01-08_Bring_books").unwrap());
        assert!(!db.dismiss_note("2025-01-08_Bring_books").unwrap());
        assert_eq!(db.dismissed_notes().unwrap().len(), 1);
    }

    #[test]
    fn outbox_replaces_by_id_and_orders_by_fire_time() {
        let db = Database::open_memory().unwrap();
        db.outbox_put(&trigger(200_000, at(9, 35))).unwrap();
        db.outbox_put(&trigger(100_000, at(7, 50))).unwrap();
        db.outbox_put(&trigger(200_000, at(8, 40))).unwrap();
        let listed = db.outbox_list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, 100_000);
        assert_eq!(listed[1].fire_at, at(8, 40));
    }

    #[test]
    fn take_due_removes_only_past_triggers() {
        let db = Database::open_memory().unwrap();
        db.outbox_put(&trigger(1, at(7, 50))).unwrap();
        db.outbox_put(&trigger(2, at(9, 35))).unwrap();
        let due = db.outbox_take_due(at(8, 0)).unwrap();
        assert_eq!(due.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(db.outbox_list().unwrap().len(), 1);
    }

    #[test]
    fn epoch_counter_increases() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.bump_epoch().unwrap(), 1);
        assert_eq!(db.bump_epoch().unwrap(), 2);
    }

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roomshift.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.set_notifications_enabled(true).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert!(db.notifications_enabled().unwrap());
    }

    #[tokio::test]
    async fn corrupt_values_are_reported_unavailable() {
        let shared: SharedDatabase = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        shared.lock().unwrap().kv_set(KEY_RULES, "{not json").unwrap();
        let store = SqliteStore::new(shared);

        match store.get_rules().await {
            Err(CoreError::DataUnavailable { what, .. }) => assert_eq!(what, "rules"),
            other => panic!("expected unavailable rules, got {other:?}"),
        }
        assert!(store.get_overrides().await.unwrap().is_empty());
        assert!(crate::storage::load_view(&store).await.rules.is_empty());
    }

    #[tokio::test]
    async fn outbox_sink_cancel_all() {
        let shared: SharedDatabase = Arc::new(Mutex::new(Database::open_memory().unwrap()));
        let sink = OutboxSink::new(shared.clone());
        sink.schedule(&trigger(1, at(7, 50))).await.unwrap();
        sink.schedule(&trigger(2, at(9, 35))).await.unwrap();
        assert_eq!(sink.pending().await.unwrap().len(), 2);
        sink.cancel_all().await.unwrap();
        assert!(sink.pending().await.unwrap().is_empty());
    }
}
