//! Notification planning.
//!
//! A replan rebuilds the complete trigger set for the horizon and
//! reconciles it with what the device has scheduled. Triggers carry the
//! epoch of the cycle that produced them: the new epoch is scheduled
//! first and only then are older leftovers swept, so an interrupted
//! cycle leaves either the old or the new set in place.

pub mod sink;
pub mod trigger;

pub use sink::{BatchOutcome, NotificationSink};
pub use trigger::{
    build_triggers, fire_instant, stable_trigger_id, NotificationTrigger, TriggerPayload,
    TEST_NOTIFICATION_ID, TRIGGER_ID_OFFSET,
};

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::error::{CoreError, Result};
use crate::storage::{load_view, or_default, RoomChangeStore};

/// Planner settings, the `[planner]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Days planned ahead, today included.
    ///
    /// Trigger ids of weekly rules do not include the date, so a weekly
    /// rule is planned once, on its nearest date. Beyond 7 days later
    /// weeks are dropped; they are picked up by a later replan.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    /// Lead before an overridden slot starts.
    #[serde(default = "default_lead_minutes")]
    pub lead_minutes: i64,
    /// Alert time for the first class hour.
    #[serde(default = "default_first_hour_alert", with = "crate::timeslot::hhmm")]
    pub first_hour_alert: NaiveTime,
    #[serde(default = "default_rearm_cooldown_hours")]
    pub rearm_cooldown_hours: i64,
}

fn default_horizon_days() -> u32 {
    7
}
fn default_lead_minutes() -> i64 {
    10
}
fn default_first_hour_alert() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 50, 0).unwrap_or(NaiveTime::MIN)
}
fn default_rearm_cooldown_hours() -> i64 {
    12
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            lead_minutes: default_lead_minutes(),
            first_hour_alert: default_first_hour_alert(),
            rearm_cooldown_hours: default_rearm_cooldown_hours(),
        }
    }
}

/// Where a replan cycle currently is.
///
/// A cycle runs `Building → Scheduling → Sweeping` and returns to `Idle`.
/// Disabling skips straight to `Sweeping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerPhase {
    Idle,
    Building,
    Scheduling,
    Sweeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanOutcome {
    /// The trigger set was rebuilt.
    Planned,
    /// Notifications are off; everything scheduled was cancelled.
    Disabled,
}

/// Summary of one replan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplanReport {
    pub outcome: ReplanOutcome,
    pub epoch: u64,
    pub planned: usize,
    pub scheduled: usize,
    pub failed: usize,
    pub swept: usize,
}

impl ReplanReport {
    fn disabled() -> Self {
        Self {
            outcome: ReplanOutcome::Disabled,
            epoch: 0,
            planned: 0,
            scheduled: 0,
            failed: 0,
            swept: 0,
        }
    }
}

pub struct NotificationPlanner {
    store: Arc<dyn RoomChangeStore>,
    sink: Arc<dyn NotificationSink>,
    config: PlannerConfig,
    /// Held for a whole cycle so replans never interleave.
    cycle: Mutex<()>,
    phase: watch::Sender<PlannerPhase>,
}

impl NotificationPlanner {
    pub fn new(
        store: Arc<dyn RoomChangeStore>,
        sink: Arc<dyn NotificationSink>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
            cycle: Mutex::new(()),
            phase: watch::channel(PlannerPhase::Idle).0,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Current phase of the running cycle, `Idle` between cycles.
    pub fn phase(&self) -> PlannerPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<PlannerPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: PlannerPhase) {
        tracing::trace!(?phase, "Planner phase");
        self.phase.send_replace(phase);
    }

    /// Runs a full replan cycle.
    ///
    /// A replan requested while another is running waits for it.
    ///
    /// # Errors
    /// [`CoreError::PermissionDenied`] when notifications are enabled but
    /// not permitted; the device schedule is left untouched. A
    /// [`CoreError::Scheduling`] when the sink can neither list nor clear
    /// its schedule.
    pub async fn replan(&self, now: NaiveDateTime) -> Result<ReplanReport> {
        let _cycle = self.cycle.lock().await;
        let result = self.run_cycle(now).await;
        self.enter(PlannerPhase::Idle);
        result
    }

    /// Replans only when the re-arm cooldown has passed since the last
    /// successful replan. Returns `None` when nothing was done.
    pub async fn replan_if_due(&self, now: NaiveDateTime) -> Result<Option<ReplanReport>> {
        let last = or_default("last replan", self.store.get_last_replan().await);
        if let Some(last) = last {
            let since = now - last;
            if since >= Duration::zero() && since < Duration::hours(self.config.rearm_cooldown_hours)
            {
                tracing::debug!(%last, "Replan not due yet");
                return Ok(None);
            }
        }
        self.replan(now).await.map(Some)
    }

    /// Schedules the fixed-id test notification a few seconds from `now`.
    pub async fn send_test(&self, now: NaiveDateTime) -> Result<NotificationTrigger> {
        if !self.sink.permission_granted().await {
            return Err(CoreError::PermissionDenied);
        }
        let trigger = trigger::test_trigger(now);
        self.sink.schedule(&trigger).await?;
        tracing::info!(fire_at = %trigger.fire_at, "Test notification scheduled");
        Ok(trigger)
    }

    async fn run_cycle(&self, now: NaiveDateTime) -> Result<ReplanReport> {
        let enabled = or_default(
            "notifications enabled",
            self.store.get_notifications_enabled().await,
        );
        if !enabled {
            self.enter(PlannerPhase::Sweeping);
            if let Err(e) = self.sink.cancel_all().await {
                tracing::warn!(error = %e, "Failed to cancel notifications");
            }
            tracing::info!("Notifications disabled, schedule cleared");
            return Ok(ReplanReport::disabled());
        }

        if !self.sink.permission_granted().await {
            tracing::warn!("Notification permission not granted, replan aborted");
            return Err(CoreError::PermissionDenied);
        }

        self.enter(PlannerPhase::Building);
        let pending = match self.sink.pending().await {
            Ok(pending) => Some(pending),
            Err(e) => {
                tracing::warn!(error = %e, "Could not list pending notifications");
                None
            }
        };
        let newest_pending = pending
            .iter()
            .flatten()
            .map(|t| t.epoch)
            .max()
            .unwrap_or(0);
        let epoch = match self.sink.next_epoch().await {
            Ok(next) => next.max(newest_pending + 1),
            Err(_) => newest_pending + 1,
        };
        let view = load_view(self.store.as_ref()).await;
        let triggers = build_triggers(&view, now, &self.config, epoch);

        // Without a pending list there is nothing to sweep selectively.
        if pending.is_none() {
            self.sink.cancel_all().await?;
        }

        self.enter(PlannerPhase::Scheduling);
        let outcome = self.sink.schedule_batch(&triggers).await;

        self.enter(PlannerPhase::Sweeping);
        let planned_ids: BTreeSet<i32> = triggers.iter().map(|t| t.id).collect();
        let stale: Vec<i32> = pending
            .unwrap_or_default()
            .into_iter()
            .filter(|t| {
                t.id != TEST_NOTIFICATION_ID && t.epoch < epoch && !planned_ids.contains(&t.id)
            })
            .map(|t| t.id)
            .collect();
        let mut swept = stale.len();
        if !stale.is_empty() {
            if let Err(e) = self.sink.cancel(&stale).await {
                tracing::warn!(error = %e, count = stale.len(), "Failed to sweep stale notifications");
                swept = 0;
            }
        }

        if let Err(e) = self.store.set_last_replan(now).await {
            tracing::warn!(error = %e, "Failed to record replan time");
        }

        let report = ReplanReport {
            outcome: ReplanOutcome::Planned,
            epoch,
            planned: triggers.len(),
            scheduled: outcome.scheduled.len(),
            failed: outcome.failed.len(),
            swept,
        };
        tracing::info!(
            epoch,
            planned = report.planned,
            scheduled = report.scheduled,
            failed = report.failed,
            swept = report.swept,
            "Notifications replanned"
        );
        Ok(report)
    }
}
