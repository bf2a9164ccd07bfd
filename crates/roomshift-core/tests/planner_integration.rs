//! Replan cycles against in-memory store and sink fakes.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use roomshift_core::audience::AudienceFilter;
use roomshift_core::calendar::SchoolDay;
use roomshift_core::error::{CoreError, Result, SchedulingError};
use roomshift_core::planner::{
    stable_trigger_id, NotificationPlanner, NotificationSink, NotificationTrigger, PlannerConfig,
    PlannerPhase, ReplanOutcome, TEST_NOTIFICATION_ID,
};
use roomshift_core::rule::{ChangeRule, Recurrence};
use roomshift_core::storage::RoomChangeStore;
use roomshift_core::timeslot::{IgnoredHours, TimeSlotOverride, TimeSlotOverrides};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct StoreState {
    rules: Vec<ChangeRule>,
    overrides: TimeSlotOverrides,
    ignored: IgnoredHours,
    filter: AudienceFilter,
    enabled: bool,
    last_replan: Option<NaiveDateTime>,
    rules_unreadable: bool,
}

#[derive(Default)]
struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    fn with(rules: Vec<ChangeRule>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.rules = rules;
            state.filter = AudienceFilter::classes(["9.A"]);
            state.enabled = true;
        }
        store
    }

    fn edit(&self, f: impl FnOnce(&mut StoreState)) {
        f(&mut self.state.lock().unwrap());
    }
}

#[async_trait]
impl RoomChangeStore for FakeStore {
    async fn get_rules(&self) -> Result<Vec<ChangeRule>> {
        let state = self.state.lock().unwrap();
        if state.rules_unreadable {
            return Err(CoreError::unavailable("rules", "disk error"));
        }
        Ok(state.rules.clone())
    }

    async fn get_overrides(&self) -> Result<TimeSlotOverrides> {
        Ok(self.state.lock().unwrap().overrides.clone())
    }

    async fn get_ignored_hours(&self) -> Result<IgnoredHours> {
        Ok(self.state.lock().unwrap().ignored.clone())
    }

    async fn get_audience_filter(&self) -> Result<AudienceFilter> {
        Ok(self.state.lock().unwrap().filter.clone())
    }

    async fn get_notifications_enabled(&self) -> Result<bool> {
        Ok(self.state.lock().unwrap().enabled)
    }

    async fn get_dismissed_notes(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    async fn get_last_replan(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self.state.lock().unwrap().last_replan)
    }

    async fn set_last_replan(&self, at: NaiveDateTime) -> Result<()> {
        self.state.lock().unwrap().last_replan = Some(at);
        Ok(())
    }
}

struct FakeSink {
    scheduled: Mutex<BTreeMap<i32, NotificationTrigger>>,
    permission: bool,
    rejected: BTreeSet<i32>,
    pending_broken: bool,
    /// Planner phase seen by each sink call, once observed.
    phases: Mutex<Option<watch::Receiver<PlannerPhase>>>,
    calls: Mutex<Vec<(&'static str, PlannerPhase)>>,
}

impl FakeSink {
    fn new() -> Self {
        Self {
            scheduled: Mutex::new(BTreeMap::new()),
            permission: true,
            rejected: BTreeSet::new(),
            pending_broken: false,
            phases: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn observe(&self, phases: watch::Receiver<PlannerPhase>) {
        *self.phases.lock().unwrap() = Some(phases);
    }

    fn record(&self, call: &'static str) {
        if let Some(phases) = self.phases.lock().unwrap().as_ref() {
            let phase = *phases.borrow();
            self.calls.lock().unwrap().push((call, phase));
        }
    }

    fn calls(&self) -> Vec<(&'static str, PlannerPhase)> {
        self.calls.lock().unwrap().clone()
    }

    fn ids(&self) -> BTreeSet<i32> {
        self.scheduled.lock().unwrap().keys().copied().collect()
    }

    fn get(&self, id: i32) -> Option<NotificationTrigger> {
        self.scheduled.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl NotificationSink for FakeSink {
    async fn permission_granted(&self) -> bool {
        self.permission
    }

    async fn pending(&self) -> Result<Vec<NotificationTrigger>, SchedulingError> {
        self.record("pending");
        if self.pending_broken {
            return Err(SchedulingError::Unavailable("service down".into()));
        }
        Ok(self.scheduled.lock().unwrap().values().cloned().collect())
    }

    async fn schedule(&self, trigger: &NotificationTrigger) -> Result<(), SchedulingError> {
        self.record("schedule");
        if self.rejected.contains(&trigger.id) {
            return Err(SchedulingError::Rejected {
                id: trigger.id,
                reason: "quota".into(),
            });
        }
        self.scheduled
            .lock()
            .unwrap()
            .insert(trigger.id, trigger.clone());
        Ok(())
    }

    async fn cancel(&self, ids: &[i32]) -> Result<(), SchedulingError> {
        self.record("cancel");
        let mut scheduled = self.scheduled.lock().unwrap();
        for id in ids {
            scheduled.remove(id);
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Monday 2025-01-06 at `h:m`.
fn monday(h: u32, m: u32) -> NaiveDateTime {
    d(2025, 1, 6).and_time(t(h, m))
}

fn rule(source_id: &str, weekday: SchoolDay, class_hour: u8, room: &str) -> ChangeRule {
    ChangeRule {
        source_id: source_id.into(),
        source_alias: String::new(),
        weekday,
        class_hour,
        teacher: Some("Kiss Péter".into()),
        original_room: Some("101".into()),
        new_room: Some(room.into()),
        subject: None,
        group: "9.A".into(),
        notes: None,
        recurrence: Recurrence::Indefinite {
            start_date: d(2025, 1, 6),
        },
    }
}

fn planner(store: Arc<FakeStore>, sink: Arc<FakeSink>) -> NotificationPlanner {
    NotificationPlanner::new(store, sink, PlannerConfig::default())
}

fn two_rules() -> Vec<ChangeRule> {
    vec![
        rule("a", SchoolDay::Mon, 1, "204"),
        rule("b", SchoolDay::Wed, 3, "305"),
    ]
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn replan_is_idempotent() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store, sink.clone());

    let first = planner.replan(monday(6, 0)).await.unwrap();
    let ids_first = sink.ids();
    let second = planner.replan(monday(6, 0)).await.unwrap();

    assert_eq!(first.outcome, ReplanOutcome::Planned);
    assert_eq!(first.planned, 2);
    assert_eq!(ids_first, sink.ids());
    assert_eq!(second.swept, 0);
    assert!(second.epoch > first.epoch);
}

#[tokio::test]
async fn reingested_rules_keep_their_ids() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store.clone(), sink.clone());

    planner.replan(monday(6, 0)).await.unwrap();
    let before = sink.ids();

    store.edit(|s| {
        s.rules = vec![
            rule("refresh-1", SchoolDay::Mon, 1, "204"),
            rule("refresh-2", SchoolDay::Wed, 3, "305"),
        ]
    });
    let report = planner.replan(monday(6, 30)).await.unwrap();

    assert_eq!(before, sink.ids());
    assert_eq!(report.swept, 0);
    let wed = sink.get(stable_trigger_id(&rule("x", SchoolDay::Wed, 3, "305"))).unwrap();
    assert_eq!(wed.payload.rule_id, "refresh-2");
}

#[tokio::test]
async fn first_hour_is_dropped_after_morning_alert() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store, sink.clone());

    let report = planner.replan(monday(7, 55)).await.unwrap();

    assert_eq!(report.planned, 1);
    let remaining: Vec<_> = sink.scheduled.lock().unwrap().values().cloned().collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payload.class_hour, 3);
    assert_eq!(remaining[0].fire_at, d(2025, 1, 8).and_time(t(9, 35)));
}

#[tokio::test]
async fn trigger_content_and_fire_times() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store, sink.clone());
    planner.replan(monday(6, 0)).await.unwrap();

    let mon = sink.get(stable_trigger_id(&rule("a", SchoolDay::Mon, 1, "204"))).unwrap();
    assert_eq!(mon.fire_at, monday(7, 50));
    assert_eq!(mon.title, "1. hour - room change");
    assert_eq!(mon.body, "9.A - Kiss Péter → Room: 204 (08:00 - 08:40)");
    assert_eq!(mon.payload.date, "2025-01-06");
}

#[tokio::test]
async fn override_moves_fire_time() {
    let store = Arc::new(FakeStore::with(vec![rule("a", SchoolDay::Wed, 8, "12")]));
    store.edit(|s| {
        s.overrides = BTreeMap::from([(
            SchoolDay::Wed,
            vec![TimeSlotOverride {
                class_hours: BTreeSet::from([8, 9]),
                start_time: t(14, 0),
                end_time: t(15, 30),
                display_label: Some("8-9".into()),
            }],
        )])
    });
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store, sink.clone());
    planner.replan(monday(6, 0)).await.unwrap();

    let trigger = sink.scheduled.lock().unwrap().values().next().cloned().unwrap();
    assert_eq!(trigger.fire_at, d(2025, 1, 8).and_time(t(13, 50)));
    assert_eq!(trigger.title, "8-9. hour - room change");
}

#[tokio::test]
async fn ignored_hour_is_never_planned() {
    let store = Arc::new(FakeStore::with(two_rules()));
    store.edit(|s| s.ignored = IgnoredHours::from([(SchoolDay::Wed, BTreeSet::from([3]))]));
    let sink = Arc::new(FakeSink::new());
    let report = planner(store, sink).replan(monday(6, 0)).await.unwrap();
    assert_eq!(report.planned, 1);
}

#[tokio::test]
async fn dated_rule_uses_slots_of_its_date() {
    let mut r = rule("a", SchoolDay::Tue, 3, "204");
    r.recurrence = Recurrence::Single { date: d(2025, 1, 8) };
    let store = Arc::new(FakeStore::with(vec![r]));
    store.edit(|s| s.ignored = IgnoredHours::from([(SchoolDay::Wed, BTreeSet::from([3]))]));
    let sink = Arc::new(FakeSink::new());

    let report = planner(store, sink.clone()).replan(monday(6, 0)).await.unwrap();

    assert_eq!(report.planned, 0);
    assert!(sink.ids().is_empty());
}

#[tokio::test]
async fn long_horizon_plans_weekly_rule_once() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let config = PlannerConfig {
        horizon_days: 14,
        ..PlannerConfig::default()
    };
    let report = NotificationPlanner::new(store, sink.clone(), config)
        .replan(monday(6, 0))
        .await
        .unwrap();

    assert_eq!(report.planned, 2);
    let wed = sink.get(stable_trigger_id(&rule("b", SchoolDay::Wed, 3, "305"))).unwrap();
    assert_eq!(wed.payload.date, "2025-01-08");
}

#[tokio::test]
async fn permission_denied_leaves_schedule_untouched() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    planner(store.clone(), sink.clone())
        .replan(monday(6, 0))
        .await
        .unwrap();
    let before = sink.ids();

    let denied = Arc::new(FakeSink {
        scheduled: Mutex::new(sink.scheduled.lock().unwrap().clone()),
        permission: false,
        ..FakeSink::new()
    });
    store.edit(|s| s.rules.clear());
    let result = planner(store, denied.clone()).replan(monday(6, 30)).await;

    assert!(matches!(result, Err(CoreError::PermissionDenied)));
    assert_eq!(denied.ids(), before);
}

#[tokio::test]
async fn rejected_trigger_does_not_stop_the_batch() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let rejected = stable_trigger_id(&rule("a", SchoolDay::Mon, 1, "204"));
    let sink = Arc::new(FakeSink {
        rejected: BTreeSet::from([rejected]),
        ..FakeSink::new()
    });

    let report = planner(store, sink.clone()).replan(monday(6, 0)).await.unwrap();

    assert_eq!(report.planned, 2);
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.failed, 1);
    assert!(!sink.ids().contains(&rejected));
}

#[tokio::test]
async fn stale_triggers_are_swept_after_scheduling() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store.clone(), sink.clone());

    planner.replan(monday(6, 0)).await.unwrap();
    planner.send_test(monday(6, 1)).await.unwrap();
    store.edit(|s| s.rules.truncate(1));
    let report = planner.replan(monday(6, 2)).await.unwrap();

    assert_eq!(report.swept, 1);
    let ids = sink.ids();
    assert!(ids.contains(&stable_trigger_id(&rule("a", SchoolDay::Mon, 1, "204"))));
    assert!(!ids.contains(&stable_trigger_id(&rule("b", SchoolDay::Wed, 3, "305"))));
    assert!(ids.contains(&TEST_NOTIFICATION_ID));
    assert!(sink
        .scheduled
        .lock()
        .unwrap()
        .values()
        .filter(|t| t.id != TEST_NOTIFICATION_ID)
        .all(|t| t.epoch == report.epoch));
}

#[tokio::test]
async fn audience_change_replaces_triggers() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store.clone(), sink.clone());
    planner.replan(monday(6, 0)).await.unwrap();

    store.edit(|s| s.filter = AudienceFilter::teachers(["Nagy Éva"]));
    let report = planner.replan(monday(6, 5)).await.unwrap();

    assert_eq!(report.planned, 0);
    assert_eq!(report.swept, 2);
    assert!(sink.ids().is_empty());
}

#[tokio::test]
async fn disabling_clears_everything() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store.clone(), sink.clone());
    planner.replan(monday(6, 0)).await.unwrap();

    store.edit(|s| s.enabled = false);
    let report = planner.replan(monday(6, 5)).await.unwrap();

    assert_eq!(report.outcome, ReplanOutcome::Disabled);
    assert!(sink.ids().is_empty());
}

#[tokio::test]
async fn replan_if_due_honours_cooldown() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store.clone(), sink);

    assert!(planner.replan_if_due(monday(6, 0)).await.unwrap().is_some());
    assert!(planner
        .replan_if_due(monday(6, 0) + Duration::hours(11))
        .await
        .unwrap()
        .is_none());
    assert!(planner
        .replan_if_due(monday(6, 0) + Duration::hours(12))
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        store.state.lock().unwrap().last_replan,
        Some(monday(18, 0))
    );
}

#[tokio::test]
async fn unreadable_rules_plan_nothing() {
    let store = Arc::new(FakeStore::with(two_rules()));
    store.edit(|s| s.rules_unreadable = true);
    let sink = Arc::new(FakeSink::new());
    let report = planner(store, sink.clone()).replan(monday(6, 0)).await.unwrap();
    assert_eq!(report.planned, 0);
    assert!(sink.ids().is_empty());
}

#[tokio::test]
async fn unlistable_sink_aborts_before_scheduling() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink {
        pending_broken: true,
        ..FakeSink::new()
    });
    let result = planner(store, sink.clone()).replan(monday(6, 0)).await;
    assert!(matches!(result, Err(CoreError::Scheduling(_))));
    assert!(sink.ids().is_empty());
}

#[tokio::test]
async fn concurrent_replans_do_not_interleave() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = Arc::new(planner(store, sink.clone()));
    sink.observe(planner.watch_phase());

    let (a, b) = tokio::join!(planner.replan(monday(6, 0)), planner.replan(monday(6, 0)));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.epoch, b.epoch);
    assert_eq!(sink.ids().len(), 2);
    assert_eq!(planner.phase(), PlannerPhase::Idle);

    // Each cycle lists in Building and schedules in Scheduling; a second
    // cycle only starts once the first is done.
    let calls = sink.calls();
    assert!(calls.iter().all(|(call, phase)| match *call {
        "pending" => *phase == PlannerPhase::Building,
        "schedule" => *phase == PlannerPhase::Scheduling,
        _ => *phase == PlannerPhase::Sweeping,
    }));
    let mut phases: Vec<PlannerPhase> = calls.iter().map(|(_, phase)| *phase).collect();
    phases.dedup();
    assert_eq!(
        phases,
        vec![
            PlannerPhase::Building,
            PlannerPhase::Scheduling,
            PlannerPhase::Building,
            PlannerPhase::Scheduling,
        ]
    );
}

#[tokio::test]
async fn sweep_and_disable_run_in_sweeping_phase() {
    let store = Arc::new(FakeStore::with(two_rules()));
    let sink = Arc::new(FakeSink::new());
    let planner = planner(store.clone(), sink.clone());
    planner.replan(monday(6, 0)).await.unwrap();
    sink.observe(planner.watch_phase());

    store.edit(|s| s.rules.truncate(1));
    planner.replan(monday(6, 5)).await.unwrap();
    store.edit(|s| s.enabled = false);
    planner.replan(monday(6, 10)).await.unwrap();

    let cancels: Vec<PlannerPhase> = sink
        .calls()
        .into_iter()
        .filter(|(call, _)| *call == "cancel")
        .map(|(_, phase)| phase)
        .collect();
    assert_eq!(cancels, vec![PlannerPhase::Sweeping, PlannerPhase::Sweeping]);
    assert_eq!(planner.phase(), PlannerPhase::Idle);
}

#[tokio::test]
async fn test_notification_fires_shortly() {
    let store = Arc::new(FakeStore::with(Vec::new()));
    let sink = Arc::new(FakeSink::new());
    let trigger = planner(store, sink.clone())
        .send_test(monday(10, 0))
        .await
        .unwrap();
    assert_eq!(trigger.id, TEST_NOTIFICATION_ID);
    assert_eq!(trigger.fire_at, monday(10, 0) + Duration::seconds(8));
    assert!(sink.ids().contains(&TEST_NOTIFICATION_ID));
}
