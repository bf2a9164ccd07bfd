//! Notification triggers: identity, fire instant and content.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::PlannerConfig;
use crate::calendar::format_local_date;
use crate::occurrence::{Occurrence, OccurrenceView};
use crate::rule::ChangeRule;
use crate::timeslot::{default_period, SlotSource};

/// Fixed id of the manual test notification.
pub const TEST_NOTIFICATION_ID: i32 = 99_999;

/// Hashed trigger ids start here, above every sentinel id.
pub const TRIGGER_ID_OFFSET: i32 = 100_000;

const TRIGGER_ID_MODULUS: u32 = 1_000_000_000;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    pub rule_id: String,
    pub class_hour: u8,
    pub date: String,
}

/// A planned notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTrigger {
    pub id: i32,
    /// Local wall-clock instant the alert is shown.
    pub fire_at: NaiveDateTime,
    pub title: String,
    pub body: String,
    pub payload: TriggerPayload,
    /// Replan cycle that produced this trigger.
    #[serde(default)]
    pub epoch: u64,
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Identity key of a rule's alert: `anchor|classHour|group|newRoom`.
///
/// The per-refresh source id is deliberately absent.
pub fn trigger_key(rule: &ChangeRule) -> String {
    format!(
        "{}|{}|{}|{}",
        rule.anchor(),
        rule.class_hour,
        rule.group,
        rule.new_room.as_deref().unwrap_or_default()
    )
}

/// Deterministic trigger id in `[TRIGGER_ID_OFFSET, TRIGGER_ID_OFFSET + 1e9)`.
pub fn stable_trigger_id(rule: &ChangeRule) -> i32 {
    let hash = fnv1a(trigger_key(rule).as_bytes()) % TRIGGER_ID_MODULUS;
    // hash < 1e9, so the sum stays below i32::MAX
    TRIGGER_ID_OFFSET + hash as i32
}

/// When the alert for `occurrence` fires.
///
/// Overridden hours fire `lead_minutes` before their start. Default hours
/// fire when the previous default hour ends, and the first hour fires at
/// the configured morning time. Hours outside the timetable have none.
pub fn fire_instant(occurrence: &Occurrence, config: &PlannerConfig) -> Option<NaiveDateTime> {
    let date = occurrence.date;
    if occurrence.slot_source == SlotSource::Override {
        let start = occurrence.starts_at()?;
        return Some(start - Duration::minutes(config.lead_minutes));
    }
    match occurrence.class_hour() {
        1 => Some(date.and_time(config.first_hour_alert)),
        hour => default_period(hour.checked_sub(1)?)
            .filter(|_| default_period(hour).is_some())
            .map(|previous| date.and_time(previous.end)),
    }
}

fn title(occurrence: &Occurrence) -> String {
    format!("{}. hour - room change", occurrence.display_class_label)
}

fn body(occurrence: &Occurrence) -> String {
    let rule = &occurrence.rule;
    let mut body = String::new();
    if !rule.group.is_empty() {
        body.push_str(&rule.group);
        body.push_str(" - ");
    }
    body.push_str(rule.teacher_name().unwrap_or("Unknown teacher"));
    body.push_str(" → Room: ");
    body.push_str(rule.new_room.as_deref().unwrap_or("Unknown"));
    let time = occurrence.display_time();
    if !time.is_empty() {
        body.push_str(&format!(" ({time})"));
    }
    body
}

/// Builds the trigger for one occurrence, or `None` when it would fire
/// at or before `now`.
pub fn trigger_for(
    occurrence: &Occurrence,
    now: NaiveDateTime,
    config: &PlannerConfig,
    epoch: u64,
) -> Option<NotificationTrigger> {
    let fire_at = fire_instant(occurrence, config)?;
    if fire_at <= now {
        return None;
    }
    Some(NotificationTrigger {
        id: stable_trigger_id(&occurrence.rule),
        fire_at,
        title: title(occurrence),
        body: body(occurrence),
        payload: TriggerPayload {
            rule_id: occurrence.rule.source_id.clone(),
            class_hour: occurrence.class_hour(),
            date: format_local_date(occurrence.date),
        },
        epoch,
    })
}

/// Occurrences of one day with duplicate physical changes collapsed.
///
/// Keyed by `(classHour, group, newRoom)`; the first occurrence wins.
pub fn dedup_day(occurrences: Vec<Occurrence>) -> Vec<Occurrence> {
    let mut seen = BTreeSet::new();
    occurrences
        .into_iter()
        .filter(|o| {
            seen.insert((
                o.rule.class_hour,
                o.rule.group.clone(),
                o.rule.new_room.clone(),
            ))
        })
        .collect()
}

/// The full trigger set for the horizon starting on `now`'s date.
///
/// Pure function of its inputs: same view, same `now`, same result.
pub fn build_triggers(
    view: &OccurrenceView,
    now: NaiveDateTime,
    config: &PlannerConfig,
    epoch: u64,
) -> Vec<NotificationTrigger> {
    let today = now.date();
    let mut ids = BTreeSet::new();
    let mut triggers = Vec::new();

    for date in horizon_dates(today, config.horizon_days) {
        for occurrence in dedup_day(view.occurrences_on(date)) {
            let Some(trigger) = trigger_for(&occurrence, now, config, epoch) else {
                continue;
            };
            if !ids.insert(trigger.id) {
                tracing::debug!(
                    id = trigger.id,
                    date = %trigger.payload.date,
                    "Dropping trigger with an id already planned"
                );
                continue;
            }
            triggers.push(trigger);
        }
    }
    triggers
}

fn horizon_dates(today: NaiveDate, days: u32) -> impl Iterator<Item = NaiveDate> {
    (0..i64::from(days)).filter_map(move |offset| today.checked_add_signed(Duration::days(offset)))
}

/// The manual test notification, shown shortly after `now`.
pub fn test_trigger(now: NaiveDateTime) -> NotificationTrigger {
    NotificationTrigger {
        id: TEST_NOTIFICATION_ID,
        fire_at: now + Duration::seconds(8),
        title: "1. hour - room change (TEST)".to_string(),
        body: "9.A - Test Teacher → Room: 101".to_string(),
        payload: TriggerPayload {
            rule_id: "test".to_string(),
            class_hour: 1,
            date: format_local_date(now.date()),
        },
        epoch: 0,
    }
}
