//! Time slots for class hours.
//!
//! The school runs a fixed nine-period grid. Individual weekdays can
//! override the times (and display label) of a set of hours, and hours
//! can be suppressed outright for a weekday.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::calendar::SchoolDay;

/// One period of the default timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassPeriod {
    pub class_hour: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// The fixed daily grid as `(class hour, start, end)` in hours and minutes.
const DEFAULT_GRID: [(u8, (u32, u32), (u32, u32)); 9] = [
    (1, (8, 0), (8, 40)),
    (2, (8, 55), (9, 35)),
    (3, (9, 50), (10, 30)),
    (4, (10, 55), (11, 35)),
    (5, (11, 50), (12, 30)),
    (6, (12, 45), (13, 15)),
    (7, (13, 40), (14, 20)),
    (8, (14, 30), (15, 10)),
    (9, (15, 20), (16, 0)),
];

/// Default period for a class hour, if it exists.
pub fn default_period(class_hour: u8) -> Option<ClassPeriod> {
    let (_, (sh, sm), (eh, em)) = DEFAULT_GRID.iter().find(|(h, _, _)| *h == class_hour)?;
    Some(ClassPeriod {
        class_hour,
        start: NaiveTime::from_hms_opt(*sh, *sm, 0)?,
        end: NaiveTime::from_hms_opt(*eh, *em, 0)?,
    })
}

/// Every period of the default timetable, in order.
pub fn default_timetable() -> Vec<ClassPeriod> {
    DEFAULT_GRID
        .iter()
        .filter_map(|(h, _, _)| default_period(*h))
        .collect()
}

/// `HH:MM` serde for times entered by hand.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, String> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|e| format!("invalid time '{raw}': {e}"))
    }
}

pub use hhmm::parse as parse_hhmm;

/// Replacement times for a set of class hours on one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlotOverride {
    pub class_hours: BTreeSet<u8>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub display_label: Option<String>,
}

impl TimeSlotOverride {
    /// Explicit label, or the class hours joined with `-`.
    pub fn label(&self) -> String {
        match self.display_label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => self
                .class_hours
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join("-"),
        }
    }
}

/// Overrides keyed by weekday, in definition order.
pub type TimeSlotOverrides = BTreeMap<SchoolDay, Vec<TimeSlotOverride>>;

/// Suppressed class hours keyed by weekday.
pub type IgnoredHours = BTreeMap<SchoolDay, BTreeSet<u8>>;

/// Where a resolved slot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotSource {
    Override,
    Default,
    Unknown,
}

/// Effective time and label of a class hour on a weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSlot {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub label: String,
    pub source: SlotSource,
}

impl ResolvedSlot {
    /// `HH:MM - HH:MM`, or empty when the hour has no known time.
    pub fn display_time(&self) -> String {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"))
            }
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotResolution {
    Suppressed,
    Slot(ResolvedSlot),
}

impl SlotResolution {
    pub fn into_slot(self) -> Option<ResolvedSlot> {
        match self {
            SlotResolution::Suppressed => None,
            SlotResolution::Slot(slot) => Some(slot),
        }
    }
}

/// Whether `class_hour` is suppressed on `weekday`.
pub fn is_ignored(weekday: SchoolDay, class_hour: u8, ignored: &IgnoredHours) -> bool {
    ignored
        .get(&weekday)
        .is_some_and(|hours| hours.contains(&class_hour))
}

/// Override covering `class_hour` on `weekday`; the last defined one wins.
pub fn find_override(
    weekday: SchoolDay,
    class_hour: u8,
    overrides: &TimeSlotOverrides,
) -> Option<&TimeSlotOverride> {
    overrides
        .get(&weekday)?
        .iter()
        .rev()
        .find(|o| o.class_hours.contains(&class_hour))
}

/// Effective slot for a class hour.
///
/// Suppression takes precedence over any override.
pub fn resolve(
    weekday: SchoolDay,
    class_hour: u8,
    overrides: &TimeSlotOverrides,
    ignored: &IgnoredHours,
) -> SlotResolution {
    if is_ignored(weekday, class_hour, ignored) {
        return SlotResolution::Suppressed;
    }

    if let Some(o) = find_override(weekday, class_hour, overrides) {
        return SlotResolution::Slot(ResolvedSlot {
            start: Some(o.start_time),
            end: Some(o.end_time),
            label: o.label(),
            source: SlotSource::Override,
        });
    }

    let slot = match default_period(class_hour) {
        Some(p) => ResolvedSlot {
            start: Some(p.start),
            end: Some(p.end),
            label: class_hour.to_string(),
            source: SlotSource::Default,
        },
        None => ResolvedSlot {
            start: None,
            end: None,
            label: class_hour.to_string(),
            source: SlotSource::Unknown,
        },
    };
    SlotResolution::Slot(slot)
}
