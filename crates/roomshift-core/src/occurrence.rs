//! Occurrences: rules resolved onto concrete dates.
//!
//! [`occurrences_on`] is the single answer to "what is visible for this
//! audience on this date". Both the on-screen agenda and the notification
//! planner are built on it.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::audience::AudienceFilter;
use crate::calendar::weekday_code;
use crate::recurrence::matches;
use crate::rule::ChangeRule;
use crate::timeslot::{resolve, IgnoredHours, SlotSource, TimeSlotOverrides};

/// Maximum number of note characters that go into a note id.
const NOTE_ID_PREFIX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub rule: ChangeRule,
    pub date: NaiveDate,
    pub effective_start: Option<NaiveTime>,
    pub effective_end: Option<NaiveTime>,
    pub display_class_label: String,
    pub slot_source: SlotSource,
}

impl Occurrence {
    pub fn class_hour(&self) -> u8 {
        self.rule.class_hour
    }

    /// Local instant the class starts, when its time is known.
    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        self.effective_start.map(|t| self.date.and_time(t))
    }

    /// `HH:MM - HH:MM`, or empty when unknown.
    pub fn display_time(&self) -> String {
        match (self.effective_start, self.effective_end) {
            (Some(start), Some(end)) => {
                format!("{} - {}", start.format("%H:%M"), end.format("%H:%M"))
            }
            _ => String::new(),
        }
    }
}

/// Visible occurrences on `date`, ordered by class hour.
///
/// Rules are matched against the date, resolved to a time slot of the
/// date's own weekday (suppressed hours are dropped) and filtered by
/// audience.
/// Rules with the same class hour keep their input order.
pub fn occurrences_on(
    rules: &[ChangeRule],
    date: NaiveDate,
    overrides: &TimeSlotOverrides,
    ignored: &IgnoredHours,
    filter: &AudienceFilter,
) -> Vec<Occurrence> {
    let Some(day) = weekday_code(date) else {
        return Vec::new();
    };
    let mut out: Vec<Occurrence> = rules
        .iter()
        .filter(|rule| rule.is_well_formed() && matches(rule, date))
        .filter_map(|rule| {
            let slot = resolve(day, rule.class_hour, overrides, ignored).into_slot()?;
            Some(Occurrence {
                rule: rule.clone(),
                date,
                effective_start: slot.start,
                effective_end: slot.end,
                display_class_label: slot.label,
                slot_source: slot.source,
            })
        })
        .filter(|occurrence| filter.is_relevant(&occurrence.rule))
        .collect();
    out.sort_by_key(Occurrence::class_hour);
    out
}

/// A free-text note attached to one or more occurrences of a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayNote {
    pub note_id: String,
    pub text: String,
}

/// Stable id for a note: the rule anchor plus a whitespace-folded prefix
/// of the text. Survives recomputation and data refreshes.
pub fn note_id(rule: &ChangeRule, text: &str) -> String {
    let mut folded = String::new();
    let mut in_whitespace = false;
    for c in text.chars().take(NOTE_ID_PREFIX_CHARS) {
        if c.is_whitespace() {
            if !in_whitespace {
                folded.push('_');
            }
            in_whitespace = true;
        } else {
            folded.push(c);
            in_whitespace = false;
        }
    }
    format!("{}_{}", rule.anchor(), folded)
}

/// Distinct notes of a day's occurrences, minus dismissed ones.
///
/// A note shared by several occurrences appears once, under the id of
/// its first occurrence.
pub fn notes_for(occurrences: &[Occurrence], dismissed: &BTreeSet<String>) -> Vec<DayNote> {
    let mut seen = BTreeSet::new();
    let mut notes = Vec::new();
    for occurrence in occurrences {
        let Some(text) = occurrence.rule.note_text() else {
            continue;
        };
        if !seen.insert(text.to_string()) {
            continue;
        }
        let id = note_id(&occurrence.rule, text);
        if !dismissed.contains(&id) {
            notes.push(DayNote {
                note_id: id,
                text: text.to_string(),
            });
        }
    }
    notes
}

/// How much of the future the agenda shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayWindow {
    /// Today's classes that have not started yet, then the following days.
    #[default]
    Upcoming,
    /// Every occurrence, including today's past classes.
    AllFuture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySection {
    pub date: NaiveDate,
    pub title: String,
    pub occurrences: Vec<Occurrence>,
    pub notes: Vec<DayNote>,
}

/// Title for a day relative to today.
pub fn day_title(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%A (%-m/%-d)").to_string(),
    }
}

/// Owned inputs of one computation.
///
/// Built fresh from storage for every request and dropped afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceView {
    pub rules: Vec<ChangeRule>,
    pub overrides: TimeSlotOverrides,
    pub ignored: IgnoredHours,
    pub filter: AudienceFilter,
}

impl OccurrenceView {
    pub fn occurrences_on(&self, date: NaiveDate) -> Vec<Occurrence> {
        occurrences_on(
            &self.rules,
            date,
            &self.overrides,
            &self.ignored,
            &self.filter,
        )
    }

    /// Day sections for the next `days` days starting today.
    ///
    /// Days with nothing visible are left out. In
    /// [`DisplayWindow::Upcoming`] today only lists classes starting
    /// after `now`.
    pub fn agenda(
        &self,
        now: NaiveDateTime,
        window: DisplayWindow,
        days: u32,
        dismissed: &BTreeSet<String>,
    ) -> Vec<DaySection> {
        let today = now.date();
        (0..i64::from(days))
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter_map(|date| {
                let mut occurrences = self.occurrences_on(date);
                if window == DisplayWindow::Upcoming && date == today {
                    occurrences.retain(|o| o.starts_at().is_some_and(|start| start > now));
                }
                if occurrences.is_empty() {
                    return None;
                }
                let notes = notes_for(&occurrences, dismissed);
                Some(DaySection {
                    date,
                    title: day_title(date, today),
                    occurrences,
                    notes,
                })
            })
            .collect()
    }
}
