//! Recurrence expansion: from a rule to the concrete dates it applies on.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::{add_months, in_range, weekday_code};
use crate::rule::{ChangeRule, Recurrence};

/// Bounds used to keep indefinite recurrences finite.
///
/// These are an expansion limit only. An indefinite rule does not expire
/// when the horizon ends; the next expansion simply starts later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonConfig {
    #[serde(default = "default_indefinite_horizon_months")]
    pub indefinite_horizon_months: u32,
    #[serde(default = "default_indefinite_max_days")]
    pub indefinite_max_days: i64,
}

fn default_indefinite_horizon_months() -> u32 {
    6
}
fn default_indefinite_max_days() -> i64 {
    365
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            indefinite_horizon_months: default_indefinite_horizon_months(),
            indefinite_max_days: default_indefinite_max_days(),
        }
    }
}

impl HorizonConfig {
    /// Default end of expansion for `rule` when the caller gives none.
    ///
    /// Dated rules end on their own last day; indefinite rules end at
    /// `min(today + months, start + max_days)`.
    pub fn default_end(&self, rule: &ChangeRule, today: NaiveDate) -> NaiveDate {
        match rule.recurrence {
            Recurrence::Single { date } => date,
            Recurrence::Range { end_date, .. } => end_date,
            Recurrence::Indefinite { start_date } => {
                let by_today = add_months(today, self.indefinite_horizon_months);
                let by_start = start_date
                    .checked_add_signed(Duration::days(self.indefinite_max_days))
                    .unwrap_or(NaiveDate::MAX);
                by_today.min(by_start)
            }
        }
    }
}

/// Whether `rule` applies on `date`.
///
/// Weekends never match. Indefinite rules have no upper bound here;
/// callers limit the horizon.
pub fn matches(rule: &ChangeRule, date: NaiveDate) -> bool {
    let Some(day) = weekday_code(date) else {
        return false;
    };
    match rule.recurrence {
        Recurrence::Single { date: on } => on == date,
        Recurrence::Range {
            start_date,
            end_date,
        } => in_range(date, start_date, end_date) && day == rule.weekday,
        Recurrence::Indefinite { start_date } => date >= start_date && day == rule.weekday,
    }
}

/// Lazy, finite sequence of dates a rule applies on.
///
/// Cloning restarts the sequence from the clone point.
#[derive(Debug, Clone)]
pub struct OccurrenceDates {
    next: Option<NaiveDate>,
    end: NaiveDate,
    stride: Option<Duration>,
}

impl OccurrenceDates {
    fn empty() -> Self {
        Self {
            next: None,
            end: NaiveDate::MIN,
            stride: None,
        }
    }
}

impl Iterator for OccurrenceDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        if current > self.end {
            self.next = None;
            return None;
        }
        self.next = self
            .stride
            .and_then(|stride| current.checked_add_signed(stride));
        Some(current)
    }
}

/// Dates from `from` up to `horizon_end` (inclusive) on which `rule` applies.
///
/// Walks by weekly stride from the first matching weekday, which yields
/// the same dates as testing [`matches`] on every calendar day.
/// `horizon_end` defaults to [`HorizonConfig::default_end`].
pub fn occurrence_dates_in_horizon(
    rule: &ChangeRule,
    from: NaiveDate,
    horizon_end: Option<NaiveDate>,
    today: NaiveDate,
    config: &HorizonConfig,
) -> OccurrenceDates {
    let mut end = horizon_end.unwrap_or_else(|| config.default_end(rule, today));
    if let Some(last) = rule.recurrence.last_date() {
        end = end.min(last);
    }
    let start = from.max(rule.recurrence.first_date());
    if start > end {
        return OccurrenceDates::empty();
    }

    match rule.recurrence {
        Recurrence::Single { date } => OccurrenceDates {
            next: weekday_code(date).map(|_| date),
            end,
            stride: None,
        },
        Recurrence::Range { .. } | Recurrence::Indefinite { .. } => {
            let target = rule.weekday.weekday().num_days_from_monday() as i64;
            let current = start.weekday().num_days_from_monday() as i64;
            let offset = (target - current).rem_euclid(7);
            OccurrenceDates {
                next: start.checked_add_signed(Duration::days(offset)),
                end,
                stride: Some(Duration::days(7)),
            }
        }
    }
}
