//! Calendar helpers for the school week.
//!
//! All dates are local calendar dates (`NaiveDate`) and all instants are
//! local wall-clock times (`NaiveDateTime`). Nothing in this module shifts
//! through UTC, so a date is always formatted from its own calendar fields.

use chrono::{Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

/// One of the five working days a class can be held on.
///
/// Serialized with the storage codes used by the announcement feed;
/// English abbreviations are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchoolDay {
    #[serde(rename = "HETFO", alias = "MON")]
    Mon,
    #[serde(rename = "KEDD", alias = "TUE")]
    Tue,
    #[serde(rename = "SZERDA", alias = "WED")]
    Wed,
    #[serde(rename = "CSUTORTOK", alias = "THU")]
    Thu,
    #[serde(rename = "PENTEK", alias = "FRI")]
    Fri,
}

impl SchoolDay {
    pub const ALL: [SchoolDay; 5] = [
        SchoolDay::Mon,
        SchoolDay::Tue,
        SchoolDay::Wed,
        SchoolDay::Thu,
        SchoolDay::Fri,
    ];

    /// Storage code for this day (e.g. `SZERDA`).
    pub fn code(self) -> &'static str {
        match self {
            SchoolDay::Mon => "HETFO",
            SchoolDay::Tue => "KEDD",
            SchoolDay::Wed => "SZERDA",
            SchoolDay::Thu => "CSUTORTOK",
            SchoolDay::Fri => "PENTEK",
        }
    }

    pub fn weekday(self) -> Weekday {
        match self {
            SchoolDay::Mon => Weekday::Mon,
            SchoolDay::Tue => Weekday::Tue,
            SchoolDay::Wed => Weekday::Wed,
            SchoolDay::Thu => Weekday::Thu,
            SchoolDay::Fri => Weekday::Fri,
        }
    }

    /// Maps a chrono weekday; `None` for Saturday and Sunday.
    pub fn from_weekday(weekday: Weekday) -> Option<Self> {
        match weekday {
            Weekday::Mon => Some(SchoolDay::Mon),
            Weekday::Tue => Some(SchoolDay::Tue),
            Weekday::Wed => Some(SchoolDay::Wed),
            Weekday::Thu => Some(SchoolDay::Thu),
            Weekday::Fri => Some(SchoolDay::Fri),
            Weekday::Sat | Weekday::Sun => None,
        }
    }
}

impl fmt::Display for SchoolDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SchoolDay {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HETFO" | "MON" | "MONDAY" => Ok(SchoolDay::Mon),
            "KEDD" | "TUE" | "TUESDAY" => Ok(SchoolDay::Tue),
            "SZERDA" | "WED" | "WEDNESDAY" => Ok(SchoolDay::Wed),
            "CSUTORTOK" | "THU" | "THURSDAY" => Ok(SchoolDay::Thu),
            "PENTEK" | "FRI" | "FRIDAY" => Ok(SchoolDay::Fri),
            _ => Err(RuleError::UnknownWeekday(s.to_string())),
        }
    }
}

/// `YYYY-MM-DD` from the date's own calendar fields.
pub fn format_local_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses the leading `YYYY-MM-DD` of a stored date string.
///
/// Timestamps such as `2025-01-06T00:00:00.000Z` keep their calendar date;
/// the time part is ignored rather than converted.
pub fn parse_local_date(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// School day of `date`, or `None` on weekends.
pub fn weekday_code(date: NaiveDate) -> Option<SchoolDay> {
    SchoolDay::from_weekday(date.weekday())
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Last representable millisecond of `date` (23:59:59.999).
///
/// Saturates at [`NaiveDateTime::MAX`] on the last representable day.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    start_of_day(date)
        .checked_add_signed(Duration::days(1) - Duration::milliseconds(1))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Inclusive range test on whole days.
pub fn in_range(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    date >= start && date <= end
}

/// Adds calendar months, clamping to the end of shorter months.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Current local wall-clock time.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}
