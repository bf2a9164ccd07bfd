//! Room-change rules.
//!
//! A [`ChangeRule`] is one line of an announcement, already narrowed to a
//! single weekday, class hour and group, plus a recurrence descriptor.
//! Rules arrive from storage as loose [`RawChangeRecord`]s and are
//! normalised here; records that cannot be normalised are dropped.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::calendar::{format_local_date, parse_local_date, weekday_code, SchoolDay};
use crate::error::RuleError;

/// Valid class hours of the school day.
pub const CLASS_HOURS: RangeInclusive<u8> = 1..=9;

/// When a rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Recurrence {
    /// Exactly one date.
    Single { date: NaiveDate },
    /// Every matching weekday within `[start_date, end_date]`.
    #[serde(rename_all = "camelCase")]
    Range {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    /// Every matching weekday from `start_date` until revoked.
    #[serde(rename_all = "camelCase")]
    Indefinite { start_date: NaiveDate },
}

impl Recurrence {
    /// First day the rule can apply.
    pub fn first_date(&self) -> NaiveDate {
        match self {
            Recurrence::Single { date } => *date,
            Recurrence::Range { start_date, .. } | Recurrence::Indefinite { start_date } => {
                *start_date
            }
        }
    }

    /// Last day the rule can apply, `None` when open-ended.
    pub fn last_date(&self) -> Option<NaiveDate> {
        match self {
            Recurrence::Single { date } => Some(*date),
            Recurrence::Range { end_date, .. } => Some(*end_date),
            Recurrence::Indefinite { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRule {
    /// Identifier of the source record. Regenerated on every data refresh,
    /// so it never takes part in trigger identity.
    pub source_id: String,
    #[serde(default)]
    pub source_alias: String,
    pub weekday: SchoolDay,
    pub class_hour: u8,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub original_room: Option<String>,
    #[serde(default)]
    pub new_room: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    /// Upper-cased class group, e.g. `9.A`.
    pub group: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub recurrence: Recurrence,
}

impl ChangeRule {
    /// Stable date anchor of the rule.
    ///
    /// The explicit date for single-day rules, otherwise
    /// `startDate_WEEKDAY`. Used for trigger ids and note ids.
    pub fn anchor(&self) -> String {
        match &self.recurrence {
            Recurrence::Single { date } => format_local_date(*date),
            Recurrence::Range { start_date, .. } | Recurrence::Indefinite { start_date } => {
                format!("{}_{}", format_local_date(*start_date), self.weekday.code())
            }
        }
    }

    /// Checks the invariants that deserialization alone does not enforce.
    pub fn validate(&self) -> Result<(), RuleError> {
        if !CLASS_HOURS.contains(&self.class_hour) {
            return Err(RuleError::ClassHourOutOfRange {
                class_hour: i64::from(self.class_hour),
            });
        }
        if let Recurrence::Range {
            start_date,
            end_date,
        } = self.recurrence
        {
            if end_date < start_date {
                return Err(RuleError::InvertedRange {
                    start: start_date,
                    end: end_date,
                });
            }
        }
        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    /// Teacher name with surrounding whitespace removed; `None` when blank.
    pub fn teacher_name(&self) -> Option<&str> {
        self.teacher
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Note text when it carries anything besides whitespace.
    pub fn note_text(&self) -> Option<&str> {
        self.notes.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Announcement record as persisted by the storage layer.
///
/// Every field is optional; [`ChangeRule::try_from`] decides whether the
/// combination describes a usable rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChangeRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_alias: Option<String>,
    #[serde(default)]
    pub day_of_week: Option<String>,
    #[serde(default)]
    pub class_number: Option<i64>,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub original_room: Option<String>,
    #[serde(default)]
    pub new_room: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub until_revocation: Option<bool>,
}

fn parse_field(value: Option<&str>, field: &'static str) -> Result<Option<NaiveDate>, RuleError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_local_date(v)
            .map(Some)
            .ok_or(RuleError::MissingDate { field }),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<RawChangeRecord> for ChangeRule {
    type Error = RuleError;

    fn try_from(raw: RawChangeRecord) -> Result<Self, Self::Error> {
        let class_hour = raw.class_number.unwrap_or(0);
        let class_hour = u8::try_from(class_hour)
            .ok()
            .filter(|h| CLASS_HOURS.contains(h))
            .ok_or(RuleError::ClassHourOutOfRange { class_hour })?;

        let date = parse_field(raw.date.as_deref(), "date")?;
        let start = parse_field(raw.start_date.as_deref(), "startDate")?;
        let end = parse_field(raw.end_date.as_deref(), "endDate")?;

        let recurrence = match (date, start, end) {
            (Some(date), _, _) => Recurrence::Single { date },
            (None, Some(start_date), _) if raw.until_revocation == Some(true) => {
                Recurrence::Indefinite { start_date }
            }
            (None, Some(start_date), Some(end_date)) => {
                if end_date < start_date {
                    return Err(RuleError::InvertedRange {
                        start: start_date,
                        end: end_date,
                    });
                }
                Recurrence::Range {
                    start_date,
                    end_date,
                }
            }
            (None, None, _) if raw.until_revocation == Some(true) => {
                return Err(RuleError::MissingDate { field: "startDate" });
            }
            (None, Some(_), None) => {
                return Err(RuleError::UnknownRecurrence(
                    "start date without end date or revocation flag".into(),
                ));
            }
            (None, None, _) => {
                return Err(RuleError::UnknownRecurrence("no date fields".into()));
            }
        };

        let weekday = match raw.day_of_week.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.parse::<SchoolDay>()?,
            _ => match recurrence {
                Recurrence::Single { date } => weekday_code(date).ok_or_else(|| {
                    RuleError::UnknownWeekday(format!("{} is a weekend", format_local_date(date)))
                })?,
                _ => return Err(RuleError::UnknownWeekday(String::new())),
            },
        };

        Ok(ChangeRule {
            source_id: raw.source_id.or(raw.id).unwrap_or_default(),
            source_alias: raw.source_alias.unwrap_or_default(),
            weekday,
            class_hour,
            teacher: non_blank(raw.teacher),
            original_room: non_blank(raw.original_room),
            new_room: non_blank(raw.new_room),
            subject: non_blank(raw.subject),
            group: raw.group.unwrap_or_default().trim().to_uppercase(),
            notes: non_blank(raw.notes),
            recurrence,
        })
    }
}

/// The current set of rules, as produced by one data generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<ChangeRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ChangeRule>) -> Self {
        Self { rules }
    }

    /// Normalises raw records, dropping malformed ones.
    ///
    /// Returns the set and the number of records skipped.
    pub fn from_records<I>(records: I) -> (Self, usize)
    where
        I: IntoIterator<Item = RawChangeRecord>,
    {
        let mut rules = Vec::new();
        let mut skipped = 0;
        for record in records {
            let id = record.id.clone().or_else(|| record.source_id.clone());
            match ChangeRule::try_from(record) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(record = ?id, error = %e, "Skipping malformed record");
                }
            }
        }
        (Self { rules }, skipped)
    }

    /// Drops dated rules whose last day is before `today`.
    ///
    /// Indefinite rules stay until they are removed from the feed.
    pub fn retain_active(&mut self, today: NaiveDate) -> usize {
        let before = self.rules.len();
        self.rules
            .retain(|rule| rule.recurrence.last_date().map_or(true, |end| end >= today));
        before - self.rules.len()
    }

    pub fn rules(&self) -> &[ChangeRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
