//! Audience selection.
//!
//! The viewer follows either a set of class groups or a set of teachers,
//! never both. The filter is a tagged union so the inactive selection
//! cannot exist at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::rule::ChangeRule;

/// Labels the announcement feed uses when the teacher is unknown.
const PLACEHOLDER_TEACHERS: [&str; 2] = ["Ismeretlen tanár", "Unknown teacher"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudienceMode {
    Class,
    Teacher,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AudienceFilter {
    Class { groups: BTreeSet<String> },
    Teacher { teachers: BTreeSet<String> },
}

impl Default for AudienceFilter {
    fn default() -> Self {
        AudienceFilter::Class {
            groups: BTreeSet::new(),
        }
    }
}

impl AudienceFilter {
    /// Class-mode filter; groups are upper-cased.
    pub fn classes<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AudienceFilter::Class {
            groups: groups
                .into_iter()
                .map(|g| g.as_ref().trim().to_uppercase())
                .filter(|g| !g.is_empty())
                .collect(),
        }
    }

    /// Teacher-mode filter; names are trimmed.
    pub fn teachers<I, S>(teachers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AudienceFilter::Teacher {
            teachers: teachers
                .into_iter()
                .map(|t| t.as_ref().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn mode(&self) -> AudienceMode {
        match self {
            AudienceFilter::Class { .. } => AudienceMode::Class,
            AudienceFilter::Teacher { .. } => AudienceMode::Teacher,
        }
    }

    /// Switches mode. The previous selection is discarded; staying in the
    /// same mode keeps it.
    pub fn switch_mode(self, mode: AudienceMode) -> Self {
        match (self.mode(), mode) {
            (current, wanted) if current == wanted => self,
            (_, AudienceMode::Class) => AudienceFilter::Class {
                groups: BTreeSet::new(),
            },
            (_, AudienceMode::Teacher) => AudienceFilter::Teacher {
                teachers: BTreeSet::new(),
            },
        }
    }

    /// Whether the active selection is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            AudienceFilter::Class { groups } => groups.is_empty(),
            AudienceFilter::Teacher { teachers } => teachers.is_empty(),
        }
    }

    /// Whether `rule` concerns this audience.
    ///
    /// An empty selection matches nothing. In teacher mode a rule without
    /// a teacher never matches. Both sides are normalized here, so a
    /// stored selection that was never passed through [`Self::classes`]
    /// or [`Self::teachers`] still compares correctly.
    pub fn is_relevant(&self, rule: &ChangeRule) -> bool {
        match self {
            AudienceFilter::Class { groups } => {
                let group = rule.group.trim().to_uppercase();
                !group.is_empty() && groups.iter().any(|g| g.trim().to_uppercase() == group)
            }
            AudienceFilter::Teacher { teachers } => rule
                .teacher_name()
                .is_some_and(|name| teachers.iter().any(|t| t.trim() == name)),
        }
    }
}

/// Distinct groups and teachers present in the current rule set.
///
/// Recomputed from the rules on demand, so it always reflects exactly
/// one data generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceDirectory {
    pub groups: BTreeSet<String>,
    pub teachers: BTreeSet<String>,
}

impl AudienceDirectory {
    pub fn from_rules(rules: &[ChangeRule]) -> Self {
        let mut directory = Self::default();
        for rule in rules {
            let group = rule.group.trim().to_uppercase();
            if !group.is_empty() {
                directory.groups.insert(group);
            }
            if let Some(name) = rule.teacher_name() {
                if !PLACEHOLDER_TEACHERS.contains(&name) {
                    directory.teachers.insert(name.to_string());
                }
            }
        }
        directory
    }
}
