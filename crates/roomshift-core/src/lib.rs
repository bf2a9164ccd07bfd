//! # Roomshift Core Library
//!
//! This library provides the core logic for roomshift, a planner for
//! school room-change announcements. It turns announcement rules into
//! per-day occurrences for a chosen audience and keeps a device's
//! notification schedule in step with them. Everything is available via
//! the standalone `roomshift` CLI, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Calendar & recurrence**: local-date arithmetic and expansion of
//!   single, ranged and open-ended rules onto school days
//! - **Time slots**: the default nine-period grid, per-weekday overrides
//!   and suppressed hours
//! - **Audience**: a strict class-or-teacher selection
//! - **Occurrences**: the single answer to "what applies on this date",
//!   shared by the agenda and the notification planner
//! - **Planner**: deterministic notification triggers and epoch-tagged
//!   reconciliation with the device schedule
//! - **Storage**: SQLite key-value state, a local notification outbox and
//!   TOML configuration
//!
//! ## Key Components
//!
//! - [`OccurrenceView`]: occurrences and agenda for one set of inputs
//! - [`NotificationPlanner`]: replan cycle over a store and a sink
//! - [`RoomChangeStore`] / [`NotificationSink`]: the collaborator seams
//! - [`Database`]: persistence
//! - [`Config`]: application configuration management

pub mod audience;
pub mod calendar;
pub mod error;
pub mod occurrence;
pub mod planner;
pub mod recurrence;
pub mod rule;
pub mod storage;
pub mod timeslot;

pub use audience::{AudienceDirectory, AudienceFilter, AudienceMode};
pub use calendar::SchoolDay;
pub use error::{ConfigError, CoreError, DatabaseError, RuleError, SchedulingError};
pub use occurrence::{DayNote, DaySection, DisplayWindow, Occurrence, OccurrenceView};
pub use planner::{
    NotificationPlanner, NotificationSink, NotificationTrigger, PlannerConfig, PlannerPhase,
    ReplanOutcome, ReplanReport,
};
pub use recurrence::HorizonConfig;
pub use rule::{ChangeRule, RawChangeRecord, Recurrence, RuleSet};
pub use storage::{Config, Database, OutboxSink, RoomChangeStore, SqliteStore};
pub use timeslot::{IgnoredHours, TimeSlotOverride, TimeSlotOverrides};
