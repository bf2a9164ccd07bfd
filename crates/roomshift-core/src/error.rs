//! Core error types for roomshift-core.
//!
//! The hierarchy mirrors how failures are treated by the engine:
//! missing or unreadable data degrades to empty results, malformed
//! announcement records are dropped at the conversion boundary, and
//! only a missing notification permission is surfaced to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for roomshift-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A storage read failed or returned nothing usable.
    #[error("Data unavailable ({what}): {message}")]
    DataUnavailable { what: String, message: String },

    /// Notification permission has not been granted.
    #[error("Notification permission denied")]
    PermissionDenied,

    /// The notification subsystem rejected or could not take a trigger.
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// An announcement record could not be turned into a rule.
    #[error("Malformed rule: {0}")]
    MalformedRule(#[from] RuleError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Reasons a raw announcement record is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("class hour {class_hour} is outside 1..=9")]
    ClassHourOutOfRange { class_hour: i64 },

    #[error("unknown recurrence: {0}")]
    UnknownRecurrence(String),

    #[error("missing or unparseable date field '{field}'")]
    MissingDate { field: &'static str },

    #[error("range ends ({end}) before it starts ({start})")]
    InvertedRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("unknown weekday code: {0}")]
    UnknownWeekday(String),
}

/// Failures reported by a notification sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// The sink refused a single trigger.
    #[error("trigger {id} rejected: {reason}")]
    Rejected { id: i32, reason: String },

    /// The sink itself could not be reached.
    #[error("notification subsystem unavailable: {0}")]
    Unavailable(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored value could not be decoded
    #[error("Corrupt value under key '{key}': {message}")]
    CorruptValue { key: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl CoreError {
    /// Shorthand for a [`CoreError::DataUnavailable`].
    pub fn unavailable(what: impl Into<String>, message: impl ToString) -> Self {
        CoreError::DataUnavailable {
            what: what.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
