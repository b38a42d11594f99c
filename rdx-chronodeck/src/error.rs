//! Error types for the scheduler and the time sync engine.

use crate::common::ActionRef;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The definition names a command that was never put in the command table.
    #[error("timer '{name}': unknown action '{action}'")]
    UnknownAction { name: String, action: ActionRef },

    #[error("timer '{name}': needs an interval, an expiration or a schedule")]
    MissingExpiration { name: String },

    #[error("timer '{name}': interval of {millis} ms is out of range for its clock domain")]
    IntervalOutOfRange { name: String, millis: u128 },

    #[error("timer '{name}': expiration {value} is out of range for its clock domain")]
    ExpirationOutOfRange { name: String, value: i64 },

    #[error("timer '{name}': {reason}")]
    InvalidRecurrence { name: String, reason: &'static str },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("time service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("time service answered with status {0}")]
    Status(u16),

    #[error("malformed time service response: {0}")]
    MalformedResponse(String),

    #[error("transition table I/O failed: {0}")]
    TableIo(#[from] std::io::Error),

    #[error("transition table is not valid JSON: {0}")]
    TableFormat(#[from] serde_json::Error),
}
