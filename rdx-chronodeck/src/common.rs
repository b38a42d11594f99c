//! Contains common, primitive types shared by the scheduler and the sync engine.
//!
//! This module defines the small value types used to name actions and select
//! a timer's clock domain. Using distinct types improves type safety and keeps
//! the configuration format readable.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A prelude module for convenient importing of the most common Chronodeck types.
///
/// # Example
/// ```
/// use chronodeck::common::prelude::*;
/// ```
pub mod prelude {
    pub use super::{ActionRef, ClockDomain};
    pub use crate::engine::Scheduler;
}

/// Identifies a zero-argument command by namespace and symbol.
///
/// An `ActionRef` is written `namespace::symbol` in configuration files
/// (e.g. `"timesync::sync"`). It is resolved against the scheduler's
/// command table when a timer is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct ActionRef {
    pub namespace: String,
    pub symbol: String,
}

impl ActionRef {
    pub fn new(namespace: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace, self.symbol)
    }
}

impl FromStr for ActionRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("::") {
            Some((namespace, symbol)) if !namespace.is_empty() && !symbol.is_empty() => {
                Ok(Self::new(namespace, symbol))
            }
            _ => Err(format!(
                "action reference '{s}' must have the form 'namespace::symbol'"
            )),
        }
    }
}

impl TryFrom<String> for ActionRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The clock a timer measures its expiration against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockDomain {
    /// Free-running millisecond tick counter. Wraps; use for short intervals.
    #[default]
    Monotonic,
    /// Device wall clock in local epoch seconds. Follows every RTC set.
    WallClock,
}
