//! Defines the registry entry: a named, armable timer in one clock domain.

use crate::common::{ActionRef, ClockDomain};
use crate::components::commands::Action;
use crate::error::SchedulerError;
use crate::time::{next_daily_occurrence, Deadline, DeviceClock};
use chrono::NaiveTime;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;

/// What the scheduler does with a timer after its action has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// The timer stays disarmed until someone starts or replaces it.
    #[default]
    OneShot,
    /// The timer is re-armed at `now + interval`.
    FixedInterval,
    /// The timer is re-armed at the next local occurrence of `at`.
    /// Wall-clock timers only.
    ScheduledAt { at: NaiveTime },
}

/// Everything needed to register a timer.
///
/// When both `interval` and `expiration` are present the interval wins.
/// `expiration` is a raw instant in the timer's domain: a tick value for
/// monotonic timers, local epoch seconds for wall-clock timers.
#[derive(Debug, Clone, Deserialize)]
pub struct TimerDefinition {
    pub action: ActionRef,
    #[serde(default)]
    pub armed: bool,
    #[serde(default)]
    pub domain: ClockDomain,
    #[serde(default, deserialize_with = "interval_from_secs")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub expiration: Option<i64>,
    #[serde(default)]
    pub recurrence: Recurrence,
}

impl TimerDefinition {
    /// An armed one-shot timer that expires `interval` from registration.
    pub fn after(action: ActionRef, domain: ClockDomain, interval: Duration) -> Self {
        Self {
            action,
            armed: true,
            domain,
            interval: Some(interval),
            expiration: None,
            recurrence: Recurrence::OneShot,
        }
    }

    /// An armed one-shot timer that expires at an absolute instant.
    pub fn at(action: ActionRef, deadline: Deadline) -> Self {
        let (domain, raw) = match deadline {
            Deadline::Ticks(ticks) => (ClockDomain::Monotonic, i64::from(ticks)),
            Deadline::Epoch(epoch) => (ClockDomain::WallClock, epoch),
        };
        Self {
            action,
            armed: true,
            domain,
            interval: None,
            expiration: Some(raw),
            recurrence: Recurrence::OneShot,
        }
    }

    pub fn armed(mut self, armed: bool) -> Self {
        self.armed = armed;
        self
    }

    pub fn recurring(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }
}

fn interval_from_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs: Option<f64> = Option::deserialize(deserializer)?;
    secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
        .transpose()
}

/// A registered timer.
pub struct Timer {
    action_ref: ActionRef,
    action: Action,
    interval: Option<Duration>,
    expiration: Deadline,
    armed: bool,
    recurrence: Recurrence,
    generation: u64,
}

impl Timer {
    /// Validates a definition and computes the first expiration.
    pub(crate) fn build(
        name: &str,
        definition: TimerDefinition,
        action: Action,
        clock: &dyn DeviceClock,
        generation: u64,
    ) -> Result<Self, SchedulerError> {
        let domain = definition.domain;
        match definition.recurrence {
            Recurrence::FixedInterval if definition.interval.is_none() => {
                return Err(SchedulerError::InvalidRecurrence {
                    name: name.to_string(),
                    reason: "fixed_interval recurrence needs an interval",
                });
            }
            Recurrence::ScheduledAt { .. } if domain != ClockDomain::WallClock => {
                return Err(SchedulerError::InvalidRecurrence {
                    name: name.to_string(),
                    reason: "scheduled_at recurrence needs the wall_clock domain",
                });
            }
            _ => {}
        }

        let expiration = if let Some(interval) = definition.interval {
            Deadline::after(domain, clock, interval).ok_or_else(|| {
                SchedulerError::IntervalOutOfRange {
                    name: name.to_string(),
                    millis: interval.as_millis(),
                }
            })?
        } else if let Some(raw) = definition.expiration {
            Deadline::at(domain, raw).ok_or_else(|| SchedulerError::ExpirationOutOfRange {
                name: name.to_string(),
                value: raw,
            })?
        } else if let Recurrence::ScheduledAt { at } = definition.recurrence {
            next_daily_occurrence(clock.epoch_seconds(), at)
                .map(Deadline::Epoch)
                .ok_or_else(|| SchedulerError::MissingExpiration {
                    name: name.to_string(),
                })?
        } else {
            return Err(SchedulerError::MissingExpiration {
                name: name.to_string(),
            });
        };

        Ok(Self {
            action_ref: definition.action,
            action,
            interval: definition.interval,
            expiration,
            armed: definition.armed,
            recurrence: definition.recurrence,
            generation,
        })
    }

    pub fn action_ref(&self) -> &ActionRef {
        &self.action_ref
    }

    pub fn domain(&self) -> ClockDomain {
        self.expiration.domain()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn expiration(&self) -> Deadline {
        self.expiration
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn recurrence(&self) -> Recurrence {
        self.recurrence
    }

    pub(crate) fn action(&self) -> Action {
        self.action.clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Arms the timer. Interval timers restart from now; absolute timers
    /// keep their stored expiration.
    pub(crate) fn start(&mut self, clock: &dyn DeviceClock, generation: u64) {
        if let Some(interval) = self.interval {
            if let Some(expiration) = Deadline::after(self.domain(), clock, interval) {
                self.expiration = expiration;
            }
        }
        self.armed = true;
        self.generation = generation;
    }

    /// Disarms the timer. The expiration is kept.
    pub(crate) fn stop(&mut self, generation: u64) {
        self.armed = false;
        self.generation = generation;
    }

    pub(crate) fn is_due(&self, clock: &dyn DeviceClock) -> bool {
        self.armed && self.expiration.has_passed(clock)
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    /// Applies the recurrence policy after a firing.
    /// Returns `true` if the timer was armed again.
    pub(crate) fn rearm(&mut self, clock: &dyn DeviceClock) -> bool {
        let next = match self.recurrence {
            Recurrence::OneShot => None,
            Recurrence::FixedInterval => self
                .interval
                .and_then(|interval| Deadline::after(self.domain(), clock, interval)),
            Recurrence::ScheduledAt { at } => {
                next_daily_occurrence(clock.epoch_seconds(), at).map(Deadline::Epoch)
            }
        };
        match next {
            Some(expiration) => {
                self.expiration = expiration;
                self.armed = true;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Domain: {:?}", self.domain())?;
        writeln!(f, "  Armed: {}", self.armed)?;
        writeln!(f, "  Action: {}", self.action_ref)?;
        writeln!(f, "  Interval: {:?}", self.interval)?;
        writeln!(f, "  Expiration: {}", self.expiration)?;
        write!(f, "  Recurrence: {:?}", self.recurrence)
    }
}
