//! The device clock: tick counter, wall clock and real-time-clock setter.
//!
//! Everything in Chronodeck reads time through the [`DeviceClock`] trait so the
//! scheduler can run against real hardware, a host emulation, or a fully
//! manual [`SimulatedClock`] in simulations and tests.
//!
//! The wall clock holds *local* time. After the sync engine sets the RTC,
//! `epoch_seconds()` counts local seconds, not UTC seconds.

use crate::common::ClockDomain;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::{Duration, Instant};

/// Largest interval that can be armed on the tick counter.
///
/// Wraparound-safe comparison only works while the distance between two tick
/// values is below half the counter range.
pub const MAX_TICK_INTERVAL_MS: u32 = i32::MAX as u32;

/// Signed distance from `start` to `end` on the wrapping tick counter.
pub fn ticks_diff(end: u32, start: u32) -> i32 {
    end.wrapping_sub(start) as i32
}

/// Adds `delta_ms` to a tick value, wrapping at the counter range.
pub fn ticks_add(ticks: u32, delta_ms: u32) -> u32 {
    ticks.wrapping_add(delta_ms)
}

/// A calendar value to load into the real-time clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcDateTime {
    /// Local wall-clock date and time.
    pub local: NaiveDateTime,
    /// Day of week, 0 = Monday .. 6 = Sunday.
    pub weekday: u8,
}

impl RtcDateTime {
    pub fn new(local: NaiveDateTime, weekday: u8) -> Self {
        Self { local, weekday }
    }

    /// Builds a value whose weekday is derived from the date itself.
    pub fn from_local(local: NaiveDateTime) -> Self {
        let weekday = local.weekday().num_days_from_monday() as u8;
        Self { local, weekday }
    }

    /// The local wall-clock reading expressed as epoch seconds.
    pub fn local_epoch(&self) -> i64 {
        self.local.and_utc().timestamp()
    }
}

/// Converts a 1 = Monday .. 7 = Sunday weekday into 0 = Monday .. 6 = Sunday.
///
/// Values that fall below zero after the decrement wrap to 6 (Sunday).
pub fn normalize_weekday(day_of_week: i64) -> u8 {
    let zero_based = day_of_week - 1;
    if zero_based < 0 {
        6
    } else {
        (zero_based % 7) as u8
    }
}

/// Interprets local epoch seconds as a calendar value.
pub fn local_datetime(epoch_seconds: i64) -> Option<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp(epoch_seconds, 0).map(|dt| dt.naive_utc())
}

/// The first local instant strictly after `now` whose time of day is `at`.
pub fn next_daily_occurrence(now: i64, at: NaiveTime) -> Option<i64> {
    let today = local_datetime(now)?.date().and_time(at).and_utc().timestamp();
    if today > now {
        Some(today)
    } else {
        Some(today + ChronoDuration::days(1).num_seconds())
    }
}

/// Formats a wall-clock time the way the panel shows it, e.g. `2:05 PM`.
pub fn format_12h(local: NaiveDateTime) -> String {
    let (is_pm, hour) = local.hour12();
    let suffix = if is_pm { "PM" } else { "AM" };
    format!("{}:{:02} {}", hour, local.minute(), suffix)
}

/// The time sources a panel exposes to the scheduler.
///
/// All methods take `&self`: the clock is shared by the scheduler and the sync
/// engine on a single thread, so implementations use interior mutability.
pub trait DeviceClock {
    /// Milliseconds from an arbitrary origin. Wraps at `u32::MAX`.
    fn ticks_ms(&self) -> u32;

    /// Local wall-clock time in epoch seconds.
    fn epoch_seconds(&self) -> i64;

    /// Loads a new local date and time into the real-time clock.
    fn set_datetime(&self, value: RtcDateTime);

    /// Blocks the calling thread.
    fn sleep(&self, duration: Duration);

    fn now_local(&self) -> Option<NaiveDateTime> {
        local_datetime(self.epoch_seconds())
    }
}

/// An absolute expiration instant in one of the two clock domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Ticks(u32),
    Epoch(i64),
}

impl Deadline {
    pub fn domain(self) -> ClockDomain {
        match self {
            Deadline::Ticks(_) => ClockDomain::Monotonic,
            Deadline::Epoch(_) => ClockDomain::WallClock,
        }
    }

    /// `now + interval` in `domain`, or `None` when the interval cannot be
    /// represented there.
    pub fn after(domain: ClockDomain, clock: &dyn DeviceClock, interval: Duration) -> Option<Self> {
        match domain {
            ClockDomain::Monotonic => {
                let millis = u32::try_from(interval.as_millis())
                    .ok()
                    .filter(|ms| *ms <= MAX_TICK_INTERVAL_MS)?;
                Some(Deadline::Ticks(ticks_add(clock.ticks_ms(), millis)))
            }
            ClockDomain::WallClock => {
                let secs = i64::try_from(interval.as_secs()).ok()?;
                clock.epoch_seconds().checked_add(secs).map(Deadline::Epoch)
            }
        }
    }

    /// Interprets a raw configured instant in `domain`.
    pub fn at(domain: ClockDomain, raw: i64) -> Option<Self> {
        match domain {
            ClockDomain::Monotonic => u32::try_from(raw).ok().map(Deadline::Ticks),
            ClockDomain::WallClock => Some(Deadline::Epoch(raw)),
        }
    }

    /// True once the clock has reached the deadline.
    pub fn has_passed(self, clock: &dyn DeviceClock) -> bool {
        match self {
            Deadline::Ticks(expiration) => ticks_diff(clock.ticks_ms(), expiration) >= 0,
            Deadline::Epoch(expiration) => clock.epoch_seconds() >= expiration,
        }
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deadline::Ticks(ticks) => write!(f, "tick {ticks}"),
            Deadline::Epoch(epoch) => match local_datetime(*epoch) {
                Some(local) => write!(f, "{local} (epoch {epoch})"),
                None => write!(f, "epoch {epoch}"),
            },
        }
    }
}

/// A host emulation of the panel's clocks.
///
/// Ticks come from a monotonic `Instant`; the RTC is kept as an offset from
/// the system's UTC clock, so it reads UTC until the first `set_datetime`.
pub struct SystemDeviceClock {
    boot: Instant,
    rtc_offset: Cell<i64>,
}

impl SystemDeviceClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            rtc_offset: Cell::new(0),
        }
    }
}

impl Default for SystemDeviceClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClock for SystemDeviceClock {
    fn ticks_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.boot.elapsed().as_millis() as u32
    }

    fn epoch_seconds(&self) -> i64 {
        Utc::now().timestamp() + self.rtc_offset.get()
    }

    fn set_datetime(&self, value: RtcDateTime) {
        self.rtc_offset
            .set(value.local_epoch() - Utc::now().timestamp());
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to.
///
/// `sleep` does not block; it records the requested pause and advances both
/// domains by it, so retry sequences run instantly but still move time.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    ticks: Cell<u32>,
    epoch: Cell<i64>,
    rtc_writes: RefCell<Vec<RtcDateTime>>,
    sleeps: RefCell<Vec<Duration>>,
}

impl SimulatedClock {
    pub fn new(ticks: u32, epoch_seconds: i64) -> Self {
        Self {
            ticks: Cell::new(ticks),
            epoch: Cell::new(epoch_seconds),
            ..Default::default()
        }
    }

    pub fn advance(&self, by: Duration) {
        self.ticks
            .set(ticks_add(self.ticks.get(), by.as_millis() as u32));
        self.epoch.set(self.epoch.get() + by.as_secs() as i64);
    }

    pub fn set_ticks(&self, ticks: u32) {
        self.ticks.set(ticks);
    }

    pub fn set_epoch(&self, epoch_seconds: i64) {
        self.epoch.set(epoch_seconds);
    }

    pub fn last_rtc_write(&self) -> Option<RtcDateTime> {
        self.rtc_writes.borrow().last().copied()
    }

    pub fn rtc_writes(&self) -> usize {
        self.rtc_writes.borrow().len()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl DeviceClock for SimulatedClock {
    fn ticks_ms(&self) -> u32 {
        self.ticks.get()
    }

    fn epoch_seconds(&self) -> i64 {
        self.epoch.get()
    }

    fn set_datetime(&self, value: RtcDateTime) {
        self.epoch.set(value.local_epoch());
        self.rtc_writes.borrow_mut().push(value);
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}
