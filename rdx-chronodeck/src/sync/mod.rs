//! The time sync engine.
//!
//! `TimeSync::sync` sets the device clock to local time and then schedules
//! its own next run through the scheduler: at the end of the current DST
//! window, at the next table transition, or on a daily recheck. When the time
//! service cannot be reached it schedules a deferred retry instead. It never
//! fails outward.
//!
//! Two strategies are available, selected by [`SyncStrategyKind`]:
//!
//! - **lookup**: a timezone web service returns local time, offsets and the
//!   DST window directly.
//! - **table**: a service returns raw UTC epoch seconds and the offset comes
//!   from the transition table built by `tzforge`.

pub mod retry;
pub mod service;

use crate::common::{ActionRef, ClockDomain};
use crate::components::commands::CommandTable;
use crate::components::timer::TimerDefinition;
use crate::config::{SyncConfig, SyncStrategyKind};
use crate::engine::Scheduler;
use crate::time::{local_datetime, Deadline, DeviceClock, RtcDateTime};
use crate::tz::TransitionTable;
use retry::RetryPolicy;
use service::{whole_epoch_seconds, TimeService};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timer that runs the next regular resync.
pub const RESYNC_TIMER: &str = "time_sync_resync";
/// Timer that retries a sync whose requests all failed.
pub const RETRY_TIMER: &str = "time_sync_retry";
/// Zone used when no timezone was ever given.
pub const DEFAULT_TIMEZONE: &str = "GMT";

/// The command the sync engine is reachable under.
pub fn sync_action() -> ActionRef {
    ActionRef::new("timesync", "sync")
}

/// What one `sync` call achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The clock was set. `next_resync` is in local epoch seconds.
    Synced {
        offset_seconds: i64,
        next_resync: Option<i64>,
    },
    /// Every request failed; a retry is scheduled at `retry_at`.
    Deferred { retry_at: i64 },
}

pub struct TimeSync {
    config: SyncConfig,
    service: Box<dyn TimeService>,
    clock: Rc<dyn DeviceClock>,
    table: TransitionTable,
    remembered_timezone: Option<String>,
}

impl TimeSync {
    /// Creates the engine. The table strategy loads its transition table
    /// here; a missing or unreadable table degrades to offset 0.
    pub fn new(config: SyncConfig, service: Box<dyn TimeService>, clock: Rc<dyn DeviceClock>) -> Self {
        let table = match config.strategy {
            SyncStrategyKind::Table => match TransitionTable::load(&config.table_path) {
                Ok(table) => {
                    info!(
                        "Loaded transitions for {} zone(s) from {}.",
                        table.len(),
                        config.table_path.display()
                    );
                    table
                }
                Err(err) => {
                    error!(
                        "Cannot load transition table {}: {}. Offsets default to 0.",
                        config.table_path.display(),
                        err
                    );
                    TransitionTable::new()
                }
            },
            SyncStrategyKind::Lookup => TransitionTable::new(),
        };
        let remembered_timezone = config.timezone.clone();
        Self {
            config,
            service,
            clock,
            table,
            remembered_timezone,
        }
    }

    /// Replaces the transition table.
    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    /// Puts `timesync::sync` into the command table. The command syncs the
    /// remembered timezone.
    pub fn install(engine: &Rc<RefCell<TimeSync>>, commands: &mut CommandTable) {
        let engine = Rc::clone(engine);
        commands.insert(sync_action(), move |scheduler: &mut Scheduler| {
            engine.borrow_mut().sync(scheduler, None);
        });
    }

    /// The zone the next argument-less `sync` will use.
    pub fn timezone(&self) -> &str {
        self.remembered_timezone
            .as_deref()
            .unwrap_or(DEFAULT_TIMEZONE)
    }

    /// Sets the device clock for `timezone` (or the remembered one) and
    /// schedules the next sync. Safe to call repeatedly.
    pub fn sync(&mut self, scheduler: &mut Scheduler, timezone: Option<&str>) -> SyncOutcome {
        if let Some(zone) = timezone {
            self.remembered_timezone = Some(zone.to_string());
        }
        let zone = self.timezone().to_string();
        info!("Synchronising clock for '{}' ({:?}).", zone, self.config.strategy);
        match self.config.strategy {
            SyncStrategyKind::Lookup => self.sync_lookup(scheduler, &zone),
            SyncStrategyKind::Table => self.sync_table(scheduler, &zone),
        }
    }

    #[doc(hidden)]
    fn sync_lookup(&self, scheduler: &mut Scheduler, zone: &str) -> SyncOutcome {
        let policy = RetryPolicy::new(self.config.lookup_attempts, self.config.backoff_step());
        let fetched = policy.run(self.clock.as_ref(), "Timezone lookup", || {
            self.service.zone_info(zone)?.reading()
        });
        let reading = match fetched {
            Ok(reading) => reading,
            Err(err) => {
                error!("Maximum retries reached for timezone lookup: {}.", err);
                return self.defer(scheduler, self.config.lookup_retry_secs);
            }
        };

        self.clock
            .set_datetime(RtcDateTime::new(reading.local, reading.weekday));
        info!(
            "Clock set to {} (offset {} s, dst: {}).",
            reading.local,
            reading.offset_seconds,
            reading.dst_until.is_some()
        );

        let now = self.clock.epoch_seconds();
        // dst_until is UTC; the clock now runs on local time.
        let dst_end = reading
            .dst_until
            .and_then(|end| end.checked_add(reading.offset_seconds))
            .and_then(|end| end.checked_add(self.config.resync_margin_secs))
            .filter(|at| *at > now);
        let next = dst_end.or_else(|| {
            reading
                .local
                .date()
                .succ_opt()
                .map(|tomorrow| {
                    tomorrow
                        .and_time(self.config.daily_recheck)
                        .and_utc()
                        .timestamp()
                })
        });
        if let Some(at) = next {
            self.schedule_resync(scheduler, at);
        }
        SyncOutcome::Synced {
            offset_seconds: reading.offset_seconds,
            next_resync: next,
        }
    }

    #[doc(hidden)]
    fn sync_table(&self, scheduler: &mut Scheduler, zone: &str) -> SyncOutcome {
        let policy = RetryPolicy::new(self.config.epoch_attempts, self.config.backoff_step());
        let fetched = policy.run(self.clock.as_ref(), "Epoch lookup", || {
            whole_epoch_seconds(self.service.utc_epoch()?)
        });
        let utc = match fetched {
            Ok(seconds) => seconds,
            Err(err) => {
                error!("Maximum retries reached for epoch lookup: {}.", err);
                return self.defer(scheduler, self.config.epoch_retry_secs);
            }
        };

        if !self.table.contains_zone(zone) {
            warn!("No transition data for '{}'; using offset 0.", zone);
        }
        let lookup = self.table.lookup(zone, utc);
        let offset = i64::from(lookup.offset_seconds);
        let Some(local) = utc.checked_add(offset).and_then(local_datetime) else {
            error!("Epoch {} is outside the calendar range.", utc);
            return self.defer(scheduler, self.config.epoch_retry_secs);
        };

        self.clock.set_datetime(RtcDateTime::from_local(local));
        info!("Clock set to {} (offset {} s).", local, offset);

        let next = match lookup.next_transition {
            Some(transition) => transition
                .checked_add(offset)
                .and_then(|at| at.checked_add(self.config.resync_margin_secs))
                .or_else(|| {
                    warn!("Transition {} for '{}' is out of range; no resync scheduled.", transition, zone);
                    None
                }),
            None if self.config.recheck_horizon_secs > 0 => {
                warn!(
                    "No transition for '{}' after {}; rechecking in {} s.",
                    zone, utc, self.config.recheck_horizon_secs
                );
                i64::try_from(self.config.recheck_horizon_secs)
                    .ok()
                    .and_then(|horizon| utc.checked_add(offset)?.checked_add(horizon))
            }
            None => {
                warn!("No transition for '{}' after {}; no resync scheduled.", zone, utc);
                None
            }
        };
        if let Some(at) = next {
            self.schedule_resync(scheduler, at);
        }
        SyncOutcome::Synced {
            offset_seconds: offset,
            next_resync: next,
        }
    }

    #[doc(hidden)]
    fn defer(&self, scheduler: &mut Scheduler, delay_secs: u64) -> SyncOutcome {
        let definition = TimerDefinition::after(
            sync_action(),
            ClockDomain::WallClock,
            Duration::from_secs(delay_secs),
        );
        if let Err(err) = scheduler.register(RETRY_TIMER, definition) {
            error!("Cannot schedule sync retry: {}.", err);
        }
        let retry_at = self
            .clock
            .epoch_seconds()
            .saturating_add(i64::try_from(delay_secs).unwrap_or(i64::MAX));
        info!("Will try setting the clock again in {} s.", delay_secs);
        SyncOutcome::Deferred { retry_at }
    }

    #[doc(hidden)]
    fn schedule_resync(&self, scheduler: &mut Scheduler, at: i64) {
        let definition = TimerDefinition::at(sync_action(), Deadline::Epoch(at));
        match scheduler.register(RESYNC_TIMER, definition) {
            Ok(()) => debug!("Next clock sync at {}.", Deadline::Epoch(at)),
            Err(err) => error!("Cannot schedule next clock sync: {}.", err),
        }
        if scheduler.is_armed(RETRY_TIMER) {
            scheduler.stop(RETRY_TIMER);
        }
    }
}
