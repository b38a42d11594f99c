//! The scheduler that owns the timer registry and drives it.
//!
//! Everything here runs on one thread. `sweep()` and every action it invokes
//! run to completion before the next scheduler activity, so the registry
//! needs no locking: each mutation is a single replace-by-name.

use crate::components::commands::CommandTable;
use crate::components::timer::{Timer, TimerDefinition};
use crate::error::SchedulerError;
use crate::time::DeviceClock;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// The outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Names of the timers whose actions ran, in firing order.
    pub fired: Vec<String>,
}

/// The named-timer registry and its sweep.
///
/// Timers are keyed by name. Registering a name that already exists replaces
/// the entry; stopping a timer keeps it addressable for a later `start`.
/// Entries are never removed individually.
pub struct Scheduler {
    clock: Rc<dyn DeviceClock>,
    commands: CommandTable,
    timers: HashMap<String, Timer>,
    next_generation: u64,
}

// Core implementation block for internal logic.
impl Scheduler {
    /// Creates an empty scheduler over `clock` using `commands` to resolve actions.
    pub fn new(clock: Rc<dyn DeviceClock>, commands: CommandTable) -> Self {
        Self {
            clock,
            commands,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    #[doc(hidden)]
    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Re-arms a timer per its recurrence, unless its action touched it.
    #[doc(hidden)]
    fn apply_recurrence(&mut self, name: &str, fired_generation: u64) {
        let clock = self.clock.clone();
        let Some(timer) = self.timers.get_mut(name) else {
            return;
        };
        if timer.generation() != fired_generation {
            trace!("Timer '{}' was replaced or restarted by its action.", name);
            return;
        }
        if timer.rearm(clock.as_ref()) {
            trace!("Timer '{}' re-armed for {}.", name, timer.expiration());
        }
    }
}

// Public API implementation block.
impl Scheduler {
    /// Creates or replaces the timer `name`.
    ///
    /// # Errors
    /// Fails if the definition's action is not in the command table or if the
    /// definition cannot produce an expiration instant. Both are configuration
    /// errors; nothing is registered in that case.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        definition: TimerDefinition,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        let action = self.commands.resolve(&definition.action).ok_or_else(|| {
            SchedulerError::UnknownAction {
                name: name.clone(),
                action: definition.action.clone(),
            }
        })?;
        let generation = self.bump_generation();
        let timer = Timer::build(&name, definition, action, self.clock.as_ref(), generation)?;
        debug!(
            "Registered timer '{}' -> {} ({:?}, armed: {}, expires {}).",
            name,
            timer.action_ref(),
            timer.domain(),
            timer.is_armed(),
            timer.expiration()
        );
        self.timers.insert(name, timer);
        Ok(())
    }

    /// Arms the timer `name`.
    ///
    /// Returns `false` (and logs) if no such timer exists.
    pub fn start(&mut self, name: &str) -> bool {
        let generation = self.bump_generation();
        let clock = self.clock.clone();
        match self.timers.get_mut(name) {
            Some(timer) => {
                timer.start(clock.as_ref(), generation);
                debug!("Started timer '{}', expires {}.", name, timer.expiration());
                true
            }
            None => {
                error!("Cannot start unknown timer '{}'.", name);
                false
            }
        }
    }

    /// Disarms the timer `name`, keeping its expiration.
    ///
    /// Returns `false` (and logs) if no such timer exists.
    pub fn stop(&mut self, name: &str) -> bool {
        let generation = self.bump_generation();
        match self.timers.get_mut(name) {
            Some(timer) => {
                timer.stop(generation);
                debug!("Stopped timer '{}'.", name);
                true
            }
            None => {
                error!("Cannot stop unknown timer '{}'.", name);
                false
            }
        }
    }

    /// Polls every registered timer once.
    ///
    /// An armed timer whose expiration has been reached is disarmed and its
    /// action runs synchronously. A timer fires at most once per sweep however
    /// overdue it is. Timers registered while the sweep runs are first
    /// considered by the next sweep.
    pub fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        let names: Vec<String> = self.timers.keys().cloned().collect();
        for name in names {
            let clock = self.clock.clone();
            let Some(timer) = self.timers.get_mut(&name) else {
                continue;
            };
            if !timer.is_due(clock.as_ref()) {
                continue;
            }
            timer.disarm();
            let fired_generation = timer.generation();
            let action = timer.action();
            trace!("Firing timer '{}' ({}).", name, timer.action_ref());
            action(self);
            self.apply_recurrence(&name, fired_generation);
            report.fired.push(name);
        }
        report
    }

    /// Runs `sweep()` every `poll_interval` until `shutdown` is set.
    pub fn run_until(&mut self, poll_interval: Duration, shutdown: &AtomicBool) {
        info!("Scheduler running with {} timer(s).", self.timers.len());
        while !shutdown.load(Ordering::Relaxed) {
            self.sweep();
            self.clock.sleep(poll_interval);
        }
        info!("Scheduler has shut down.");
    }

    pub fn timer(&self, name: &str) -> Option<&Timer> {
        self.timers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    /// `true` only for a registered timer that is currently armed.
    pub fn is_armed(&self, name: &str) -> bool {
        self.timers.get(name).is_some_and(Timer::is_armed)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clock(&self) -> Rc<dyn DeviceClock> {
        self.clock.clone()
    }

    /// Writes every timer to the debug log.
    pub fn log_timers(&self) {
        let mut names: Vec<&String> = self.timers.keys().collect();
        names.sort();
        for name in names {
            if let Some(timer) = self.timers.get(name) {
                debug!("{}:\n{}", name, timer);
            }
        }
    }

    /// Drops every timer. The command table is kept.
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
