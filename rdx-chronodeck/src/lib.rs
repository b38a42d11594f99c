//! # Chronodeck
//!
//! A cooperative named-timer scheduler with DST-aware clock synchronisation,
//! built for touch panels that poll their work from a single main loop.
//!
//! ## Core Concepts
//!
//! - **DeviceClock**: Two clock domains behind one trait: a wrapping
//!   millisecond tick counter and a local wall clock in epoch seconds.
//! - **Scheduler**: A registry of named timers. Each call to `sweep()` fires
//!   every armed timer whose expiration has been reached, once.
//! - **Command Table**: Timers name their action as `namespace::symbol`; the
//!   reference is resolved when the timer is registered, never when it fires.
//! - **TimeSync**: Sets the device clock from a time service and re-arms
//!   itself at the next DST transition.
//!
//! ## Example Usage
//!
//! ```rust
//! use chronodeck::prelude::*;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let clock = Rc::new(SimulatedClock::new(0, 0));
//! let mut commands = CommandTable::new();
//! commands.insert(ActionRef::new("panel", "beep"), |_| println!("beep"));
//!
//! let mut scheduler = Scheduler::new(clock.clone(), commands);
//! scheduler
//!     .register(
//!         "beep",
//!         TimerDefinition::after(
//!             ActionRef::new("panel", "beep"),
//!             ClockDomain::Monotonic,
//!             Duration::from_millis(250),
//!         ),
//!     )
//!     .unwrap();
//!
//! clock.advance(Duration::from_millis(250));
//! assert_eq!(scheduler.sweep().fired, vec!["beep".to_string()]);
//! ```

pub const ENGINE_NAME: &str = "Chronodeck";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod boot;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod sync;
pub mod time;
pub mod tz;

/// A prelude module for easy importing of the most common Chronodeck types.
pub mod prelude {
    pub use crate::common::{ActionRef, ClockDomain};
    pub use crate::components::commands::CommandTable;
    pub use crate::components::timer::{Recurrence, TimerDefinition};
    pub use crate::config::{ChronodeckConfig, SyncConfig, SyncStrategyKind};
    pub use crate::engine::{Scheduler, SweepReport};
    pub use crate::error::{SchedulerError, SyncError};
    pub use crate::sync::{SyncOutcome, TimeSync};
    pub use crate::time::{Deadline, DeviceClock, SimulatedClock, SystemDeviceClock};
    pub use crate::tz::TransitionTable;
}
