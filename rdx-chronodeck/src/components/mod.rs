//! Contains the building blocks the scheduler is made of.
//!
//! This module provides the timer itself (with its definition and recurrence
//! policy) and the command table that timers resolve their actions against.
//! The `Scheduler` manages a registry of these components.

pub mod commands;
pub mod timer;
