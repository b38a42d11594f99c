//! Startup wiring: fills the command table, registers configured timers and
//! runs the first clock sync.

use crate::common::ActionRef;
use crate::components::commands::CommandTable;
use crate::config::ChronodeckConfig;
use crate::engine::Scheduler;
use crate::error::SchedulerError;
use crate::sync::service::TimeService;
use crate::sync::TimeSync;
use crate::time::{format_12h, DeviceClock};
use anyhow::anyhow;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

pub fn show_time_action() -> ActionRef {
    ActionRef::new("panel", "show_time")
}

/// Adds the panel's built-in commands.
pub fn install_panel_commands(commands: &mut CommandTable) {
    commands.insert(show_time_action(), |scheduler: &mut Scheduler| {
        match scheduler.clock().now_local() {
            Some(local) => info!("Panel clock: {}", format_12h(local)),
            None => warn!("Panel clock is outside the calendar range."),
        }
    });
}

/// A fully wired panel, ready for `scheduler.run_until`.
pub struct Panel {
    pub scheduler: Scheduler,
    pub time_sync: Rc<RefCell<TimeSync>>,
}

/// Builds the scheduler and the sync engine from `config`.
///
/// # Errors
/// Fails on the first configured timer that cannot be registered.
pub fn bootstrap(
    config: &ChronodeckConfig,
    clock: Rc<dyn DeviceClock>,
    service: Box<dyn TimeService>,
) -> Result<Panel, SchedulerError> {
    let mut commands = CommandTable::new();
    install_panel_commands(&mut commands);
    let time_sync = Rc::new(RefCell::new(TimeSync::new(
        config.sync.clone(),
        service,
        clock.clone(),
    )));
    TimeSync::install(&time_sync, &mut commands);

    let mut scheduler = Scheduler::new(clock, commands);
    for (name, definition) in &config.timers {
        scheduler.register(name.clone(), definition.clone())?;
    }
    if config.sync.sync_on_boot {
        time_sync.borrow_mut().sync(&mut scheduler, None);
    }
    scheduler.log_timers();
    Ok(Panel {
        scheduler,
        time_sync,
    })
}

/// Starts the scheduler thread and waits until `build` has run on it.
///
/// The panel holds non-`Send` state, so `build` constructs it on the new
/// thread, which then sweeps every `poll_interval` until `shutdown` is set.
///
/// # Errors
/// Returns the error of `build` once the thread has exited, so a bad
/// configuration stops the host instead of leaving it idle.
pub fn spawn_host<F>(
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    build: F,
) -> anyhow::Result<JoinHandle<()>>
where
    F: FnOnce() -> anyhow::Result<Panel> + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
    let handle = std::thread::Builder::new()
        .name("chronodeck-scheduler".to_string())
        .spawn(move || {
            let mut panel = match build() {
                Ok(panel) => panel,
                Err(err) => {
                    error!("Panel startup failed: {:#}", err);
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            panel.scheduler.run_until(poll_interval, &shutdown);
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
        Err(_) => Err(anyhow!("scheduler thread exited during startup")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ClockDomain;
    use crate::components::timer::TimerDefinition;
    use crate::error::SyncError;
    use crate::sync::service::ZoneInfo;
    use crate::time::SimulatedClock;
    use std::sync::atomic::Ordering;

    struct Offline;

    impl TimeService for Offline {
        fn zone_info(&self, _timezone: &str) -> Result<ZoneInfo, SyncError> {
            Err(SyncError::Status(503))
        }

        fn utc_epoch(&self) -> Result<f64, SyncError> {
            Err(SyncError::Status(503))
        }
    }

    fn offline_config() -> ChronodeckConfig {
        let mut config = ChronodeckConfig::default();
        config.sync.sync_on_boot = false;
        config
    }

    fn build_offline(config: ChronodeckConfig) -> anyhow::Result<Panel> {
        let clock: Rc<dyn DeviceClock> = Rc::new(SimulatedClock::new(0, 1_751_600_000));
        Ok(bootstrap(&config, clock, Box::new(Offline))?)
    }

    #[test]
    fn host_reports_unknown_action_instead_of_idling() {
        let mut config = offline_config();
        config.timers.insert(
            "mystery".to_string(),
            TimerDefinition::after(
                ActionRef::new("panel", "launch_rockets"),
                ClockDomain::WallClock,
                Duration::from_secs(1),
            ),
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let result = spawn_host(Duration::from_millis(1), shutdown, move || build_offline(config));

        let err = result.err().expect("startup must fail");
        assert!(matches!(
            err.downcast_ref::<SchedulerError>(),
            Some(SchedulerError::UnknownAction { .. })
        ));
    }

    #[test]
    fn host_runs_until_shutdown() {
        let config = offline_config();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_host(Duration::from_millis(1), shutdown.clone(), move || {
            build_offline(config)
        })
        .unwrap();

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn panel_command_is_installed() {
        let mut commands = CommandTable::new();
        install_panel_commands(&mut commands);
        assert!(commands.contains(&show_time_action()));
    }
}
