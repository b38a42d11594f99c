use anyhow::{anyhow, Result};
use chronodeck::boot::{bootstrap, spawn_host};
use chronodeck::prelude::*;
use chronodeck::sync::service::HttpTimeService;
use chronodeck::{ENGINE_NAME, VERSION};
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chronodeck", version, about = "Runs the panel timer scheduler.")]
struct Args {
    /// TOML configuration file. Missing files fall back to defaults.
    #[arg(short, long, default_value = "chronodeck.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration.
    let args = Args::parse();
    let config = ChronodeckConfig::load(&args.config)?;
    info!("{} v{} starting with {}.", ENGINE_NAME, VERSION, args.config.display());

    // 3. The scheduler is single-threaded and owns non-Send state, so it is
    //    built and driven on its own thread. Startup errors end the process.
    let shutdown = Arc::new(AtomicBool::new(false));
    let poll_interval = config.poll_interval();
    let host_shutdown = shutdown.clone();
    let host = tokio::task::spawn_blocking(move || {
        spawn_host(poll_interval, host_shutdown, move || {
            let clock: Rc<dyn DeviceClock> = Rc::new(SystemDeviceClock::new());
            let service = HttpTimeService::new(&config.sync)?;
            Ok(bootstrap(&config, clock, Box::new(service))?)
        })
    })
    .await??;

    // 4. Run until Ctrl+C.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping the scheduler...");
    shutdown.store(true, Ordering::Relaxed);

    tokio::task::spawn_blocking(move || host.join())
        .await?
        .map_err(|_| anyhow!("scheduler thread panicked"))?;
    info!("{} has shut down.", ENGINE_NAME);
    Ok(())
}
