use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod builder;

use builder::ZoneSelection;

const FORGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Generates the timezone transition table used by chronodeck's table strategy.
#[derive(Parser, Debug)]
#[command(name = "tzforge", version, about)]
struct Args {
    /// Build only this zone (e.g. America/Chicago). Unknown names build every zone.
    #[arg(long)]
    tz: Option<String>,

    /// Print the known zone names and exit without writing a table.
    #[arg(long)]
    list: bool,

    /// Reference year; each zone is anchored at January 1 of it.
    #[arg(long, default_value_t = 2025)]
    year: i32,

    /// Last year scanned for transitions.
    #[arg(long, default_value_t = 2037)]
    until: i32,

    /// Where to write the table.
    #[arg(short, long, default_value = "tz_data.json")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    if args.list {
        for name in builder::zone_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let selection = match args.tz {
        Some(name) => ZoneSelection::One(name),
        None => ZoneSelection::All,
    };
    let zones = selection.resolve();
    info!(
        "tzforge v{}: building {} zone(s) for {}..={}.",
        FORGE_VERSION,
        zones.len(),
        args.year,
        args.until
    );

    let table = builder::build(&zones, args.year, args.until);
    table
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "{} {} zone(s) to {}",
        "Wrote".green().bold(),
        table.len(),
        args.output.display().to_string().cyan()
    );
    Ok(())
}
