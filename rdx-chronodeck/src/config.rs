//! Defines all configuration structures for Chronodeck.
//!
//! These structs are deserialized from a TOML file (plus `CHRONODECK__*`
//! environment overrides) using the `config` crate and `serde`. Timers, the
//! sync strategy and its retry policy are all defined here rather than in
//! application code.

use crate::components::timer::TimerDefinition;
use chrono::NaiveTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChronodeckConfig {
    /// Pause between two scheduler sweeps, in milliseconds.
    pub poll_interval_ms: u64,

    /// Clock synchronisation settings.
    pub sync: SyncConfig,

    /// Timers registered at boot, keyed by timer name.
    pub timers: BTreeMap<String, TimerDefinition>,
}

impl Default for ChronodeckConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            sync: SyncConfig::default(),
            timers: BTreeMap::new(),
        }
    }
}

impl ChronodeckConfig {
    /// Loads the configuration from `path` (optional) and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CHRONODECK").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Which source of truth the sync engine uses for the local offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategyKind {
    /// Ask a timezone web service for local time, offsets and DST window.
    #[default]
    Lookup,
    /// Fetch raw UTC epoch seconds and apply the local transition table.
    Table,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub strategy: SyncStrategyKind,

    /// IANA zone name, e.g. "America/Chicago". `GMT` when unset.
    pub timezone: Option<String>,

    /// Base URL of the timezone service; the zone name is appended.
    pub lookup_url: String,

    /// URL returning the current UTC epoch seconds.
    pub epoch_url: String,

    /// Transition table produced by `tzforge`.
    pub table_path: PathBuf,

    pub request_timeout_secs: u64,
    pub lookup_attempts: u32,
    pub epoch_attempts: u32,
    pub backoff_step_secs: u64,

    /// Deferral before a failed lookup sync is tried again.
    pub lookup_retry_secs: u64,
    /// Deferral before a failed table sync is tried again.
    pub epoch_retry_secs: u64,

    /// Added to every transition-driven resync instant.
    pub resync_margin_secs: i64,

    /// Local time of day for the next-day recheck outside DST.
    pub daily_recheck: NaiveTime,

    /// Recheck delay once the table has no future transition. 0 disables it.
    pub recheck_horizon_secs: u64,

    /// Run one sync before the scheduler starts.
    pub sync_on_boot: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strategy: SyncStrategyKind::default(),
            timezone: None,
            lookup_url: "http://worldtimeapi.org/api/timezone".to_string(),
            epoch_url: "http://worldtimeapi.org/api/timezone/Etc/UTC".to_string(),
            table_path: PathBuf::from("tz_data.json"),
            request_timeout_secs: 5,
            lookup_attempts: 5,
            epoch_attempts: 4,
            backoff_step_secs: 3,
            lookup_retry_secs: 3_600,
            epoch_retry_secs: 600,
            resync_margin_secs: 600,
            daily_recheck: NaiveTime::from_hms_opt(2, 10, 0).unwrap_or_default(),
            recheck_horizon_secs: 30 * 86_400,
            sync_on_boot: true,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_step(&self) -> Duration {
        Duration::from_secs(self.backoff_step_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ClockDomain;
    use crate::components::timer::Recurrence;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_policy() {
        let sync = SyncConfig::default();
        assert_eq!(sync.lookup_attempts, 5);
        assert_eq!(sync.epoch_attempts, 4);
        assert_eq!(sync.backoff_step(), Duration::from_secs(3));
        assert_eq!(sync.lookup_retry_secs, 3_600);
        assert_eq!(sync.epoch_retry_secs, 600);
        assert_eq!(sync.daily_recheck, NaiveTime::from_hms_opt(2, 10, 0).unwrap());
    }

    #[test]
    fn loads_timers_and_sync_settings_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
poll_interval_ms = 50

[sync]
strategy = "table"
timezone = "America/Chicago"

[timers.clock_refresh]
action = "panel::show_time"
armed = true
domain = "monotonic"
interval = 60
recurrence = {{ kind = "fixed_interval" }}

[timers.nightly]
action = "timesync::sync"
armed = true
domain = "wall_clock"
recurrence = {{ kind = "scheduled_at", at = "03:00:00" }}
"#
        )
        .unwrap();

        let config = ChronodeckConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.sync.strategy, SyncStrategyKind::Table);
        assert_eq!(config.sync.timezone.as_deref(), Some("America/Chicago"));
        assert_eq!(config.sync.epoch_attempts, 4);

        let refresh = &config.timers["clock_refresh"];
        assert_eq!(refresh.domain, ClockDomain::Monotonic);
        assert_eq!(refresh.interval, Some(Duration::from_secs(60)));
        assert_eq!(refresh.recurrence, Recurrence::FixedInterval);

        let nightly = &config.timers["nightly"];
        assert_eq!(nightly.domain, ClockDomain::WallClock);
        assert_eq!(
            nightly.recurrence,
            Recurrence::ScheduledAt {
                at: NaiveTime::from_hms_opt(3, 0, 0).unwrap()
            }
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ChronodeckConfig::load("/nonexistent/chronodeck.toml").unwrap();
        assert_eq!(config.poll_interval_ms, 20);
        assert!(config.timers.is_empty());
    }
}
