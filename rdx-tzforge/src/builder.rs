//! Builds transition tables from the chrono-tz database.
//!
//! chrono-tz does not expose its transition list, so transitions are found by
//! sampling the offset on an hourly grid and bisecting every change down to
//! the exact second.

use chrono::{DateTime, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::{Tz, TZ_VARIANTS};
use chronodeck::tz::TransitionTable;
use tracing::{debug, warn};

/// Sampling step of the transition scan. A change that is undone within
/// one step leaves both samples equal and is missed.
const SCAN_STEP_SECS: i64 = 3_600;

/// Transitions closer together than this are logged for review.
const CLUSTER_SECS: i64 = 86_400;

/// Which zones a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneSelection {
    All,
    One(String),
}

impl ZoneSelection {
    /// The zones to build. An unknown single zone falls back to all zones.
    pub fn resolve(&self) -> Vec<Tz> {
        match self {
            ZoneSelection::All => TZ_VARIANTS.to_vec(),
            ZoneSelection::One(name) => match name.parse::<Tz>().ok() {
                Some(zone) => vec![zone],
                None => {
                    warn!(
                        "Time zone '{}' is not known; building the full table instead.",
                        name
                    );
                    TZ_VARIANTS.to_vec()
                }
            },
        }
    }
}

/// Every known zone name, sorted.
pub fn zone_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = TZ_VARIANTS.iter().map(|tz| tz.name()).collect();
    names.sort_unstable();
    names
}

/// Midnight UTC on January 1 of `year`.
pub fn year_start(year: i32) -> Option<i64> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc().timestamp())
}

/// Total UTC offset of `zone` at the UTC instant `at`.
pub fn offset_at(zone: Tz, at: i64) -> Option<i32> {
    let utc = DateTime::<Utc>::from_timestamp(at, 0)?;
    Some(
        zone.offset_from_utc_datetime(&utc.naive_utc())
            .fix()
            .local_minus_utc(),
    )
}

/// Transitions of `zone` in `[from, until)`, each as `(instant, new offset)`.
pub fn transitions(zone: Tz, from: i64, until: i64) -> Vec<(i64, i32)> {
    scan(zone, from, until, SCAN_STEP_SECS)
}

fn scan(zone: Tz, from: i64, until: i64, step: i64) -> Vec<(i64, i32)> {
    let mut found: Vec<(i64, i32)> = Vec::new();
    let Some(mut offset) = offset_at(zone, from) else {
        return found;
    };
    let mut lo = from;
    while lo < until {
        let hi = (lo + step).min(until);
        let Some(hi_offset) = offset_at(zone, hi) else {
            break;
        };
        if hi_offset != offset {
            let (instant, new_offset) = bisect(zone, lo, offset, hi);
            if let Some((previous, _)) = found.last() {
                if instant - previous < CLUSTER_SECS {
                    debug!(
                        "{}: transitions at {} and {} are {} s apart; shorter pairs would be missed below {} s.",
                        zone.name(),
                        previous,
                        instant,
                        instant - previous,
                        step
                    );
                }
            }
            found.push((instant, new_offset));
            offset = new_offset;
            lo = instant;
        } else {
            lo = hi;
        }
    }
    found
}

/// First second in `(lo, hi]` whose offset differs from `lo_offset`.
fn bisect(zone: Tz, mut lo: i64, lo_offset: i32, mut hi: i64) -> (i64, i32) {
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if offset_at(zone, mid) == Some(lo_offset) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (hi, offset_at(zone, hi).unwrap_or(lo_offset))
}

/// Builds the table for `zones`.
///
/// Each zone gets an anchor entry at January 1 of `reference_year` (UTC)
/// holding the offset in force then, followed by every transition from that
/// instant up to the end of `until_year`.
pub fn build(zones: &[Tz], reference_year: i32, until_year: i32) -> TransitionTable {
    let mut table = TransitionTable::new();
    let (Some(anchor), Some(until)) = (year_start(reference_year), year_start(until_year + 1)) else {
        warn!(
            "Years {}..={} are outside the calendar range; table is empty.",
            reference_year, until_year
        );
        return table;
    };
    for zone in zones {
        let Some(anchor_offset) = offset_at(*zone, anchor) else {
            continue;
        };
        table.insert(zone.name(), anchor, anchor_offset);
        let found = transitions(*zone, anchor, until);
        debug!("{}: {} transition(s).", zone.name(), found.len());
        for (instant, offset) in found {
            table.insert(zone.name(), instant, offset);
        }
    }
    table
}
