//! The timezone transition table shared by `tzforge` and the sync engine.
//!
//! On disk the table is a JSON object keyed by zone name. Each zone maps UTC
//! epoch-second instants (as string keys) to the total UTC offset, in seconds,
//! that takes effect at that instant:
//!
//! ```json
//! {"America/Chicago": {"1735689600": -21600, "1741507200": -18000}}
//! ```

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Bound::{Excluded, Unbounded};
use std::path::Path;
use tracing::warn;

/// The result of looking up one zone at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetLookup {
    /// Offset in force at the instant, 0 if nothing applies.
    pub offset_seconds: i32,
    /// The first transition strictly after the instant, if the table has one.
    pub next_transition: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionTable {
    zones: BTreeMap<String, BTreeMap<i64, i32>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a table file. Zones without any entry are dropped with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut table: Self = serde_json::from_reader(reader)?;
        table.zones.retain(|zone, entries| {
            if entries.is_empty() {
                warn!("Transition table has no entries for '{}'; ignoring it.", zone);
            }
            !entries.is_empty()
        });
        Ok(table)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SyncError> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Records that `offset_seconds` takes effect in `zone` at `instant`.
    pub fn insert(&mut self, zone: &str, instant: i64, offset_seconds: i32) {
        self.zones
            .entry(zone.to_string())
            .or_default()
            .insert(instant, offset_seconds);
    }

    pub fn contains_zone(&self, zone: &str) -> bool {
        self.zones.contains_key(zone)
    }

    /// All entries of a zone in ascending instant order.
    pub fn entries(&self, zone: &str) -> Option<impl Iterator<Item = (i64, i32)> + '_> {
        self.zones
            .get(zone)
            .map(|entries| entries.iter().map(|(instant, offset)| (*instant, *offset)))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// The offset in force in `zone` at `now` and the next transition after it.
    ///
    /// Unknown zones yield offset 0 and no next transition.
    pub fn lookup(&self, zone: &str, now: i64) -> OffsetLookup {
        let Some(entries) = self.zones.get(zone) else {
            return OffsetLookup {
                offset_seconds: 0,
                next_transition: None,
            };
        };
        let offset_seconds = entries
            .range(..=now)
            .next_back()
            .map_or(0, |(_, offset)| *offset);
        let next_transition = entries
            .range((Excluded(now), Unbounded))
            .next()
            .map(|(instant, _)| *instant);
        OffsetLookup {
            offset_seconds,
            next_transition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn two_step_table() -> TransitionTable {
        serde_json::from_str(r#"{"Zone": {"1000": 0, "2000": 3600}}"#).unwrap()
    }

    #[test]
    fn lookup_between_transitions() {
        let lookup = two_step_table().lookup("Zone", 1500);
        assert_eq!(lookup.offset_seconds, 0);
        assert_eq!(lookup.next_transition, Some(2000));
    }

    #[test]
    fn lookup_after_last_transition() {
        let lookup = two_step_table().lookup("Zone", 2500);
        assert_eq!(lookup.offset_seconds, 3600);
        assert_eq!(lookup.next_transition, None);
    }

    #[test]
    fn lookup_exactly_on_a_transition_uses_it() {
        let lookup = two_step_table().lookup("Zone", 2000);
        assert_eq!(lookup.offset_seconds, 3600);
        assert_eq!(lookup.next_transition, None);
    }

    #[test]
    fn lookup_before_first_entry_defaults_to_zero() {
        let lookup = two_step_table().lookup("Zone", 10);
        assert_eq!(lookup.offset_seconds, 0);
        assert_eq!(lookup.next_transition, Some(1000));
    }

    #[test]
    fn unknown_zone_defaults_to_zero() {
        let lookup = two_step_table().lookup("Mars/Olympus", 1500);
        assert_eq!(
            lookup,
            OffsetLookup {
                offset_seconds: 0,
                next_transition: None
            }
        );
    }

    #[test]
    fn entries_are_sorted_numerically_not_lexically() {
        let table: TransitionTable =
            serde_json::from_str(r#"{"Zone": {"900": 1, "10000": 3, "2000": 2}}"#).unwrap();
        let instants: Vec<i64> = table.entries("Zone").unwrap().map(|(i, _)| i).collect();
        assert_eq!(instants, vec![900, 2000, 10000]);
    }

    #[test]
    fn load_drops_empty_zones_and_save_restores_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"Empty": {{}}, "Zone": {{"1000": -18000}}}}"#).unwrap();
        let table = TransitionTable::load(file.path()).unwrap();
        assert!(!table.contains_zone("Empty"));
        assert_eq!(table.lookup("Zone", 1000).offset_seconds, -18000);

        let out = tempfile::NamedTempFile::new().unwrap();
        table.save(out.path()).unwrap();
        assert_eq!(TransitionTable::load(out.path()).unwrap(), table);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = TransitionTable::load("/nonexistent/tz_data.json").unwrap_err();
        assert!(matches!(err, SyncError::TableIo(_)));
    }
}
