use super::{read_json_or_default, write_json_atomic};
use crate::common::error::Result;
use crate::common::time::{in_zone, local_midnight};
use crate::common::types::NormalizedEvent;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    #[serde(flatten)]
    pub event: NormalizedEvent,
    pub last_seen: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Every upserted event.
    pub merged: usize,
    /// The subset that was not in the store before.
    pub inserted: usize,
}

/// Every event ever seen and not yet expired, keyed by stable id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    entries: BTreeMap<String, StoredEvent>,
}

impl StateStore {
    pub fn load(path: &Path) -> Result<Self> {
        let store: Self = read_json_or_default(path)?;
        info!("📂 Loaded {} stored events from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        debug!(path = %path.display(), events = self.len(), "Saved state");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, stable_id: &str) -> Option<&StoredEvent> {
        self.entries.get(stable_id)
    }

    /// Upsert this run's events. Entries absent from the run are left alone.
    pub fn merge(&mut self, events: Vec<NormalizedEvent>, now: DateTime<FixedOffset>) -> MergeStats {
        let mut stats = MergeStats::default();
        for event in events {
            if event.is_pending() || event.stable_id.is_empty() {
                continue;
            }
            let previous = self.entries.insert(
                event.stable_id.clone(),
                StoredEvent {
                    event,
                    last_seen: now,
                },
            );
            stats.merged += 1;
            if previous.is_none() {
                stats.inserted += 1;
            }
        }
        stats
    }

    /// Drop entries that ended strictly before the start of today in `zone`.
    /// The only way an entry ever leaves the store.
    pub fn purge(&mut self, now: DateTime<FixedOffset>, zone: Tz) -> usize {
        let today = in_zone(&now, zone).date_naive();
        let Some(cutoff) = local_midnight(today, zone) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, stored| match stored.event.end.or(stored.event.start) {
            Some(end) => end >= cutoff,
            None => true,
        });
        before - self.entries.len()
    }

    /// Canonical output order: start ascending, title on ties.
    pub fn to_sorted_list(&self) -> Vec<NormalizedEvent> {
        let mut events: Vec<NormalizedEvent> = self.entries.values().map(|s| s.event.clone()).collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.title.cmp(&b.title)));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Chicago;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        Chicago.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().fixed_offset()
    }

    fn event(title: &str, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> NormalizedEvent {
        let mut ev = NormalizedEvent {
            source_id: "test".to_string(),
            title: title.to_string(),
            start: Some(start),
            end: Some(end),
            end_explicit: true,
            all_day: false,
            location: String::new(),
            url: None,
            description: None,
            source_event_id: None,
            stable_id: String::new(),
        };
        ev.refresh_stable_id();
        ev
    }

    #[test]
    fn test_purge_keeps_today_and_later() {
        let mut store = StateStore::default();
        store.merge(
            vec![
                event("Old", at(2024, 12, 31, 22), at(2025, 1, 1, 0)),
                event("Tonight", at(2025, 1, 2, 20), at(2025, 1, 2, 23)),
            ],
            at(2025, 1, 2, 6),
        );
        let purged = store.purge(at(2025, 1, 2, 6), Chicago);
        assert_eq!(purged, 1);
        let titles: Vec<_> = store.to_sorted_list().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Tonight"]);
    }

    #[test]
    fn test_merge_never_removes_absent_entries() {
        let mut store = StateStore::default();
        let a = event("A", at(2025, 7, 1, 9), at(2025, 7, 1, 10));
        let b = event("B", at(2025, 7, 2, 9), at(2025, 7, 2, 10));
        store.merge(vec![a.clone(), b], at(2025, 6, 1, 0));

        let stats = store.merge(vec![a.clone()], at(2025, 6, 2, 0));
        assert_eq!(stats, MergeStats { merged: 1, inserted: 0 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a.stable_id).unwrap().last_seen, at(2025, 6, 2, 0));
    }

    #[test]
    fn test_sorted_by_start_then_title() {
        let mut store = StateStore::default();
        store.merge(
            vec![
                event("Zumba", at(2025, 7, 1, 9), at(2025, 7, 1, 10)),
                event("Art Walk", at(2025, 7, 1, 9), at(2025, 7, 1, 10)),
                event("Auction", at(2025, 6, 30, 9), at(2025, 6, 30, 10)),
            ],
            at(2025, 6, 1, 0),
        );
        let titles: Vec<_> = store.to_sorted_list().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["Auction", "Art Walk", "Zumba"]);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("events.json");
        let mut store = StateStore::default();
        store.merge(vec![event("Regatta", at(2025, 8, 9, 10), at(2025, 8, 9, 16))], at(2025, 8, 1, 0));
        store.save(&path).unwrap();

        let loaded = StateStore::load(&path).unwrap();
        assert_eq!(loaded, store);
    }
}
