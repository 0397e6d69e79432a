use crate::common::constants::RICH_DESCRIPTION_CHARS;
use crate::common::text::{normalize_place, normalize_title};
use crate::common::types::NormalizedEvent;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Identity of a real-world event across sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub title: String,
    pub date: NaiveDate,
    pub place: String,
}

impl DedupKey {
    /// The date is the start's calendar day in its own (source) offset, not UTC.
    /// Pending events have no key until enrichment gives them a start.
    pub fn of(event: &NormalizedEvent) -> Option<Self> {
        Some(Self {
            title: normalize_title(&event.title),
            date: event.start?.date_naive(),
            place: normalize_place(&event.location),
        })
    }
}

/// +1 url, +1 explicit end, +1 substantial description.
pub fn completeness_score(event: &NormalizedEvent) -> u8 {
    let mut score = 0;
    if event.url.as_deref().map_or(false, |u| !u.trim().is_empty()) {
        score += 1;
    }
    if event.end_explicit {
        score += 1;
    }
    if event
        .description
        .as_deref()
        .map_or(false, |d| d.chars().count() > RICH_DESCRIPTION_CHARS)
    {
        score += 1;
    }
    score
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Survivors in first-seen key order.
    pub events: Vec<NormalizedEvent>,
    /// Every key collision, whichever side won.
    pub collisions: usize,
    pub replaced: usize,
}

/// Collapse events sharing a key. A strictly higher score replaces the
/// incumbent; ties keep whichever was seen first. Pending events pass through
/// untouched.
pub fn deduplicate(events: Vec<NormalizedEvent>) -> DedupOutcome {
    let mut index: HashMap<DedupKey, usize> = HashMap::new();
    let mut outcome = DedupOutcome::default();

    for event in events {
        let Some(key) = DedupKey::of(&event) else {
            outcome.events.push(event);
            continue;
        };
        match index.get(&key) {
            Some(&slot) => {
                outcome.collisions += 1;
                if completeness_score(&event) > completeness_score(&outcome.events[slot]) {
                    outcome.events[slot] = event;
                    outcome.replaced += 1;
                }
            }
            None => {
                index.insert(key, outcome.events.len());
                outcome.events.push(event);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, TimeZone};

    fn central(d: u32, h: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 7, d, h, 0, 0)
            .unwrap()
    }

    fn event(title: &str, location: &str, start: DateTime<FixedOffset>, url: Option<&str>) -> NormalizedEvent {
        let mut ev = NormalizedEvent {
            source_id: "test".to_string(),
            title: title.to_string(),
            start: Some(start),
            end: None,
            end_explicit: false,
            all_day: false,
            location: location.to_string(),
            url: url.map(str::to_string),
            description: None,
            source_event_id: None,
            stable_id: String::new(),
        };
        ev.refresh_stable_id();
        ev
    }

    #[test]
    fn test_higher_score_wins_in_both_orders() {
        let plain = event("Farmers Market", "Minocqua", central(4, 9), None);
        let linked = event("farmers   market!!", "Minocqua", central(4, 9), Some("https://x"));

        for input in [vec![plain.clone(), linked.clone()], vec![linked.clone(), plain.clone()]] {
            let out = deduplicate(input);
            assert_eq!(out.events.len(), 1);
            assert_eq!(out.events[0].url.as_deref(), Some("https://x"));
            assert_eq!(out.collisions, 1);
        }
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let a = event("Fish Fry", "Eagle River", central(4, 17), Some("https://a"));
        let b = event("FISH FRY", "eagle  river", central(4, 18), Some("https://b"));

        let out = deduplicate(vec![a.clone(), b.clone()]);
        assert_eq!(out.events, vec![a.clone()]);
        let out = deduplicate(vec![b.clone(), a]);
        assert_eq!(out.events, vec![b]);
        assert_eq!(out.replaced, 0);
    }

    #[test]
    fn test_local_date_not_utc_date() {
        // 20:00 at -05:00 is the next day in UTC; still the same local day as 09:00
        let morning = event("Concert", "Park", central(4, 9), None);
        let evening = event("Concert", "Park", central(4, 20), None);
        assert!(DedupKey::of(&morning).is_some());
        assert_eq!(DedupKey::of(&morning), DedupKey::of(&evening));
        assert_eq!(deduplicate(vec![morning, evening]).events.len(), 1);
    }

    #[test]
    fn test_distinct_keys_survive_and_collisions_count() {
        let events = vec![
            event("Parade", "Rhinelander", central(4, 10), None),
            event("Parade", "Rhinelander", central(4, 10), None),
            event("Parade", "Rhinelander", central(4, 10), Some("https://p")),
            event("Parade", "Tomahawk", central(4, 10), None),
            event("Parade", "Rhinelander", central(5, 10), None),
        ];
        let out = deduplicate(events);
        assert_eq!(out.events.len(), 3);
        assert_eq!(out.collisions, 2);
        assert_eq!(out.replaced, 1);
    }

    fn pending(title: &str, url: &str) -> NormalizedEvent {
        let mut ev = event(title, "", central(4, 17), Some(url));
        ev.start = None;
        ev.source_event_id = Some(url.to_string());
        ev.refresh_stable_id();
        ev
    }

    #[test]
    fn test_pending_events_are_never_merged() {
        let fish_fries = vec![
            pending("Fish Fry", "https://eagleriver.org/events/fish-fry-july-4/"),
            pending("Fish Fry", "https://eagleriver.org/events/fish-fry-july-11/"),
            pending("", "https://eagleriver.org/events/untitled-1/"),
            pending("", "https://eagleriver.org/events/untitled-2/"),
        ];
        assert_eq!(DedupKey::of(&fish_fries[0]), None);

        let out = deduplicate(fish_fries.clone());
        assert_eq!(out.events, fish_fries);
        assert_eq!(out.collisions, 0);
    }

    #[test]
    fn test_pending_events_keep_their_place_among_dated_ones() {
        let dated = event("Fish Fry", "", central(4, 17), None);
        let waiting = pending("Fish Fry", "https://eagleriver.org/events/fish-fry-july-11/");
        let out = deduplicate(vec![dated.clone(), waiting.clone(), dated.clone()]);
        assert_eq!(out.events, vec![dated, waiting]);
        assert_eq!(out.collisions, 1);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let events = vec![
            event("Farmers Market", "Minocqua", central(4, 9), None),
            event("farmers market", "Minocqua", central(4, 9), Some("https://x")),
            event("Regatta", "Lake Tomahawk", central(12, 11), None),
        ];
        let once = deduplicate(events).events;
        let twice = deduplicate(once.clone());
        assert_eq!(twice.events, once);
        assert_eq!(twice.collisions, 0);
    }

    #[test]
    fn test_score() {
        let mut ev = event("Talk", "", central(4, 9), Some("https://t"));
        assert_eq!(completeness_score(&ev), 1);
        ev.end_explicit = true;
        ev.description = Some("x".repeat(81));
        assert_eq!(completeness_score(&ev), 3);
        ev.description = Some("x".repeat(80));
        assert_eq!(completeness_score(&ev), 2);
    }
}
