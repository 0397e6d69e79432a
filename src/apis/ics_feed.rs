use super::SourceOutcome;
use crate::common::types::{RawCandidate, RawDateTime};
use crate::config::ResolvedSource;
use crate::pipeline::codec::{decode, DecodedEvent};
use crate::pipeline::ingestion::fetcher::Fetcher;
use chrono::SecondsFormat;
use chrono_tz::Tz;

/// Fetch and decode a known feed URL (`feed`, falling back to `url`).
pub async fn collect(source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
    let id = &source.config.source_id;
    let url = source.config.feed.as_deref().unwrap_or(&source.config.url);
    let mut outcome = SourceOutcome::default();
    match fetcher.fetch_text(url).await {
        Ok(text) => {
            outcome.candidates = candidates_from_feed(&text, id, source.zone);
            outcome.note(id, format!("parsed {} from {}", outcome.candidates.len(), url));
        }
        Err(e) => outcome.failure(id, format!("failed {} -> {}", url, e)),
    }
    outcome
}

pub fn candidates_from_feed(text: &str, source_id: &str, zone: Tz) -> Vec<RawCandidate> {
    decode(text, zone)
        .into_iter()
        .map(|ev| to_candidate(ev, source_id))
        .collect()
}

/// All-day events become date-only hints (end exclusive). Synthesized ends are
/// dropped so the source's own default duration applies.
pub fn to_candidate(event: DecodedEvent, source_id: &str) -> RawCandidate {
    let stamp = |dt: chrono::DateTime<chrono::FixedOffset>| {
        if event.all_day {
            dt.date_naive().format("%Y-%m-%d").to_string()
        } else {
            dt.to_rfc3339_opts(SecondsFormat::Secs, false)
        }
    };
    RawCandidate {
        source_id: source_id.to_string(),
        title: event.title.clone(),
        url: event.url.clone(),
        source_event_id: event.uid.clone(),
        raw_start: Some(RawDateTime::iso(stamp(event.start))),
        raw_end: event.end_explicit.then(|| RawDateTime::iso(stamp(event.end))),
        raw_location: event.location.clone().unwrap_or_default(),
        raw_description: event.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Chicago;

    const FEED: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Vilas County//EN\r\n\
BEGIN:VEVENT\r\nUID:vc-1\r\nDTSTAMP:20250601T000000Z\r\nDTSTART:20250704T220000Z\r\nSUMMARY:Fireworks\r\nLOCATION:Eagle River\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:vc-2\r\nDTSTAMP:20250601T000000Z\r\nDTSTART;VALUE=DATE:20250824\r\nDTEND;VALUE=DATE:20250827\r\nSUMMARY:County Fair\r\nEND:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_candidates_from_feed() {
        let candidates = candidates_from_feed(FEED, "vilas", Chicago);
        assert_eq!(candidates.len(), 2);

        let fireworks = &candidates[0];
        assert_eq!(fireworks.source_event_id.as_deref(), Some("vc-1"));
        assert_eq!(
            fireworks.raw_start,
            Some(RawDateTime::iso("2025-07-04T17:00:00-05:00"))
        );
        assert_eq!(fireworks.raw_end, None);
        assert_eq!(fireworks.raw_location, "Eagle River");

        let fair = &candidates[1];
        assert_eq!(fair.raw_start, Some(RawDateTime::iso("2025-08-24")));
        assert_eq!(fair.raw_end, Some(RawDateTime::iso("2025-08-27")));
    }
}
