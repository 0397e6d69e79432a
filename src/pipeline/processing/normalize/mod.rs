pub mod dates;

use crate::common::error::NormalizationFailure;
use crate::common::text::{clean_opt, clean_text, decode_entities, strip_html};
use crate::common::time::{in_zone, localize};
use crate::common::types::{NormalizedEvent, RawCandidate, RawDateTime};
use crate::config::ResolvedSource;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use dates::{parse_free_text, ParseContext};
use tracing::debug;

/// A start (and possibly end) resolved to instants in the source zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimes {
    pub start: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
    pub all_day: bool,
}

/// Everything normalization needs besides the candidate itself.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub source: &'a ResolvedSource,
    pub now: DateTime<FixedOffset>,
    /// Source is on the enrichment allow-list.
    pub enrich_allowed: bool,
}

impl<'a> NormalizeContext<'a> {
    fn zone(&self) -> Tz {
        self.source.zone
    }

    fn parse_context(&self) -> ParseContext {
        ParseContext {
            today: in_zone(&self.now, self.zone()).date_naive(),
        }
    }
}

/// Turn a candidate into a canonical event. Candidates that enrichment could
/// still rescue come back with an empty title or no start.
pub fn normalize_candidate(
    candidate: RawCandidate,
    ctx: &NormalizeContext<'_>,
) -> Result<NormalizedEvent, NormalizationFailure> {
    if !candidate.is_eligible() {
        return Err(NormalizationFailure::Empty);
    }

    let title = clean_text(&decode_entities(&candidate.title));
    let url = clean_opt(candidate.url.as_deref());
    let rescuable = ctx.enrich_allowed && url.is_some();

    let start_input = candidate.raw_start.as_ref().filter(|r| !r.is_empty());
    let resolved = start_input.and_then(|raw| resolve_times(raw, ctx.zone(), &ctx.parse_context()));

    let resolved = match (resolved, start_input) {
        (Some(times), _) => Some(times),
        (None, _) if rescuable => None,
        (None, Some(raw)) => {
            debug!(source_id = %candidate.source_id, raw = ?raw, "Unparseable start");
            return Err(NormalizationFailure::UnparseableDate);
        }
        (None, None) => return Err(NormalizationFailure::MissingStart),
    };

    if title.is_empty() && !rescuable {
        return Err(NormalizationFailure::EmptyTitle);
    }

    let mut event = NormalizedEvent {
        source_id: candidate.source_id,
        title,
        start: None,
        end: None,
        end_explicit: false,
        all_day: false,
        location: clean_text(&decode_entities(&candidate.raw_location)),
        url,
        description: candidate
            .raw_description
            .as_deref()
            .map(strip_html)
            .filter(|d| !d.is_empty()),
        source_event_id: clean_opt(candidate.source_event_id.as_deref()),
        stable_id: String::new(),
    };

    if let Some(times) = resolved {
        let explicit_end = candidate
            .raw_end
            .as_ref()
            .filter(|r| !r.is_empty())
            .and_then(|raw| resolve_end(raw, ctx.zone(), &ctx.parse_context()))
            .or(times.end);
        apply_times(&mut event, times.start, explicit_end, times.all_day, ctx.source.default_duration);
    }
    event.refresh_stable_id();
    Ok(event)
}

/// Set start/end, then fill or clamp the end.
pub fn apply_times(
    event: &mut NormalizedEvent,
    start: DateTime<FixedOffset>,
    end: Option<DateTime<FixedOffset>>,
    all_day: bool,
    default_duration: Duration,
) {
    event.start = Some(start);
    event.all_day = all_day;
    event.end_explicit = end.is_some();
    event.end = end;
    event.ensure_end(default_duration);
}

/// ISO hint first, free text second.
pub fn resolve_times(raw: &RawDateTime, zone: Tz, ctx: &ParseContext) -> Option<ResolvedTimes> {
    if let Some(iso) = raw.iso.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Some((start, all_day)) = parse_iso(iso, zone) {
            return Some(ResolvedTimes {
                start,
                end: None,
                all_day,
            });
        }
    }
    let text = raw.text.as_deref().filter(|s| !s.trim().is_empty())?;
    let range = parse_free_text(text, ctx)?;
    Some(ResolvedTimes {
        start: localize(range.start, zone)?,
        end: range.end.and_then(|end| localize(end, zone)),
        all_day: range.all_day,
    })
}

/// An explicit end. Date-only ISO values are already exclusive; a date-only
/// free-text end names the last day, so it is pushed one day forward.
pub fn resolve_end(raw: &RawDateTime, zone: Tz, ctx: &ParseContext) -> Option<DateTime<FixedOffset>> {
    if let Some(iso) = raw.iso.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Some((end, _)) = parse_iso(iso, zone) {
            return Some(end);
        }
    }
    let text = raw.text.as_deref().filter(|s| !s.trim().is_empty())?;
    let range = parse_free_text(text, ctx)?;
    if range.all_day {
        return match range.end {
            Some(end) => localize(end, zone),
            None => localize(range.start + Duration::days(1), zone),
        };
    }
    localize(range.start, zone)
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"];

/// Machine-readable hint: RFC 3339, naive local times, or a bare date (all-day).
pub fn parse_iso(value: &str, zone: Tz) -> Option<(DateTime<FixedOffset>, bool)> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some((in_zone(&dt, zone), false));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some((in_zone(&dt, zone), false));
        }
    }
    if let Some(utc) = value.strip_suffix('Z') {
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(utc, fmt) {
                return Some((crate::common::time::utc_in_zone(naive, zone), false));
            }
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return localize(naive, zone).map(|dt| (dt, false));
        }
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .ok()?;
    localize(date.and_time(NaiveTime::MIN), zone).map(|dt| (dt, true))
}
