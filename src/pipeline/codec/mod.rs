//! Calendar feed codec.
//!
//! Decoding never fails: a strict full-grammar parse is tried first and the
//! line-oriented lenient reader takes over when it yields nothing. Encoding
//! writes folded, escaped feed text for the merged event list.

mod encode;
mod lenient;
mod strict;

pub use encode::{encode, EncodeOptions};
pub use lenient::decode_lenient;
pub use strict::decode_strict;

use chrono::{DateTime, Duration, FixedOffset};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// One event block read from a feed, start/end already resolved to instants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub uid: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub all_day: bool,
    /// False when `end` was synthesized.
    pub end_explicit: bool,
}

/// Decode feed text. Floating times are read in `default_zone`.
pub fn decode(text: &str, default_zone: Tz) -> Vec<DecodedEvent> {
    let strict = decode_strict(text, default_zone);
    if !strict.is_empty() {
        return strict;
    }
    let lenient = decode_lenient(text, default_zone);
    debug!(events = lenient.len(), "Strict calendar parse empty, used lenient reader");
    lenient
}

/// Fill a missing end and clamp an end that does not follow start. The flag is
/// true only when the feed's own end survives.
pub(crate) fn settle_end(
    start: DateTime<FixedOffset>,
    end: Option<DateTime<FixedOffset>>,
    all_day: bool,
) -> (DateTime<FixedOffset>, bool) {
    let floor = if all_day {
        start + Duration::days(1)
    } else {
        start + Duration::hours(1)
    };
    match end {
        None => (floor, false),
        Some(end) if end <= start => (floor, false),
        Some(end) => (end, true),
    }
}

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-])?P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("valid duration regex")
});

/// RFC 5545 DURATION value (`P1D`, `PT1H30M`, `P2W`).
pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let caps = DURATION_RE.captures(value.trim())?;
    let part = |i: usize| -> i64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0)
    };
    let total = Duration::weeks(part(2))
        + Duration::days(part(3))
        + Duration::hours(part(4))
        + Duration::minutes(part(5))
        + Duration::seconds(part(6));
    if total == Duration::zero() {
        return None;
    }
    match caps.get(1).map(|m| m.as_str()) {
        Some("-") => Some(-total),
        _ => Some(total),
    }
}

/// Undo feed text escaping (`\,` `\;` `\n` `\\`).
pub(crate) fn unescape_text(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 7, 4, h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_settle_end() {
        assert_eq!(settle_end(at(9), None, false), (at(10), false));
        assert_eq!(settle_end(at(9), Some(at(8)), false), (at(10), false));
        assert_eq!(settle_end(at(9), Some(at(12)), false), (at(12), true));
        let (end, explicit) = settle_end(at(0), None, true);
        assert_eq!(end - at(0), Duration::days(1));
        assert!(!explicit);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("P1D"), Some(Duration::days(1)));
        assert_eq!(parse_duration("P2W"), Some(Duration::weeks(2)));
        assert_eq!(parse_duration("-PT15M"), Some(Duration::minutes(-15)));
        assert_eq!(parse_duration("P"), None);
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text(r"Bring chairs\, snacks\; fun\nmore"), "Bring chairs, snacks; fun\nmore");
        assert_eq!(unescape_text(r"C:\\temp"), r"C:\temp");
        assert_eq!(unescape_text("plain"), "plain");
    }

    #[test]
    fn test_decode_falls_back_when_strict_rejects() {
        let feed = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Vilas//EN\r\n\
BEGIN:VEVENT\r\nUID:derby-1\r\n;;garbage\r\nDTSTART:20250720T130000Z\r\n\
SUMMARY:Ice Derby\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let zone = chrono_tz::America::Chicago;
        assert!(decode_strict(feed, zone).is_empty());

        let events = decode(feed, zone);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Ice Derby");
        assert_eq!(events[0].uid.as_deref(), Some("derby-1"));
        assert_eq!(events[0].end - events[0].start, Duration::hours(1));
    }

    #[test]
    fn test_decode_garbage_is_empty() {
        assert!(decode("this is not a calendar", chrono_tz::America::Chicago).is_empty());
        assert!(decode("", chrono_tz::America::Chicago).is_empty());
    }
}
