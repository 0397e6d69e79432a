use super::{parse_duration, settle_end, unescape_text, DecodedEvent};
use crate::common::text::clean_opt;
use crate::common::time::{localize, local_midnight, utc_in_zone};
use crate::config::parse_zone;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use std::collections::HashMap;

/// A content line split into name, parameters and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentLine {
    pub name: String,
    pub params: HashMap<String, String>,
    pub value: String,
}

impl ContentLine {
    fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Line-oriented reader for feeds the strict grammar rejects. Repeated
/// properties keep their last occurrence; unresolvable dates drop the event.
pub fn decode_lenient(text: &str, default_zone: Tz) -> Vec<DecodedEvent> {
    let lines = unfold(text);
    let mut events = Vec::new();
    let mut current: Option<HashMap<String, ContentLine>> = None;
    // Nested components inside an event (VALARM) are skipped wholesale
    let mut nested_depth = 0usize;

    for line in &lines {
        let upper = line.trim().to_ascii_uppercase();
        if let Some(block) = upper.strip_prefix("BEGIN:") {
            if block == "VEVENT" && current.is_none() {
                current = Some(HashMap::new());
                nested_depth = 0;
            } else if current.is_some() {
                nested_depth += 1;
            }
            continue;
        }
        if let Some(block) = upper.strip_prefix("END:") {
            if current.is_some() {
                if nested_depth > 0 {
                    nested_depth -= 1;
                } else if block == "VEVENT" {
                    if let Some(props) = current.take() {
                        if let Some(event) = build_event(&props, default_zone) {
                            events.push(event);
                        }
                    }
                }
            }
            continue;
        }
        if nested_depth > 0 {
            continue;
        }
        if let Some(props) = current.as_mut() {
            if let Some(parsed) = parse_content_line(line) {
                props.insert(parsed.name.clone(), parsed);
            }
        }
    }
    events
}

/// Normalize line endings and join continuation lines.
pub(crate) fn unfold(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out: Vec<String> = Vec::new();
    for raw in normalized.split('\n') {
        if let Some(rest) = raw.strip_prefix(' ').or_else(|| raw.strip_prefix('\t')) {
            if let Some(last) = out.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !raw.trim().is_empty() {
            out.push(raw.to_string());
        }
    }
    out
}

/// Split on the first colon outside quotes and escapes, then the name part on semicolons.
pub(crate) fn parse_content_line(line: &str) -> Option<ContentLine> {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut split_at = None;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                split_at = Some(i);
                break;
            }
            _ => {}
        }
    }
    let idx = split_at?;
    let (head, value) = (&line[..idx], &line[idx + 1..]);

    let mut parts = split_unquoted(head, ';').into_iter();
    let name = parts.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }
    let params = parts
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            Some((
                k.trim().to_ascii_uppercase(),
                v.trim().trim_matches('"').to_string(),
            ))
        })
        .collect();

    Some(ContentLine {
        name,
        params,
        value: value.to_string(),
    })
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            out.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    out.push(&s[start..]);
    out
}

fn build_event(props: &HashMap<String, ContentLine>, zone: Tz) -> Option<DecodedEvent> {
    let (start, all_day) = props.get("DTSTART").and_then(|l| parse_date_value(l, zone))?;

    let explicit_end = props
        .get("DTEND")
        .and_then(|l| parse_date_value(l, zone))
        .map(|(end, _)| end)
        .or_else(|| {
            props
                .get("DURATION")
                .and_then(|l| parse_duration(&l.value))
                .map(|d| start + d)
        });
    let (end, end_explicit) = settle_end(start, explicit_end, all_day);

    let text = |key: &str| {
        props
            .get(key)
            .and_then(|l| clean_opt(Some(&unescape_text(&l.value))))
    };

    Some(DecodedEvent {
        uid: text("UID"),
        title: text("SUMMARY").unwrap_or_default(),
        description: props
            .get("DESCRIPTION")
            .map(|l| unescape_text(&l.value).trim().to_string())
            .filter(|d| !d.is_empty()),
        location: text("LOCATION"),
        url: text("URL"),
        start,
        end,
        all_day,
        end_explicit,
    })
}

/// Resolve a DTSTART/DTEND value. Unknown zones and malformed values yield None.
pub(crate) fn parse_date_value(line: &ContentLine, default_zone: Tz) -> Option<(DateTime<FixedOffset>, bool)> {
    let value = line.value.trim();
    let date_only = line
        .param("VALUE")
        .map_or(false, |v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()));

    if date_only {
        let date = NaiveDate::parse_from_str(value.get(..8)?, "%Y%m%d").ok()?;
        return local_midnight(date, default_zone).map(|dt| (dt, true));
    }

    if let Some(utc) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        let naive = parse_naive(utc)?;
        return Some((utc_in_zone(naive, default_zone), false));
    }

    let naive = parse_naive(value)?;
    let zone = match line.param("TZID") {
        Some(tzid) => parse_zone(tzid)?,
        None => default_zone,
    };
    localize(naive, zone).map(|dt| (dt, false))
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Timelike, Utc};
    use chrono_tz::America::Chicago;

    #[test]
    fn test_unfold_joins_continuations() {
        let text = "SUMMARY:Lake\r\n  Day\r\nDESCRIPTION:a\n\tb\rURL:x";
        assert_eq!(unfold(text), vec!["SUMMARY:Lake Day", "DESCRIPTION:ab", "URL:x"]);
    }

    #[test]
    fn test_parse_content_line_params_and_colons() {
        let line = parse_content_line(r#"DTSTART;TZID="America/Chicago";X-A=b:20250704T090000"#).unwrap();
        assert_eq!(line.name, "DTSTART");
        assert_eq!(line.param("TZID"), Some("America/Chicago"));
        assert_eq!(line.value, "20250704T090000");

        let url = parse_content_line("url:https://example.org/e?a=1").unwrap();
        assert_eq!(url.name, "URL");
        assert_eq!(url.value, "https://example.org/e?a=1");

        assert!(parse_content_line("no colon here").is_none());
    }

    #[test]
    fn test_lenient_decode_basic_feed() {
        let feed = "BEGIN:VCALENDAR\n\
BEGIN:VEVENT\n\
UID:abc-1\n\
SUMMARY:Fish Fry\\, Friday\n\
DTSTART;TZID=America/Chicago:20250704T170000\n\
DTEND;TZID=America/Chicago:20250704T200000\n\
LOCATION:Eagle River\n\
BEGIN:VALARM\n\
DESCRIPTION:reminder text\n\
END:VALARM\n\
END:VEVENT\n\
END:VCALENDAR\n";
        let events = decode_lenient(feed, Chicago);
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.title, "Fish Fry, Friday");
        assert_eq!(ev.uid.as_deref(), Some("abc-1"));
        assert_eq!(ev.location.as_deref(), Some("Eagle River"));
        assert_eq!(ev.description, None);
        assert_eq!(ev.start.hour(), 17);
        assert_eq!(ev.end - ev.start, Duration::hours(3));
        assert!(ev.end_explicit);
        assert!(!ev.all_day);
    }

    #[test]
    fn test_lenient_all_day_and_missing_end() {
        let feed = "BEGIN:VEVENT\nSUMMARY:Fair\nDTSTART;VALUE=DATE:20250824\nEND:VEVENT\n\
BEGIN:VEVENT\nSUMMARY:Talk\nDTSTART:20250824T140000Z\nEND:VEVENT\n";
        let events = decode_lenient(feed, Chicago);
        assert_eq!(events.len(), 2);
        assert!(events[0].all_day);
        assert_eq!(events[0].end - events[0].start, Duration::days(1));
        assert!(!events[0].end_explicit);
        assert_eq!(
            events[1].start,
            Utc.with_ymd_and_hms(2025, 8, 24, 14, 0, 0).unwrap()
        );
        assert_eq!(events[1].end - events[1].start, Duration::hours(1));
    }

    #[test]
    fn test_lenient_clamps_backwards_end_and_uses_duration() {
        let feed = "BEGIN:VEVENT\nSUMMARY:Backwards\nDTSTART:20250704T170000\nDTEND:20250704T160000\nEND:VEVENT\n\
BEGIN:VEVENT\nSUMMARY:Timed\nDTSTART:20250704T170000\nDURATION:PT90M\nEND:VEVENT\n";
        let events = decode_lenient(feed, Chicago);
        assert_eq!(events[0].end - events[0].start, Duration::hours(1));
        assert!(!events[0].end_explicit);
        assert_eq!(events[1].end - events[1].start, Duration::minutes(90));
        assert!(events[1].end_explicit);
    }

    #[test]
    fn test_lenient_last_occurrence_wins_and_bad_zone_drops() {
        let feed = "BEGIN:VEVENT\nSUMMARY:First\nSUMMARY:Second\nDTSTART:20250704T170000\nEND:VEVENT\n\
BEGIN:VEVENT\nSUMMARY:Nowhere\nDTSTART;TZID=Mars/Olympus:20250704T170000\nEND:VEVENT\n\
BEGIN:VEVENT\nSUMMARY:No date\nEND:VEVENT\n";
        let events = decode_lenient(feed, Chicago);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Second");
    }
}
