use crate::common::constants::{DEFAULT_CALENDAR_NAME, DEFAULT_TIMEZONE, PRODID, UID_DOMAIN};
use crate::common::types::{stable_id, NormalizedEvent};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

const FOLD_OCTETS: usize = 75;

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub calendar_name: String,
    pub timezone: String,
    pub generated_at: DateTime<Utc>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            calendar_name: DEFAULT_CALENDAR_NAME.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            generated_at: Utc::now(),
        }
    }
}

/// Write one VEVENT per event, in the given order. Pending events are skipped.
pub fn encode(events: &[NormalizedEvent], options: &EncodeOptions) -> String {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", PRODID),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        format!("X-WR-CALNAME:{}", escape_text(&options.calendar_name)),
        format!("X-WR-TIMEZONE:{}", options.timezone),
    ];
    let stamp = utc_stamp(&options.generated_at);

    for event in events {
        let Some(start) = event.start else {
            continue;
        };
        let uid_base = if event.stable_id.is_empty() {
            let local = event
                .source_event_id
                .as_deref()
                .or(event.url.as_deref())
                .unwrap_or(&event.title);
            stable_id(&event.source_id, local, event.start)
        } else {
            event.stable_id.clone()
        };

        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}@{}", uid_base, UID_DOMAIN));
        lines.push(format!("DTSTAMP:{}", stamp));

        if event.all_day {
            let first = start.date_naive();
            let last_exclusive = all_day_end(first, event.end.map(|e| (e.date_naive(), e.time().num_seconds_from_midnight() == 0)));
            lines.push(format!("DTSTART;VALUE=DATE:{}", first.format("%Y%m%d")));
            lines.push(format!("DTEND;VALUE=DATE:{}", last_exclusive.format("%Y%m%d")));
        } else {
            let end = match event.end {
                Some(end) if end > start => end,
                _ => start + Duration::hours(1),
            };
            lines.push(format!("DTSTART:{}", utc_stamp(&start.with_timezone(&Utc))));
            lines.push(format!("DTEND:{}", utc_stamp(&end.with_timezone(&Utc))));
        }

        lines.push(format!("SUMMARY:{}", escape_text(&event.title)));
        if !event.location.trim().is_empty() {
            lines.push(format!("LOCATION:{}", escape_text(&event.location)));
        }
        if let Some(url) = event.url.as_deref().filter(|u| !u.trim().is_empty()) {
            lines.push(format!("URL:{}", url.trim()));
        }
        if let Some(desc) = event.description.as_deref().filter(|d| !d.trim().is_empty()) {
            lines.push(format!("DESCRIPTION:{}", escape_text(desc)));
        }
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold_line(line));
        out.push_str("\r\n");
    }
    out
}

/// Exclusive end date: the day after the last covered date, never before start + 1.
fn all_day_end(first: NaiveDate, end: Option<(NaiveDate, bool)>) -> NaiveDate {
    let floor = first + Duration::days(1);
    let candidate = match end {
        // Midnight ends are already exclusive
        Some((date, true)) => date,
        Some((date, false)) => date + Duration::days(1),
        None => floor,
    };
    candidate.max(floor)
}

fn utc_stamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

pub(crate) fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Fold at 75 octets without splitting a UTF-8 sequence.
pub(crate) fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_OCTETS {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / FOLD_OCTETS * 3);
    let mut budget = FOLD_OCTETS;
    let mut used = 0;
    for c in line.chars() {
        let width = c.len_utf8();
        if used + width > budget {
            out.push_str("\r\n ");
            // Continuation lines carry the leading space
            budget = FOLD_OCTETS - 1;
            used = 0;
        }
        out.push(c);
        used += width;
    }
    out
}
