use super::{parse_duration, settle_end, DecodedEvent};
use crate::common::text::clean_opt;
use crate::common::time::{in_zone, local_midnight, localize};
use crate::config::parse_zone;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use icalendar::{Calendar, CalendarComponent, CalendarDateTime, Component, DatePerhapsTime, Event, EventLike};
use tracing::debug;

/// Full-grammar parse. Any parser error yields an empty list.
pub fn decode_strict(text: &str, default_zone: Tz) -> Vec<DecodedEvent> {
    let calendar = match text.parse::<Calendar>() {
        Ok(cal) => cal,
        Err(e) => {
            debug!(error = %e, "Strict calendar parse failed");
            return Vec::new();
        }
    };

    calendar
        .iter()
        .filter_map(|component| match component {
            CalendarComponent::Event(event) => convert_event(event, default_zone),
            _ => None,
        })
        .collect()
}

fn convert_event(event: &Event, zone: Tz) -> Option<DecodedEvent> {
    let (start, all_day) = resolve(event.get_start()?, zone)?;
    let explicit_end = event
        .get_end()
        .and_then(|end| resolve(end, zone))
        .map(|(end, _)| end)
        .or_else(|| {
            event
                .property_value("DURATION")
                .and_then(parse_duration)
                .map(|d| start + d)
        });
    let (end, end_explicit) = settle_end(start, explicit_end, all_day);

    // TEXT values arrive unescaped from the parser.
    let text = |value: Option<&str>| clean_opt(value);

    Some(DecodedEvent {
        uid: text(event.get_uid()),
        title: text(event.get_summary()).unwrap_or_default(),
        description: event
            .get_description()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        location: text(event.get_location()),
        url: text(event.property_value("URL")),
        start,
        end,
        all_day,
        end_explicit,
    })
}

fn resolve(value: DatePerhapsTime, zone: Tz) -> Option<(DateTime<FixedOffset>, bool)> {
    match value {
        DatePerhapsTime::Date(date) => local_midnight(date, zone).map(|dt| (dt, true)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some((in_zone(&dt, zone), false)),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            localize(naive, zone).map(|dt| (dt, false))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz = parse_zone(&tzid)?;
            localize(date_time, tz).map(|dt| (dt, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};
    use chrono_tz::America::Chicago;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Town of Minocqua//EN\r\n\
BEGIN:VEVENT\r\n\
UID:evt-1@minocqua.org\r\n\
DTSTAMP:20250601T120000Z\r\n\
DTSTART;TZID=America/Chicago:20250704T090000\r\n\
DTEND;TZID=America/Chicago:20250704T130000\r\n\
SUMMARY:Farmers Market\r\n\
LOCATION:Minocqua\r\n\
URL:https://minocqua.org/events/market\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:evt-2@minocqua.org\r\n\
DTSTAMP:20250601T120000Z\r\n\
DTSTART;VALUE=DATE:20250824\r\n\
SUMMARY:Fair\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_strict_decode() {
        let events = decode_strict(FEED, Chicago);
        assert_eq!(events.len(), 2);

        let market = &events[0];
        assert_eq!(market.title, "Farmers Market");
        assert_eq!(market.start.hour(), 9);
        assert_eq!(market.end - market.start, Duration::hours(4));
        assert_eq!(market.url.as_deref(), Some("https://minocqua.org/events/market"));
        assert!(market.end_explicit);

        let fair = &events[1];
        assert!(fair.all_day);
        assert_eq!(fair.end - fair.start, Duration::days(1));
        assert!(!fair.end_explicit);
    }

    #[test]
    fn test_strict_text_is_unescaped_once() {
        let feed = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n\
BEGIN:VEVENT\r\nUID:acdc-1\r\nDTSTAMP:20250601T120000Z\r\nDTSTART:20250704T230000Z\r\n\
SUMMARY:AC\\\\DC Tribute\\, Live\r\nLOCATION:Legion Hall\\; Back Lot\r\n\
END:VEVENT\r\nEND:VCALENDAR\r\n";
        let events = decode_strict(feed, Chicago);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, r"AC\DC Tribute, Live");
        assert_eq!(events[0].location.as_deref(), Some("Legion Hall; Back Lot"));
    }
}
