//! Free-text date heuristics.
//!
//! Each rule is a pure function from text to a zone-naive range; rules are tried
//! in order and the first match wins. Zones are attached by the caller.

use crate::common::constants::YEAR_ROLLOVER_THRESHOLD_DAYS;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// A wall-clock range. `end` is only set when the text stated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRange {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub all_day: bool,
}

/// What the heuristics may assume about "now".
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    pub today: NaiveDate,
}

pub type Heuristic = fn(&str, &ParseContext) -> Option<ParsedRange>;

/// Priority order matters: later rules are looser.
pub const HEURISTICS: &[(&str, Heuristic)] = &[
    ("date_time_range", date_with_time_range),
    ("date_time", date_with_time),
    ("month_day_without_year", month_day_without_year),
    ("multi_day_range", multi_day_range),
    ("fuzzy", fuzzy_date),
];

pub fn parse_free_text(text: &str, ctx: &ParseContext) -> Option<ParsedRange> {
    let prepared = prepare(text);
    if prepared.is_empty() {
        return None;
    }
    HEURISTICS.iter().find_map(|(_, rule)| rule(&prepared, ctx))
}

fn prepare(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    NOON_RE
        .replace_all(&MIDNIGHT_RE.replace_all(&collapsed, "12:00 am"), "12:00 pm")
        .into_owned()
}

fn month_group(name: &str) -> String {
    format!(
        r"\b(?P<{name}>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?"
    )
}

fn time_group(suffix: &str) -> String {
    format!(r"(?P<h{suffix}>\d{{1,2}})(?::(?P<m{suffix}>\d{{2}}))?\s*(?P<ap{suffix}>[ap]\.?\s?m\b\.?)?")
}

const DAY: &str = r"(?:st|nd|rd|th)?";
const SEP: &str = r"\s*(?:-|–|—|\bto\b|\buntil\b|\bthru\b|\bthrough\b)\s*";
const LEAD_IN: &str = r"(?:\s*,)?(?:\s+(?:at|@|from))?\s+";

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).expect("valid date heuristic regex")
}

static NOON_RE: Lazy<Regex> = Lazy::new(|| compile(r"\bnoon\b"));
static MIDNIGHT_RE: Lazy<Regex> = Lazy::new(|| compile(r"\bmidnight\b"));
static FOUR_DIGIT_YEAR_RE: Lazy<Regex> = Lazy::new(|| compile(r"\b\d{4}\b"));

static DATE_TIME_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{}\s+(?P<day>\d{{1,2}}){DAY},?\s+(?P<year>\d{{4}}){LEAD_IN}{}{SEP}{}",
        month_group("mon"),
        time_group("a"),
        time_group("b"),
    ))
});

static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{}\s+(?P<day>\d{{1,2}}){DAY},?\s+(?P<year>\d{{4}}){LEAD_IN}{}",
        month_group("mon"),
        time_group("a"),
    ))
});

static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"{}\s+(?P<day>\d{{1,2}}){DAY}\b", month_group("mon"))));

static TRAILING_TIMES_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"^{LEAD_IN}{}(?:{SEP}{})?",
        time_group("a"),
        time_group("b")
    ))
});

static TRAILING_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"^{SEP}(?:{}\s+)?(?P<day2>\d{{1,2}}){DAY}\b",
        month_group("mon2")
    ))
});

static TIME_FOLLOWS_RE: Lazy<Regex> = Lazy::new(|| compile(r"^\s*(?::|[ap]\.?\s?m\b)"));

static MULTI_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{}\s+(?P<day>\d{{1,2}}){DAY}(?:,?\s+(?P<year1>\d{{4}}))?{SEP}(?:{}\s+)?(?P<day2>\d{{1,2}}){DAY},?\s+(?P<year>\d{{4}})\b",
        month_group("mon"),
        month_group("mon2"),
    ))
});

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(?P<year>\d{4})-(?P<mon>\d{1,2})-(?P<day>\d{1,2})(?:[T ](?P<h>\d{1,2}):(?P<m>\d{2}))?")
});

static US_DATE_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(?P<mon>\d{1,2})/(?P<day>\d{1,2})/(?P<year>\d{2,4})\b"));

static NAMED_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"{}\s+(?P<day>\d{{1,2}}){DAY},?\s+(?P<year>\d{{4}})\b",
        month_group("mon")
    ))
});

static DAY_FIRST_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"\b(?P<day>\d{{1,2}}){DAY}\s+(?:of\s+)?{},?\s+(?P<year>\d{{4}})\b",
        month_group("mon")
    ))
});

static ANY_TIME_RE: Lazy<Regex> = Lazy::new(|| compile(&format!(r"\b{}", time_group("a"))));

/// Rule 1: `Jul 4, 2025 5:00 PM - 8:00 PM`.
pub fn date_with_time_range(text: &str, _ctx: &ParseContext) -> Option<ParsedRange> {
    let caps = DATE_TIME_RANGE_RE.captures(text)?;
    let date = named_date(&caps, "mon", "day", "year")?;
    let (start_time, end_time) = time_pair(&caps)?;
    Some(timed_range(date, start_time, end_time))
}

/// Rule 2: `Jul 4, 2025 5:00 PM`, end left to the default duration.
pub fn date_with_time(text: &str, _ctx: &ParseContext) -> Option<ParsedRange> {
    let caps = DATE_TIME_RE.captures(text)?;
    let date = named_date(&caps, "mon", "day", "year")?;
    let time = single_time(&caps, "a")?;
    Some(ParsedRange {
        start: date.and_time(time),
        end: None,
        all_day: false,
    })
}

/// Rule 3: `Aug 9` with no year anywhere in the text. The year comes from
/// `today`, rolled forward when the date lands too far in the past.
pub fn month_day_without_year(text: &str, ctx: &ParseContext) -> Option<ParsedRange> {
    if FOUR_DIGIT_YEAR_RE.is_match(text) {
        return None;
    }
    let caps = MONTH_DAY_RE.captures(text)?;
    let month = month_number(caps.name("mon")?.as_str())?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let date = infer_year(month, day, ctx.today)?;
    let rest = &text[caps.get(0)?.end()..];

    if let Some(times) = TRAILING_TIMES_RE.captures(rest) {
        if times.name("hb").is_some() {
            if let Some((start_time, end_time)) = time_pair(&times) {
                return Some(timed_range(date, start_time, end_time));
            }
        }
        if let Some(time) = single_time(&times, "a") {
            return Some(ParsedRange {
                start: date.and_time(time),
                end: None,
                all_day: false,
            });
        }
    }

    if let Some(range) = TRAILING_DAY_RE.captures(rest) {
        let after = &rest[range.get(0)?.end()..];
        if !TIME_FOLLOWS_RE.is_match(after) {
            let end_month = match range.name("mon2") {
                Some(m) => month_number(m.as_str())?,
                None => month,
            };
            let end_day: u32 = range.name("day2")?.as_str().parse().ok()?;
            let end_year = if end_month < month { date.year() + 1 } else { date.year() };
            let last = NaiveDate::from_ymd_opt(end_year, end_month, end_day)?;
            if last >= date {
                return Some(all_day_range(date, last));
            }
        }
    }

    Some(ParsedRange {
        start: date.and_time(NaiveTime::MIN),
        end: None,
        all_day: true,
    })
}

/// Rule 4: `Aug 24 - Aug 26, 2025` or `Aug 24 - 26, 2025`; end is exclusive.
pub fn multi_day_range(text: &str, _ctx: &ParseContext) -> Option<ParsedRange> {
    let caps = MULTI_DAY_RE.captures(text)?;
    let month = month_number(caps.name("mon")?.as_str())?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let end_month = match caps.name("mon2") {
        Some(m) => month_number(m.as_str())?,
        None => month,
    };
    let end_day: u32 = caps.name("day2")?.as_str().parse().ok()?;
    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    let last = NaiveDate::from_ymd_opt(year, end_month, end_day)?;

    let first = match caps.name("year1") {
        Some(y) => NaiveDate::from_ymd_opt(y.as_str().parse().ok()?, month, day)?,
        None => {
            let same_year = NaiveDate::from_ymd_opt(year, month, day)?;
            if same_year > last {
                NaiveDate::from_ymd_opt(year - 1, month, day)?
            } else {
                same_year
            }
        }
    };
    if last < first {
        return None;
    }
    Some(all_day_range(first, last))
}

/// Rule 5: any recognizable date; a time anywhere after it makes the event timed.
pub fn fuzzy_date(text: &str, _ctx: &ParseContext) -> Option<ParsedRange> {
    if let Some(caps) = ISO_DATE_RE.captures(text) {
        let date = numeric_date(&caps)?;
        if let (Some(h), Some(m)) = (caps.name("h"), caps.name("m")) {
            let time = NaiveTime::from_hms_opt(h.as_str().parse().ok()?, m.as_str().parse().ok()?, 0)?;
            return Some(ParsedRange {
                start: date.and_time(time),
                end: None,
                all_day: false,
            });
        }
        return Some(date_then_time(date, &text[caps.get(0)?.end()..]));
    }

    let found = [&*US_DATE_RE, &*NAMED_DATE_RE, &*DAY_FIRST_DATE_RE]
        .iter()
        .find_map(|re| {
            let caps = re.captures(text)?;
            let date = if re.as_str() == US_DATE_RE.as_str() {
                numeric_date(&caps)?
            } else {
                named_date(&caps, "mon", "day", "year")?
            };
            Some((date, caps.get(0)?.end()))
        })?;
    Some(date_then_time(found.0, &text[found.1..]))
}

fn date_then_time(date: NaiveDate, rest: &str) -> ParsedRange {
    let time = ANY_TIME_RE
        .captures_iter(rest)
        .find_map(|caps| single_time(&caps, "a"));
    match time {
        Some(time) => ParsedRange {
            start: date.and_time(time),
            end: None,
            all_day: false,
        },
        None => ParsedRange {
            start: date.and_time(NaiveTime::MIN),
            end: None,
            all_day: true,
        },
    }
}

fn all_day_range(first: NaiveDate, last: NaiveDate) -> ParsedRange {
    ParsedRange {
        start: first.and_time(NaiveTime::MIN),
        end: Some((last + Duration::days(1)).and_time(NaiveTime::MIN)),
        all_day: true,
    }
}

/// An end before the start means the range runs past midnight.
fn timed_range(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> ParsedRange {
    let start_dt = date.and_time(start);
    let mut end_dt = date.and_time(end);
    if end_dt < start_dt {
        end_dt += Duration::days(1);
    }
    ParsedRange {
        start: start_dt,
        end: Some(end_dt),
        all_day: false,
    }
}

pub(crate) fn infer_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if (today - candidate).num_days() > YEAR_ROLLOVER_THRESHOLD_DAYS {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

pub(crate) fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_ascii_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn named_date(caps: &Captures, mon: &str, day: &str, year: &str) -> Option<NaiveDate> {
    let month = month_number(caps.name(mon)?.as_str())?;
    let day: u32 = caps.name(day)?.as_str().parse().ok()?;
    let year: i32 = caps.name(year)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn numeric_date(caps: &Captures) -> Option<NaiveDate> {
    let month: u32 = caps.name("mon")?.as_str().parse().ok()?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let mut year: i32 = caps.name("year")?.as_str().parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

struct ClockTime {
    hour: u32,
    minute: u32,
    meridiem: Option<Meridiem>,
    has_minutes: bool,
}

fn clock_time(caps: &Captures, suffix: &str) -> Option<ClockTime> {
    let hour: u32 = caps.name(&format!("h{suffix}"))?.as_str().parse().ok()?;
    let minutes = caps.name(&format!("m{suffix}"));
    let minute: u32 = match minutes {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let meridiem = caps.name(&format!("ap{suffix}")).and_then(|m| {
        match m.as_str().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('a') => Some(Meridiem::Am),
            Some('p') => Some(Meridiem::Pm),
            _ => None,
        }
    });
    Some(ClockTime {
        hour,
        minute,
        meridiem,
        has_minutes: minutes.is_some(),
    })
}

fn to_naive(hour: u32, minute: u32, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
    let hour = match meridiem {
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(Meridiem::Am) => hour % 12,
        Some(Meridiem::Pm) => hour % 12 + 12,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// A lone number is not a time; it needs minutes or a meridiem.
fn single_time(caps: &Captures, suffix: &str) -> Option<NaiveTime> {
    let t = clock_time(caps, suffix)?;
    if !t.has_minutes && t.meridiem.is_none() {
        return None;
    }
    to_naive(t.hour, t.minute, t.meridiem)
}

/// Start inherits the end's meridiem when it has none (`5 - 8 pm`), falling back
/// to morning when that would put the start after the end (`11 - 2 pm`).
fn time_pair(caps: &Captures) -> Option<(NaiveTime, NaiveTime)> {
    let start = clock_time(caps, "a")?;
    let end = clock_time(caps, "b")?;
    if !end.has_minutes && end.meridiem.is_none() {
        return None;
    }
    let end_time = to_naive(end.hour, end.minute, end.meridiem)?;

    let start_time = match (start.meridiem, end.meridiem) {
        (Some(m), _) => to_naive(start.hour, start.minute, Some(m))?,
        (None, Some(m)) if (1..=12).contains(&start.hour) => {
            let inherited = to_naive(start.hour, start.minute, Some(m))?;
            if inherited > end_time && m == Meridiem::Pm {
                to_naive(start.hour, start.minute, Some(Meridiem::Am))?
            } else {
                inherited
            }
        }
        (None, _) => to_naive(start.hour, start.minute, None)?,
    };
    Some((start_time, end_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(y: i32, m: u32, d: u32) -> ParseContext {
        ParseContext {
            today: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        }
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn parse(text: &str) -> Option<ParsedRange> {
        parse_free_text(text, &ctx(2025, 6, 1))
    }

    #[test]
    fn test_rule_date_with_time_range() {
        let r = parse("Jul 4, 2025 5:00 PM - 8:00 PM").unwrap();
        assert_eq!(r.start, dt(2025, 7, 4, 17, 0));
        assert_eq!(r.end, Some(dt(2025, 7, 4, 20, 0)));
        assert!(!r.all_day);

        let r = parse("Tue Jul 2, 2025 5 - 8:30 pm").unwrap();
        assert_eq!(r.start, dt(2025, 7, 2, 17, 0));
        assert_eq!(r.end, Some(dt(2025, 7, 2, 20, 30)));

        let r = parse("July 12th, 2025 from 11 to 2 p.m.").unwrap();
        assert_eq!(r.start, dt(2025, 7, 12, 11, 0));
        assert_eq!(r.end, Some(dt(2025, 7, 12, 14, 0)));
    }

    #[test]
    fn test_rule_date_with_time_range_overnight() {
        let r = parse("Dec 31, 2025 9:00 PM – 1:00 AM").unwrap();
        assert_eq!(r.start, dt(2025, 12, 31, 21, 0));
        assert_eq!(r.end, Some(dt(2026, 1, 1, 1, 0)));
    }

    #[test]
    fn test_rule_date_with_time() {
        let r = parse("Friday, July 4, 2025 at 7 pm").unwrap();
        assert_eq!(r.start, dt(2025, 7, 4, 19, 0));
        assert_eq!(r.end, None);
        assert!(!r.all_day);

        let r = parse("Aug 1, 2025 @ noon").unwrap();
        assert_eq!(r.start, dt(2025, 8, 1, 12, 0));
    }

    #[test]
    fn test_rule_month_day_without_year() {
        let r = parse("Sat, Aug 9").unwrap();
        assert_eq!(r.start, dt(2025, 8, 9, 0, 0));
        assert!(r.all_day);
        assert_eq!(r.end, None);

        let r = parse("Aug 9 @ 10:00 am - 2:00 pm").unwrap();
        assert_eq!(r.start, dt(2025, 8, 9, 10, 0));
        assert_eq!(r.end, Some(dt(2025, 8, 9, 14, 0)));

        let r = parse("June 20 - 22").unwrap();
        assert!(r.all_day);
        assert_eq!(r.end, Some(dt(2025, 6, 23, 0, 0)));
    }

    /// The rollover threshold is a tunable heuristic; these cases sit well clear of it.
    #[test]
    fn test_year_rollover_is_threshold_based() {
        let december = ctx(2025, 12, 20);
        let jan = month_day_without_year("Jan 5", &december).unwrap();
        assert_eq!(jan.start.date(), NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());

        let nov = month_day_without_year("Nov 1", &december).unwrap();
        assert_eq!(nov.start.date(), NaiveDate::from_ymd_opt(2025, 11, 1).unwrap());

        assert!(YEAR_ROLLOVER_THRESHOLD_DAYS > 49 && YEAR_ROLLOVER_THRESHOLD_DAYS < 349);
    }

    #[test]
    fn test_rule_multi_day_range() {
        let r = parse("Aug 24 - Aug 26, 2025").unwrap();
        assert_eq!(r.start, dt(2025, 8, 24, 0, 0));
        assert_eq!(r.end, Some(dt(2025, 8, 27, 0, 0)));
        assert!(r.all_day);

        let r = parse("Aug 24 - 26, 2025").unwrap();
        assert_eq!(r.end, Some(dt(2025, 8, 27, 0, 0)));

        let r = parse("Dec 30 - Jan 2, 2026").unwrap();
        assert_eq!(r.start, dt(2025, 12, 30, 0, 0));
        assert_eq!(r.end, Some(dt(2026, 1, 3, 0, 0)));
    }

    #[test]
    fn test_rule_fuzzy() {
        let r = parse("July 4, 2025").unwrap();
        assert!(r.all_day);
        assert_eq!(r.start, dt(2025, 7, 4, 0, 0));

        let r = parse("7/4/25 doors open 6:30 pm").unwrap();
        assert_eq!(r.start, dt(2025, 7, 4, 18, 30));
        assert!(!r.all_day);

        let r = parse("Saturday 4th of July 2025").unwrap();
        assert!(r.all_day);

        let r = parse("Posted 2025-07-04").unwrap();
        assert_eq!(r.start, dt(2025, 7, 4, 0, 0));
        assert!(r.all_day);
    }

    #[test]
    fn test_unparseable_text() {
        assert_eq!(parse("TBA"), None);
        assert_eq!(parse("Every other Tuesday"), None);
        assert_eq!(parse("   "), None);
        assert_eq!(parse("Feb 30, 2025"), None);
    }

    #[test]
    fn test_heuristics_are_ordered() {
        let names: Vec<_> = HEURISTICS.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["date_time_range", "date_time", "month_day_without_year", "multi_day_range", "fuzzy"]
        );
    }
}
