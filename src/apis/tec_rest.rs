//! The Events Calendar (WordPress) REST API: `/wp-json/tribe/events/v1/events`.

use super::SourceOutcome;
use crate::common::error::ParseError;
use crate::common::text::{clean_text, decode_entities};
use crate::common::types::{RawCandidate, RawDateTime};
use crate::config::ResolvedSource;
use crate::pipeline::ingestion::fetcher::Fetcher;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const PER_PAGE: usize = 50;
const MAX_PAGES: u32 = 20;

#[derive(Debug, Deserialize, Default)]
pub struct TecPage {
    #[serde(default)]
    pub events: Vec<TecEvent>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub next_rest_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TecEvent {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    /// An object, a list of objects, or `[]` when the event has no venue.
    #[serde(default)]
    pub venue: Value,
}

pub async fn collect(source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
    let id = &source.config.source_id;
    let mut outcome = SourceOutcome::default();
    let Some(base) = endpoint(&source.config.url) else {
        outcome.failure(id, format!("cannot derive REST endpoint from {}", source.config.url));
        return outcome;
    };

    for page in 1..=MAX_PAGES {
        let url = format!("{}?per_page={}&page={}", base, PER_PAGE, page);
        let body = match fetcher.fetch_text(&url).await {
            Ok(body) => body,
            Err(e) => {
                outcome.failure(id, format!("failed {} -> {}", url, e));
                break;
            }
        };
        let parsed = match parse_page(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                outcome.failure(id, format!("page {} -> {}", page, e));
                break;
            }
        };
        debug!(page, events = parsed.events.len(), total = ?parsed.total, "TEC page");
        let done = parsed.events.is_empty()
            || parsed.total_pages.map_or(false, |t| page >= t)
            || parsed.next_rest_url.is_none();
        outcome
            .candidates
            .extend(parsed.events.into_iter().map(|ev| to_candidate(ev, id)));
        if done {
            break;
        }
    }
    outcome.note(id, format!("parsed {} from REST API", outcome.candidates.len()));
    outcome
}

/// Site root plus the TEC events route.
pub fn endpoint(site_url: &str) -> Option<String> {
    let parsed = url::Url::parse(site_url.trim()).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    Some(format!(
        "{}://{}{}/wp-json/tribe/events/v1/events",
        parsed.scheme(),
        host,
        port
    ))
}

pub fn parse_page(body: &str) -> Result<TecPage, ParseError> {
    serde_json::from_str(body).map_err(|e| ParseError::Json(e.to_string()))
}

pub fn to_candidate(event: TecEvent, source_id: &str) -> RawCandidate {
    let (raw_start, raw_end) = if event.all_day {
        let start = event.start_date.as_deref().and_then(date_part);
        let end = event
            .end_date
            .as_deref()
            .and_then(date_part)
            .map(|d| d + Duration::days(1));
        (
            start.map(|d| RawDateTime::iso(d.format("%Y-%m-%d").to_string())),
            end.map(|d| RawDateTime::iso(d.format("%Y-%m-%d").to_string())),
        )
    } else {
        (
            event.start_date.map(RawDateTime::iso),
            event.end_date.map(RawDateTime::iso),
        )
    };
    let event_id = match &event.id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };
    RawCandidate {
        source_id: source_id.to_string(),
        title: clean_text(&decode_entities(&event.title)),
        url: event.url.filter(|u| !u.trim().is_empty()),
        source_event_id: event_id,
        raw_start,
        raw_end,
        raw_location: flatten_venue(&event.venue),
        raw_description: event.description,
    }
}

fn date_part(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()
}

/// `venue, city, region` from the first venue object.
pub fn flatten_venue(venue: &Value) -> String {
    let venue = match venue {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return String::new(),
        },
        other => other,
    };
    let Value::Object(_) = venue else {
        return String::new();
    };
    let field = |key: &str| {
        venue
            .get(key)
            .and_then(Value::as_str)
            .map(|s| clean_text(&decode_entities(s)))
            .filter(|s| !s.is_empty())
    };
    let region = field("state").or_else(|| field("province")).or_else(|| field("stateprovince"));
    [field("venue"), field("city"), region]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ")
}
