//! schema.org `Event` objects embedded as JSON-LD.

use crate::common::text::{clean_opt, clean_text};
use crate::common::types::{RawCandidate, RawDateTime};
use chrono::{Duration, NaiveDate};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// Nested containers are walked at most this deep.
const MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonLdEvent {
    pub name: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub url: Option<String>,
    pub location: String,
    pub description: Option<String>,
}

impl JsonLdEvent {
    /// Relative links resolve against `page_url`. JSON-LD `endDate` dates are
    /// inclusive; candidates carry exclusive date-only ends.
    pub fn into_candidate(self, source_id: &str, page_url: Option<&str>) -> RawCandidate {
        let url = self.url.as_deref().and_then(|u| resolve_url(page_url, u));
        RawCandidate {
            source_id: source_id.to_string(),
            title: self.name,
            source_event_id: url.clone(),
            url,
            raw_start: self.start.map(|s| RawDateTime {
                iso: Some(s.clone()),
                text: Some(s),
            }),
            raw_end: self.end.map(|e| match exclusive_date_end(&e) {
                Some(shifted) => RawDateTime::iso(shifted),
                None => RawDateTime {
                    iso: Some(e.clone()),
                    text: Some(e),
                },
            }),
            raw_location: self.location,
            raw_description: self.description,
        }
    }
}

fn exclusive_date_end(value: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    Some((date + Duration::days(1)).format("%Y-%m-%d").to_string())
}

pub fn resolve_url(base: Option<&str>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Ok(abs) = url::Url::parse(href) {
        return Some(abs.to_string());
    }
    let base = url::Url::parse(base?).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Text of every `<script type="application/ld+json">` block.
pub fn script_blocks(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script[type]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter(|el| {
            el.value()
                .attr("type")
                .map_or(false, |t| t.trim().eq_ignore_ascii_case("application/ld+json"))
        })
        .map(|el| el.text().collect::<String>())
        .filter(|t| !t.trim().is_empty())
        .collect()
}

pub fn extract_events(html: &str) -> Vec<JsonLdEvent> {
    let mut out = Vec::new();
    for block in script_blocks(html) {
        for value in parse_block(&block) {
            collect(&value, &mut out, 0);
        }
    }
    out
}

/// Parse a block, salvaging concatenated top-level objects when it is not one document.
pub fn parse_block(block: &str) -> Vec<Value> {
    let trimmed = block.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => vec![value],
        Err(e) => {
            debug!("JSON-LD block is not a single document ({}), salvaging objects", e);
            split_objects(trimmed)
                .into_iter()
                .filter_map(|chunk| serde_json::from_str(chunk).ok())
                .collect()
        }
    }
}

/// Balanced top-level `{...}` chunks, respecting string literals.
fn split_objects(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        chunks.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    chunks
}

fn collect(value: &Value, out: &mut Vec<JsonLdEvent>, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, out, depth + 1);
            }
        }
        Value::Object(map) => {
            if is_event(value) {
                if let Some(event) = event_from(value) {
                    out.push(event);
                }
            }
            for key in ["@graph", "itemListElement", "item", "subEvent", "mainEntity"] {
                if let Some(child) = map.get(key) {
                    collect(child, out, depth + 1);
                }
            }
        }
        _ => {}
    }
}

/// `Event` or any subtype (`MusicEvent`, `SocialEvent`), string or list-valued.
fn is_event(node: &Value) -> bool {
    let matches = |t: &str| t.trim().to_ascii_lowercase().ends_with("event");
    match node.get("@type") {
        Some(Value::String(t)) => matches(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn event_from(node: &Value) -> Option<JsonLdEvent> {
    let name = string_field(node, "name")
        .or_else(|| string_field(node, "headline"))
        .map(|n| clean_text(&n))
        .unwrap_or_default();
    let start = string_field(node, "startDate");
    if name.is_empty() && start.is_none() {
        return None;
    }
    Some(JsonLdEvent {
        name,
        start,
        end: string_field(node, "endDate"),
        url: link_field(node.get("url")).or_else(|| {
            string_field(node, "@id").filter(|id| id.starts_with("http"))
        }),
        location: flatten_location(node.get("location")),
        description: clean_opt(string_field(node, "description").as_deref()),
    })
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn link_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(_) => {
            let v = value?;
            string_field(v, "url").or_else(|| string_field(v, "@id"))
        }
        Value::Array(items) => items.iter().find_map(|i| link_field(Some(i))),
        _ => None,
    }
}

/// `Place` name plus address parts, a plain string, or the first usable list entry.
pub fn flatten_location(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match value {
        Value::String(s) => clean_text(s),
        Value::Array(items) => items
            .iter()
            .map(|i| flatten_location(Some(i)))
            .find(|s| !s.is_empty())
            .unwrap_or_default(),
        Value::Object(_) => {
            let mut parts: Vec<String> = Vec::new();
            if let Some(name) = string_field(value, "name") {
                parts.push(name);
            }
            match value.get("address") {
                Some(Value::String(addr)) => parts.push(addr.trim().to_string()),
                Some(addr @ Value::Object(_)) => {
                    for key in ["streetAddress", "addressLocality", "addressRegion"] {
                        if let Some(part) = string_field(addr, key) {
                            parts.push(part);
                        }
                    }
                }
                _ => {}
            }
            parts.dedup();
            clean_text(&parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(", "))
        }
        _ => String::new(),
    }
}
