use super::ics_feed::candidates_from_feed;
use super::jsonld::resolve_url;
use super::{fetch_page, SourceOutcome};
use crate::common::types::RawCandidate;
use crate::config::ResolvedSource;
use crate::pipeline::ingestion::fetcher::Fetcher;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

/// Discover a feed on an HTML page and decode the first one that yields events.
pub async fn collect(source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
    let id = &source.config.source_id;
    let page_url = &source.config.url;
    let mut outcome = SourceOutcome::default();

    let mut links = match &source.config.feed {
        Some(feed) => vec![feed.clone()],
        None => match fetch_page(source, fetcher, page_url).await {
            Ok(html) => discover_feed_links(&html, page_url),
            Err(e) => {
                outcome.failure(id, format!("failed {} -> {}", page_url, e));
                Vec::new()
            }
        },
    };
    if links.is_empty() {
        links = guess_feed_urls(page_url);
        outcome.note(id, format!("no feed links on page, trying {} guesses", links.len()));
    }

    if let Some(candidates) = first_feed_with_events(source, fetcher, &links, &mut outcome).await {
        outcome.candidates = candidates;
        return outcome;
    }
    outcome.failure(id, "no feed link yielded events");
    outcome
}

/// Decode each link in order and keep the first that yields events.
pub(crate) async fn first_feed_with_events(
    source: &ResolvedSource,
    fetcher: &Fetcher,
    links: &[String],
    outcome: &mut SourceOutcome,
) -> Option<Vec<RawCandidate>> {
    let id = &source.config.source_id;
    for link in links {
        match fetcher.fetch_text(link).await {
            Ok(text) => {
                let candidates = candidates_from_feed(&text, id, source.zone);
                if candidates.is_empty() {
                    debug!(url = %link, "Feed link decoded to nothing");
                    continue;
                }
                outcome.note(id, format!("parsed {} from {}", candidates.len(), link));
                return Some(candidates);
            }
            Err(e) => outcome.note(id, format!("feed {} -> {}", link, e)),
        }
    }
    None
}

/// Anchors that look like calendar feeds, resolved and deduplicated in page order.
pub fn discover_feed_links(html: &str, base: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let lower = href.trim().to_ascii_lowercase();
        let text = anchor.text().collect::<String>().to_ascii_lowercase();
        let looks_like_feed = lower.contains("ical")
            || lower.ends_with(".ics")
            || lower.starts_with("webcal://")
            || ["ics", "ical", "export"].iter().any(|w| text.contains(w));
        if !looks_like_feed {
            continue;
        }
        if let Some(abs) = resolve_url(Some(base), href) {
            if seen.insert(abs.clone()) {
                links.push(abs);
            }
        }
    }
    links
}

/// Conventional feed locations on WordPress calendar sites.
pub fn guess_feed_urls(page_url: &str) -> Vec<String> {
    let base = page_url.trim().trim_end_matches('/');
    let mut guesses = vec![format!("{}/?ical=1", base), format!("{}/month/?ical=1", base)];
    for (from, to) in [("/festivals-events", "/events"), ("/events-calendar", "/events")] {
        if base.contains(from) {
            guesses.push(format!("{}/?ical=1", base.replace(from, to)));
        }
    }
    guesses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_feed_links() {
        let html = r#"<html><body>
            <a href="/events/?ical=1">Subscribe</a>
            <a href="webcal://example.org/cal.ics">Add to calendar</a>
            <a href="/downloads/season">Export Events</a>
            <a href="/events/?ical=1">Subscribe again</a>
            <a href="/about">About us</a>
        </body></html>"#;
        let links = discover_feed_links(html, "https://example.org/events/");
        assert_eq!(
            links,
            vec![
                "https://example.org/events/?ical=1",
                "webcal://example.org/cal.ics",
                "https://example.org/downloads/season",
            ]
        );
    }

    #[test]
    fn test_guess_feed_urls() {
        assert_eq!(
            guess_feed_urls("https://minocqua.org/events/"),
            vec![
                "https://minocqua.org/events/?ical=1",
                "https://minocqua.org/events/month/?ical=1",
            ]
        );
        let guesses = guess_feed_urls("https://eagleriver.org/festivals-events");
        assert_eq!(guesses.len(), 3);
        assert_eq!(guesses[2], "https://eagleriver.org/events/?ical=1");
    }
}
