use super::html_jsonld::collect_from_listing;
use super::ics_auto::{discover_feed_links, first_feed_with_events};
use super::{fetch_page, SourceOutcome};
use crate::config::ResolvedSource;
use crate::pipeline::ingestion::fetcher::Fetcher;

/// Prefer a calendar feed linked from the page; without one, crawl the page
/// the way `html_jsonld` does.
pub async fn collect(source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
    let id = &source.config.source_id;
    let page_url = &source.config.url;
    let mut outcome = SourceOutcome::default();

    let html = match fetch_page(source, fetcher, page_url).await {
        Ok(html) => html,
        Err(e) => {
            outcome.failure(id, format!("failed {} -> {}", page_url, e));
            return outcome;
        }
    };

    let links = match &source.config.feed {
        Some(feed) => vec![feed.clone()],
        None => discover_feed_links(&html, page_url),
    };
    if links.is_empty() {
        outcome.note(id, "no feed links on page, scanning for JSON-LD");
    } else {
        if let Some(candidates) = first_feed_with_events(source, fetcher, &links, &mut outcome).await {
            outcome.candidates = candidates;
            return outcome;
        }
        outcome.note(id, format!("{} feed links yielded nothing, scanning for JSON-LD", links.len()));
    }
    collect_from_listing(source, fetcher, &html, outcome).await
}
