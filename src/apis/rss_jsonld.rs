use super::html_jsonld::candidates_from_detail;
use super::jsonld::resolve_url;
use super::{fetch_page, SourceOutcome};
use crate::common::error::ParseError;
use crate::common::text::{clean_opt, clean_text, decode_entities};
use crate::common::types::{RawCandidate, RawDateTime};
use crate::config::ResolvedSource;
use crate::pipeline::ingestion::fetcher::Fetcher;
use chrono::{DateTime, SecondsFormat};
use rss::Channel;
use tokio::task::JoinSet;
use tracing::debug;

/// An RSS item with a link worth following.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub link: String,
    pub title: String,
    pub published: Option<String>,
    pub summary: Option<String>,
}

/// RSS listing (`feed`, falling back to `url`), then the JSON-LD on each linked
/// page. Items whose page has no events fall back to the item itself.
pub async fn collect(source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
    let id = source.config.source_id.clone();
    let feed_url = source
        .config
        .feed
        .clone()
        .unwrap_or_else(|| source.config.url.clone());
    let mut outcome = SourceOutcome::default();

    let body = match fetcher.fetch_text(&feed_url).await {
        Ok(body) => body,
        Err(e) => {
            outcome.failure(&id, format!("failed {} -> {}", feed_url, e));
            return outcome;
        }
    };
    let items = match parse_items(&body, &feed_url, source.config.max_detail_pages) {
        Ok(items) => items,
        Err(e) => {
            outcome.failure(&id, format!("feed {} -> {}", feed_url, e));
            return outcome;
        }
    };
    outcome.note(&id, format!("{} RSS items in {}", items.len(), feed_url));

    let mut tasks = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let fetcher = fetcher.clone();
        let source = source.clone();
        tasks.spawn(async move {
            let result = fetch_page(&source, &fetcher, &item.link).await;
            (index, item, result)
        });
    }

    let mut pages = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(page) => pages.push(page),
            Err(e) => outcome.failure(&id, format!("detail task panicked: {}", e)),
        }
    }
    pages.sort_by_key(|(index, _, _)| *index);

    for (_, item, result) in pages {
        match result {
            Ok(page) => {
                let found = candidates_from_detail(&page, &id, &item.link);
                if !found.is_empty() {
                    outcome.candidates.extend(found);
                    continue;
                }
                match item_candidate(&item, &id) {
                    Some(candidate) => outcome.candidates.push(candidate),
                    None => debug!(url = %item.link, "No events and no pubDate for RSS item"),
                }
            }
            Err(e) => outcome.failure(&id, format!("detail {} -> {}", item.link, e)),
        }
    }
    outcome
}

/// Linked items in feed order, at most `limit`. Relative links resolve against the feed.
pub fn parse_items(body: &str, feed_url: &str, limit: usize) -> Result<Vec<FeedItem>, ParseError> {
    let channel = Channel::read_from(body.as_bytes()).map_err(|e| ParseError::Rss(e.to_string()))?;
    Ok(channel
        .items()
        .iter()
        .filter_map(|item| {
            let link = resolve_url(Some(feed_url), item.link()?)?;
            Some(FeedItem {
                link,
                title: item.title().map(|t| clean_text(&decode_entities(t))).unwrap_or_default(),
                published: clean_opt(item.pub_date()),
                summary: item.description().map(str::to_string),
            })
        })
        .take(limit)
        .collect())
}

/// Candidate built from the item alone; the publication date stands in for the start.
pub fn item_candidate(item: &FeedItem, source_id: &str) -> Option<RawCandidate> {
    let published = item.published.as_deref()?;
    let raw_start = match DateTime::parse_from_rfc2822(published) {
        Ok(dt) => RawDateTime::iso(dt.to_rfc3339_opts(SecondsFormat::Secs, false)),
        Err(_) => RawDateTime::text(published),
    };
    Some(RawCandidate {
        url: Some(item.link.clone()),
        source_event_id: Some(item.link.clone()),
        raw_start: Some(raw_start),
        raw_description: item.summary.clone(),
        ..RawCandidate::new(source_id, item.title.clone())
    })
}
