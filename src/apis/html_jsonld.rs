use super::jsonld::{extract_events, resolve_url};
use super::jsonld_page::candidates_from_page;
use super::{fetch_page, SourceOutcome};
use crate::common::types::RawCandidate;
use crate::config::ResolvedSource;
use crate::pipeline::ingestion::fetcher::Fetcher;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tokio::task::JoinSet;
use tracing::debug;

/// Listing page, then each same-host detail page, scanned for JSON-LD events.
pub async fn collect(source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
    let id = source.config.source_id.clone();
    let listing_url = source.config.url.clone();
    let mut outcome = SourceOutcome::default();

    match fetch_page(source, fetcher, &listing_url).await {
        Ok(html) => collect_from_listing(source, fetcher, &html, outcome).await,
        Err(e) => {
            outcome.failure(&id, format!("failed {} -> {}", listing_url, e));
            outcome
        }
    }
}

/// Events on an already fetched listing page plus its detail pages.
pub(crate) async fn collect_from_listing(
    source: &ResolvedSource,
    fetcher: &Fetcher,
    html: &str,
    mut outcome: SourceOutcome,
) -> SourceOutcome {
    let id = source.config.source_id.clone();
    let listing_url = source.config.url.clone();
    outcome
        .candidates
        .extend(candidates_from_page(html, &id, &listing_url));
    let links = detail_links(html, &listing_url, source.config.max_detail_pages);
    outcome.note(&id, format!("{} detail links on {}", links.len(), listing_url));

    let mut tasks = JoinSet::new();
    for (index, link) in links.into_iter().enumerate() {
        let fetcher = fetcher.clone();
        let source = source.clone();
        tasks.spawn(async move {
            let result = fetch_page(&source, &fetcher, &link).await;
            (index, link, result)
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

    for (_, link, result) in pages {
        match result {
            Ok(page) => {
                let found = candidates_from_detail(&page, &id, &link);
                debug!(url = %link, events = found.len(), "Scanned detail page");
                outcome.candidates.extend(found);
            }
            Err(e) => outcome.failure(&id, format!("detail {} -> {}", link, e)),
        }
    }
    outcome
}

/// Events on a detail page default their link to the page they came from.
pub fn candidates_from_detail(html: &str, source_id: &str, detail_url: &str) -> Vec<RawCandidate> {
    extract_events(html)
        .into_iter()
        .map(|ev| {
            let mut candidate = ev.into_candidate(source_id, Some(detail_url));
            if candidate.url.is_none() {
                candidate.url = Some(detail_url.to_string());
                candidate.source_event_id = Some(detail_url.to_string());
            }
            candidate
        })
        .collect()
}

/// Same-host links whose path looks like an event or calendar page.
pub fn detail_links(html: &str, base: &str, max: usize) -> Vec<String> {
    let Ok(base_url) = url::Url::parse(base) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    seen.insert(without_fragment(base_url.as_str()));
    let mut links = Vec::new();
    for anchor in document.select(&selector) {
        if links.len() >= max {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        let lower = href.to_ascii_lowercase();
        if href.starts_with('#')
            || lower.starts_with("mailto:")
            || lower.starts_with("webcal:")
            || lower.ends_with(".ics")
            || lower.contains("ical=")
        {
            continue;
        }
        let Some(abs) = resolve_url(Some(base), href) else {
            continue;
        };
        let Ok(parsed) = url::Url::parse(&abs) else {
            continue;
        };
        if parsed.host_str() != base_url.host_str() {
            continue;
        }
        let path = parsed.path().to_ascii_lowercase();
        if !(path.contains("/event") || path.contains("calendar") || path.contains("whatson")) {
            continue;
        }
        let abs = without_fragment(&abs);
        if seen.insert(abs.clone()) {
            links.push(abs);
        }
    }
    links
}

fn without_fragment(url: &str) -> String {
    match url.split_once('#') {
        Some((head, _)) => head.to_string(),
        None => url.to_string(),
    }
}
