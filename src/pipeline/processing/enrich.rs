//! Budgeted detail-page lookups that fill missing title, start or location.

use crate::apis::jsonld::extract_events;
use crate::common::error::{EnrichmentFailure, NormalizationFailure};
use crate::common::text::clean_text;
use crate::common::time::in_zone;
use crate::common::types::{NormalizedEvent, RawDateTime};
use crate::config::{EnrichmentSettings, ResolvedSource};
use crate::observability::metrics;
use crate::pipeline::ingestion::fetcher::{host_of, Fetcher};
use crate::pipeline::processing::normalize::dates::ParseContext;
use crate::pipeline::processing::normalize::{apply_times, resolve_end, resolve_times};
use crate::pipeline::storage::{EnrichmentCache, EnrichmentCacheEntry};
use chrono::{DateTime, FixedOffset};
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub eligible: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub enriched: usize,
    pub skipped_not_allowed: usize,
    pub skipped_global_budget: usize,
    pub skipped_domain_budget: usize,
    pub failures: usize,
}

/// Has a link to follow and is missing something a detail page might hold.
pub fn needs_enrichment(event: &NormalizedEvent) -> bool {
    event.url.is_some() && (event.start.is_none() || event.title.trim().is_empty() || event.location.is_empty())
}

pub struct Enricher<'a> {
    fetcher: &'a Fetcher,
    settings: &'a EnrichmentSettings,
    sources: HashMap<&'a str, &'a ResolvedSource>,
    allow_list: &'a HashSet<String>,
    now: DateTime<FixedOffset>,
}

impl<'a> Enricher<'a> {
    pub fn new(
        fetcher: &'a Fetcher,
        settings: &'a EnrichmentSettings,
        sources: &'a [ResolvedSource],
        allow_list: &'a HashSet<String>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            fetcher,
            settings,
            sources: sources
                .iter()
                .map(|s| (s.config.source_id.as_str(), s))
                .collect(),
            allow_list,
            now,
        }
    }

    /// Plan sequentially, fetch concurrently, apply and cache sequentially.
    /// Failures leave events and cache untouched.
    #[instrument(skip_all, fields(events = events.len()))]
    pub async fn enrich(&self, events: &mut [NormalizedEvent], cache: &mut EnrichmentCache) -> EnrichmentStats {
        let mut stats = EnrichmentStats::default();
        let mut planned: Vec<String> = Vec::new();
        let mut waiting: HashMap<String, Vec<usize>> = HashMap::new();
        let mut per_domain: HashMap<String, usize> = HashMap::new();

        for (index, event) in events.iter_mut().enumerate() {
            if !needs_enrichment(event) {
                continue;
            }
            let Some(url) = event.url.clone() else {
                continue;
            };
            stats.eligible += 1;

            if let Some(entry) = cache.get(&url) {
                stats.cache_hits += 1;
                metrics::enrich::cache_hit();
                if self.apply(event, entry) {
                    stats.enriched += 1;
                }
                continue;
            }
            if let Some(indices) = waiting.get_mut(&url) {
                indices.push(index);
                continue;
            }
            if planned.len() >= self.settings.max_fetches {
                stats.skipped_global_budget += 1;
                metrics::enrich::skipped("global_budget");
                continue;
            }
            let host = host_of(&url).unwrap_or_default();
            let used = per_domain.get(&host).copied().unwrap_or(0);
            if used >= self.settings.max_per_domain {
                stats.skipped_domain_budget += 1;
                metrics::enrich::skipped("domain_budget");
                continue;
            }
            if !self.allow_list.contains(&event.source_id) {
                stats.skipped_not_allowed += 1;
                metrics::enrich::skipped("not_allowed");
                continue;
            }
            per_domain.insert(host, used + 1);
            planned.push(url.clone());
            waiting.insert(url, vec![index]);
        }

        let mut tasks = JoinSet::new();
        for (order, url) in planned.iter().cloned().enumerate() {
            let fetcher = self.fetcher.clone();
            tasks.spawn(async move {
                let result = fetcher.fetch_text(&url).await;
                (order, url, result)
            });
        }
        stats.fetched = planned.len();

        let mut results = Vec::with_capacity(planned.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    stats.failures += 1;
                    debug!(error = %e, "Enrichment task did not complete");
                }
            }
        }
        results.sort_by_key(|(order, _, _)| *order);

        for (_, url, result) in results {
            let html = match result {
                Ok(html) => html,
                Err(e) => {
                    stats.failures += 1;
                    metrics::enrich::failure();
                    debug!(url = %url, error = %EnrichmentFailure::from(e), "Enrichment fetch failed");
                    continue;
                }
            };
            metrics::enrich::fetched(&host_of(&url).unwrap_or_default());
            let entry = extract_details(&html, &url);
            if entry.is_empty() {
                debug!(url = %url, error = %EnrichmentFailure::NothingFound, "Nothing to enrich from");
            }
            for &index in waiting.get(&url).map(Vec::as_slice).unwrap_or_default() {
                if let Some(event) = events.get_mut(index) {
                    if self.apply(event, &entry) {
                        stats.enriched += 1;
                    }
                }
            }
            cache.insert(url, entry);
        }

        info!(
            "🔎 Enrichment: {} eligible, {} cache hits, {} fetched, {} enriched",
            stats.eligible, stats.cache_hits, stats.fetched, stats.enriched
        );
        stats
    }

    /// Fill only what is missing. Returns whether anything changed.
    fn apply(&self, event: &mut NormalizedEvent, entry: &EnrichmentCacheEntry) -> bool {
        let Some(source) = self.sources.get(event.source_id.as_str()) else {
            return false;
        };
        let mut changed = false;

        if event.title.trim().is_empty() {
            if let Some(title) = entry.title.as_deref().map(clean_text).filter(|t| !t.is_empty()) {
                event.title = title;
                changed = true;
            }
        }

        if event.start.is_none() {
            if let Some(start) = entry.start.as_deref() {
                let ctx = ParseContext {
                    today: in_zone(&self.now, source.zone).date_naive(),
                };
                let raw = RawDateTime {
                    iso: Some(start.to_string()),
                    text: Some(start.to_string()),
                };
                if let Some(times) = resolve_times(&raw, source.zone, &ctx) {
                    let end = entry
                        .end
                        .as_deref()
                        .and_then(|end| {
                            let raw = RawDateTime {
                                iso: Some(end.to_string()),
                                text: Some(end.to_string()),
                            };
                            resolve_end(&raw, source.zone, &ctx)
                        })
                        .or(times.end);
                    apply_times(event, times.start, end, times.all_day, source.default_duration);
                    changed = true;
                }
            }
        }

        if event.location.is_empty() {
            if let Some(location) = entry.location.as_deref().map(clean_text).filter(|l| !l.is_empty()) {
                event.location = location;
                changed = true;
            }
        }

        if changed {
            event.ensure_end(source.default_duration);
            event.refresh_stable_id();
        }
        changed
    }
}

/// JSON-LD event first; otherwise `og:title`, then the first `<h1>`, for the title only.
pub fn extract_details(html: &str, page_url: &str) -> EnrichmentCacheEntry {
    if let Some(event) = extract_events(html).into_iter().next() {
        let candidate = event.into_candidate("", Some(page_url));
        let first = |raw: Option<RawDateTime>| raw.and_then(|r| r.iso.or(r.text));
        return EnrichmentCacheEntry {
            title: Some(candidate.title).filter(|t| !t.is_empty()),
            start: first(candidate.raw_start),
            end: first(candidate.raw_end),
            location: Some(candidate.raw_location).filter(|l| !l.is_empty()),
        };
    }
    EnrichmentCacheEntry {
        title: fallback_title(html),
        ..Default::default()
    }
}

fn fallback_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let og = Selector::parse(r#"meta[property="og:title"]"#).ok()?;
    let og_title = document
        .select(&og)
        .filter_map(|m| m.value().attr("content"))
        .map(clean_text)
        .find(|t| !t.is_empty());
    if og_title.is_some() {
        return og_title;
    }
    let h1 = Selector::parse("h1").ok()?;
    document
        .select(&h1)
        .map(|h| clean_text(&h.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

/// Anything enrichment could not complete leaves the run here.
pub fn retain_complete(events: Vec<NormalizedEvent>) -> (Vec<NormalizedEvent>, Vec<NormalizationFailure>) {
    let mut kept = Vec::with_capacity(events.len());
    let mut dropped = Vec::new();
    for event in events {
        if event.is_pending() {
            dropped.push(NormalizationFailure::MissingStartAfterEnrichment);
        } else if event.title.trim().is_empty() {
            dropped.push(NormalizationFailure::EmptyTitleAfterEnrichment);
        } else {
            kept.push(event);
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::SourceAdapter;
    use crate::app::ports::{HttpClientPort, HttpGetResult};
    use crate::common::error::FetchError;
    use crate::config::SourceConfig;
    use crate::infra::rate_limiter::DomainRateLimiter;
    use crate::pipeline::ingestion::fetcher::RetryPolicy;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use chrono_tz::America::Chicago;
    use std::sync::{Arc, Mutex};

    struct Pages {
        pages: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl Pages {
        fn new(pages: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                pages: pages.iter().map(|(u, b)| (u.to_string(), b.to_string())).collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClientPort for Pages {
        async fn get(&self, url: &str) -> Result<HttpGetResult, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(HttpGetResult {
                    status: 200,
                    bytes: body.as_bytes().to_vec(),
                    content_type: "text/html".to_string(),
                }),
                None => Ok(HttpGetResult {
                    status: 404,
                    bytes: Vec::new(),
                    content_type: "text/html".to_string(),
                }),
            }
        }
    }

    fn fetcher(http: Arc<Pages>) -> Fetcher {
        Fetcher::new(http, Arc::new(DomainRateLimiter::unlimited()), RetryPolicy::default())
    }

    fn sources(enrich: bool) -> Vec<ResolvedSource> {
        let mut config = SourceConfig::new("minocqua", "html_jsonld", "https://minocqua.org/events/");
        config.enrich = enrich;
        vec![ResolvedSource {
            config,
            adapter: SourceAdapter::HtmlJsonLd,
            zone: Chicago,
            default_duration: Duration::minutes(60),
        }]
    }

    fn now() -> DateTime<FixedOffset> {
        Chicago.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap().fixed_offset()
    }

    fn pending(url: &str) -> NormalizedEvent {
        let mut ev = NormalizedEvent {
            source_id: "minocqua".to_string(),
            title: "Regatta".to_string(),
            start: None,
            end: None,
            end_explicit: false,
            all_day: false,
            location: String::new(),
            url: Some(url.to_string()),
            description: None,
            source_event_id: None,
            stable_id: String::new(),
        };
        ev.refresh_stable_id();
        ev
    }

    const DETAIL: &str = r#"<html><head><script type="application/ld+json">
        {"@type":"Event","name":"Regatta","startDate":"2025-08-09T10:00:00-05:00",
         "endDate":"2025-08-09T16:00:00-05:00","location":{"name":"Lake Minocqua"}}
    </script></head></html>"#;

    #[tokio::test]
    async fn test_fills_missing_fields_and_caches() {
        let url = "https://minocqua.org/events/regatta/";
        let http = Pages::new(&[(url, DETAIL)]);
        let fetcher = fetcher(http.clone());
        let sources = sources(true);
        let settings = EnrichmentSettings::default();
        let allow: HashSet<String> = ["minocqua".to_string()].into_iter().collect();
        let enricher = Enricher::new(&fetcher, &settings, &sources, &allow, now());

        let mut events = vec![pending(url), pending(url)];
        let before_id = events[0].stable_id.clone();
        let mut cache = EnrichmentCache::default();
        let stats = enricher.enrich(&mut events, &mut cache).await;

        assert_eq!(http.calls(), 1);
        assert_eq!(stats.eligible, 2);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.enriched, 2);
        let ev = &events[0];
        assert_eq!(ev.start, Some(Chicago.with_ymd_and_hms(2025, 8, 9, 10, 0, 0).unwrap().fixed_offset()));
        assert!(ev.end_explicit);
        assert_eq!(ev.location, "Lake Minocqua");
        assert_ne!(ev.stable_id, before_id);
        assert!(cache.get(url).is_some());

        let mut again = vec![pending(url)];
        let stats = enricher.enrich(&mut again, &mut cache).await;
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(http.calls(), 1);
        assert!(!again[0].is_pending());
    }

    #[tokio::test]
    async fn test_not_allowed_and_budgets() {
        let http = Pages::new(&[]);
        let fetcher = fetcher(http.clone());
        let sources = sources(false);
        let settings = EnrichmentSettings {
            max_fetches: 1,
            max_per_domain: 1,
        };
        let empty = HashSet::new();
        let enricher = Enricher::new(&fetcher, &settings, &sources, &empty, now());
        let mut events = vec![pending("https://minocqua.org/a")];
        let stats = enricher.enrich(&mut events, &mut EnrichmentCache::default()).await;
        assert_eq!(stats.skipped_not_allowed, 1);
        assert_eq!(http.calls(), 0);

        let allow: HashSet<String> = ["minocqua".to_string()].into_iter().collect();
        let enricher = Enricher::new(&fetcher, &settings, &sources, &allow, now());
        let mut events = vec![
            pending("https://minocqua.org/a"),
            pending("https://minocqua.org/b"),
        ];
        let mut cache = EnrichmentCache::default();
        let stats = enricher.enrich(&mut events, &mut cache).await;
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.skipped_global_budget, 1);
        assert_eq!(stats.failures, 1);
        assert!(cache.is_empty());
        assert!(events[0].is_pending());
    }

    #[tokio::test]
    async fn test_domain_budget() {
        let http = Pages::new(&[]);
        let fetcher = fetcher(http.clone());
        let sources = sources(true);
        let settings = EnrichmentSettings {
            max_fetches: 10,
            max_per_domain: 1,
        };
        let allow: HashSet<String> = ["minocqua".to_string()].into_iter().collect();
        let enricher = Enricher::new(&fetcher, &settings, &sources, &allow, now());
        let mut events = vec![
            pending("https://minocqua.org/a"),
            pending("https://minocqua.org/b"),
        ];
        let stats = enricher.enrich(&mut events, &mut EnrichmentCache::default()).await;
        assert_eq!(stats.skipped_domain_budget, 1);
        assert_eq!(http.calls(), 1);
    }

    #[test]
    fn test_title_fallbacks() {
        let og = r#"<html><head><meta property="og:title" content=" Ice  Fishing Derby "></head><body><h1>Events</h1></body></html>"#;
        assert_eq!(extract_details(og, "https://x.org/e").title.as_deref(), Some("Ice Fishing Derby"));
        let h1 = "<html><body><h1>Snowmobile <em>Races</em></h1></body></html>";
        let entry = extract_details(h1, "https://x.org/e");
        assert_eq!(entry.title.as_deref(), Some("Snowmobile Races"));
        assert!(entry.start.is_none());
        assert!(extract_details("<html></html>", "https://x.org/e").is_empty());
    }

    #[test]
    fn test_retain_complete() {
        let mut titled = pending("https://x.org/a");
        titled.start = Some(now());
        let mut untitled = titled.clone();
        untitled.title = String::new();
        let (kept, dropped) = retain_complete(vec![titled, untitled, pending("https://x.org/b")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(
            dropped,
            vec![
                NormalizationFailure::EmptyTitleAfterEnrichment,
                NormalizationFailure::MissingStartAfterEnrichment,
            ]
        );
    }
}
