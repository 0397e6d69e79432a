use super::jsonld::extract_events;
use super::{fetch_page, SourceOutcome};
use crate::common::types::RawCandidate;
use crate::config::ResolvedSource;
use crate::pipeline::ingestion::fetcher::Fetcher;

/// Events embedded in the configured page itself.
pub async fn collect(source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
    let id = &source.config.source_id;
    let url = &source.config.url;
    let mut outcome = SourceOutcome::default();
    match fetch_page(source, fetcher, url).await {
        Ok(html) => {
            outcome.candidates = candidates_from_page(&html, id, url);
            if outcome.candidates.is_empty() {
                outcome.note(id, format!("no JSON-LD events on {}", url));
            }
        }
        Err(e) => outcome.failure(id, format!("failed {} -> {}", url, e)),
    }
    outcome
}

pub fn candidates_from_page(html: &str, source_id: &str, page_url: &str) -> Vec<RawCandidate> {
    extract_events(html)
        .into_iter()
        .map(|ev| ev.into_candidate(source_id, Some(page_url)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_from_page() {
        let html = r#"<html><head><script type="application/ld+json">
            [{"@type":"Event","name":"Loon Watch","startDate":"2025-06-14T07:00","url":"loon-watch/",
              "location":"Boom Lake Landing"}]
        </script></head></html>"#;
        let candidates = candidates_from_page(html, "rhinelander", "https://explorerhinelander.com/events/");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Loon Watch");
        assert_eq!(
            candidates[0].url.as_deref(),
            Some("https://explorerhinelander.com/events/loon-watch/")
        );
        assert_eq!(candidates[0].raw_location, "Boom Lake Landing");
    }

    #[test]
    fn test_page_without_jsonld_is_empty() {
        assert!(candidates_from_page("<html><body>nothing</body></html>", "x", "https://x.com").is_empty());
    }
}
