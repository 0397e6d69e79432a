//! Source adapters. Each turns one configured source into `RawCandidate`s and
//! never fails outward: fetch and parse problems become log lines.

pub mod html_jsonld;
pub mod ics_auto;
pub mod ics_feed;
pub mod ics_or_html;
pub mod jsonld;
pub mod jsonld_page;
pub mod rss_jsonld;
pub mod tec_rest;

use crate::common::constants::{
    HTML_JSONLD_KIND, ICS_AUTO_KIND, ICS_KIND, ICS_OR_HTML_KIND, JSONLD_PAGE_KIND, RSS_JSONLD_KIND,
    TEC_REST_KIND,
};
use crate::common::error::FetchError;
use crate::common::types::RawCandidate;
use crate::config::ResolvedSource;
use crate::pipeline::ingestion::fetcher::Fetcher;
use tracing::{info, instrument, warn};

/// Adapter kinds, resolved once when the configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceAdapter {
    IcsFeed,
    IcsAuto,
    JsonLdPage,
    HtmlJsonLd,
    TecRest,
    IcsOrHtml,
    RssJsonLd,
}

impl SourceAdapter {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            ICS_KIND => Some(SourceAdapter::IcsFeed),
            ICS_AUTO_KIND => Some(SourceAdapter::IcsAuto),
            JSONLD_PAGE_KIND => Some(SourceAdapter::JsonLdPage),
            HTML_JSONLD_KIND => Some(SourceAdapter::HtmlJsonLd),
            TEC_REST_KIND => Some(SourceAdapter::TecRest),
            ICS_OR_HTML_KIND => Some(SourceAdapter::IcsOrHtml),
            RSS_JSONLD_KIND => Some(SourceAdapter::RssJsonLd),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceAdapter::IcsFeed => ICS_KIND,
            SourceAdapter::IcsAuto => ICS_AUTO_KIND,
            SourceAdapter::JsonLdPage => JSONLD_PAGE_KIND,
            SourceAdapter::HtmlJsonLd => HTML_JSONLD_KIND,
            SourceAdapter::TecRest => TEC_REST_KIND,
            SourceAdapter::IcsOrHtml => ICS_OR_HTML_KIND,
            SourceAdapter::RssJsonLd => RSS_JSONLD_KIND,
        }
    }

    #[instrument(skip_all, fields(source_id = %source.config.source_id, kind = self.kind()))]
    pub async fn collect(&self, source: &ResolvedSource, fetcher: &Fetcher) -> SourceOutcome {
        let outcome = match self {
            SourceAdapter::IcsFeed => ics_feed::collect(source, fetcher).await,
            SourceAdapter::IcsAuto => ics_auto::collect(source, fetcher).await,
            SourceAdapter::JsonLdPage => jsonld_page::collect(source, fetcher).await,
            SourceAdapter::HtmlJsonLd => html_jsonld::collect(source, fetcher).await,
            SourceAdapter::TecRest => tec_rest::collect(source, fetcher).await,
            SourceAdapter::IcsOrHtml => ics_or_html::collect(source, fetcher).await,
            SourceAdapter::RssJsonLd => rss_jsonld::collect(source, fetcher).await,
        };
        info!(
            "📦 {}: {} candidates, {} failures",
            source.config.source_id,
            outcome.candidates.len(),
            outcome.failures
        );
        outcome
    }
}

/// What one source produced this run.
#[derive(Debug, Clone, Default)]
pub struct SourceOutcome {
    pub candidates: Vec<RawCandidate>,
    pub failures: usize,
    /// Adapter-level log lines, prefixed with the source id.
    pub log: Vec<String>,
}

impl SourceOutcome {
    pub fn note(&mut self, source_id: &str, message: impl AsRef<str>) {
        self.log.push(format!("{}: {}", source_id, message.as_ref()));
    }

    pub fn failure(&mut self, source_id: &str, message: impl AsRef<str>) {
        warn!(source_id = %source_id, "{}", message.as_ref());
        self.failures += 1;
        self.note(source_id, message);
    }
}

/// Page fetch honoring the source's `render` flag.
pub(crate) async fn fetch_page(
    source: &ResolvedSource,
    fetcher: &Fetcher,
    url: &str,
) -> Result<String, FetchError> {
    if source.config.render {
        fetcher.fetch_rendered(url).await
    } else {
        fetcher.fetch_text(url).await
    }
}
