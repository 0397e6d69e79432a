//! Metrics for the ingestion pipeline.
//!
//! Recording is always cheap: without an installed recorder the `metrics`
//! macros are no-ops, so the helpers are safe to call from tests.

use std::fmt;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Every metric name the pipeline records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Fetch
    FetchRequestsSuccess,
    FetchRequestsError,
    FetchRetries,
    FetchDuration,
    FetchPayloadBytes,

    // Sources
    SourceCandidates,
    SourceFailures,

    // Normalize
    NormalizeAccepted,
    NormalizeDropped,

    // Dedup
    DedupCollisions,
    DedupSurvivors,

    // Enrichment
    EnrichCacheHits,
    EnrichFetches,
    EnrichSkipped,
    EnrichFailures,

    // State
    StateMerged,
    StatePurged,
    StateTotal,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FetchRequestsSuccess => "nwe_fetch_requests_success_total",
            MetricName::FetchRequestsError => "nwe_fetch_requests_error_total",
            MetricName::FetchRetries => "nwe_fetch_retries_total",
            MetricName::FetchDuration => "nwe_fetch_duration_seconds",
            MetricName::FetchPayloadBytes => "nwe_fetch_payload_bytes",

            MetricName::SourceCandidates => "nwe_source_candidates_total",
            MetricName::SourceFailures => "nwe_source_failures_total",

            MetricName::NormalizeAccepted => "nwe_normalize_accepted_total",
            MetricName::NormalizeDropped => "nwe_normalize_dropped_total",

            MetricName::DedupCollisions => "nwe_dedup_collisions_total",
            MetricName::DedupSurvivors => "nwe_dedup_survivors",

            MetricName::EnrichCacheHits => "nwe_enrich_cache_hits_total",
            MetricName::EnrichFetches => "nwe_enrich_fetches_total",
            MetricName::EnrichSkipped => "nwe_enrich_skipped_total",
            MetricName::EnrichFailures => "nwe_enrich_failures_total",

            MetricName::StateMerged => "nwe_state_merged_total",
            MetricName::StatePurged => "nwe_state_purged_total",
            MetricName::StateTotal => "nwe_state_events",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Install the Prometheus exporter when `NWE_METRICS_PORT` is set.
pub fn init_from_env() {
    let Some(port) = std::env::var("NWE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
    else {
        return;
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}

pub mod fetch {
    use super::MetricName;

    pub fn request_success(host: &str, secs: f64, bytes: usize) {
        ::metrics::counter!(MetricName::FetchRequestsSuccess.as_str(), "host" => host.to_string())
            .increment(1);
        ::metrics::histogram!(MetricName::FetchDuration.as_str()).record(secs);
        ::metrics::histogram!(MetricName::FetchPayloadBytes.as_str()).record(bytes as f64);
    }

    pub fn request_error(host: &str) {
        ::metrics::counter!(MetricName::FetchRequestsError.as_str(), "host" => host.to_string())
            .increment(1);
    }

    pub fn retry(host: &str) {
        ::metrics::counter!(MetricName::FetchRetries.as_str(), "host" => host.to_string())
            .increment(1);
    }
}

pub mod sources {
    use super::MetricName;

    pub fn candidates(source_id: &str, count: usize) {
        ::metrics::counter!(MetricName::SourceCandidates.as_str(), "source_id" => source_id.to_string())
            .increment(count as u64);
    }

    pub fn failure(source_id: &str) {
        ::metrics::counter!(MetricName::SourceFailures.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn accepted(count: usize) {
        ::metrics::counter!(MetricName::NormalizeAccepted.as_str()).increment(count as u64);
    }

    pub fn dropped(reason: &'static str) {
        ::metrics::counter!(MetricName::NormalizeDropped.as_str(), "reason" => reason).increment(1);
    }
}

pub mod dedup {
    use super::MetricName;

    pub fn completed(survivors: usize, collisions: usize) {
        ::metrics::counter!(MetricName::DedupCollisions.as_str()).increment(collisions as u64);
        ::metrics::gauge!(MetricName::DedupSurvivors.as_str()).set(survivors as f64);
    }
}

pub mod enrich {
    use super::MetricName;

    pub fn cache_hit() {
        ::metrics::counter!(MetricName::EnrichCacheHits.as_str()).increment(1);
    }

    pub fn fetched(host: &str) {
        ::metrics::counter!(MetricName::EnrichFetches.as_str(), "host" => host.to_string())
            .increment(1);
    }

    pub fn skipped(reason: &'static str) {
        ::metrics::counter!(MetricName::EnrichSkipped.as_str(), "reason" => reason).increment(1);
    }

    pub fn failure() {
        ::metrics::counter!(MetricName::EnrichFailures.as_str()).increment(1);
    }
}

pub mod state {
    use super::MetricName;

    pub fn merged(count: usize) {
        ::metrics::counter!(MetricName::StateMerged.as_str()).increment(count as u64);
    }

    pub fn purged(count: usize) {
        ::metrics::counter!(MetricName::StatePurged.as_str()).increment(count as u64);
    }

    pub fn total(count: usize) {
        ::metrics::gauge!(MetricName::StateTotal.as_str()).set(count as f64);
    }
}
