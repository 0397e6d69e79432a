use crate::apis::SourceOutcome;
use crate::common::error::{Result, ScraperError};
use crate::common::time::in_zone;
use crate::common::types::RawCandidate;
use crate::config::LoadedConfig;
use crate::infra::http_client::ReqwestHttp;
use crate::infra::rate_limiter::{DomainRateLimiter, Limits};
use crate::observability::metrics;
use crate::pipeline::codec::{encode, EncodeOptions};
use crate::pipeline::ingestion::fetcher::{Fetcher, RetryPolicy};
use crate::pipeline::processing::dedup::deduplicate;
use crate::pipeline::processing::enrich::{retain_complete, Enricher};
use crate::pipeline::processing::normalize::{normalize_candidate, NormalizeContext};
use crate::pipeline::report::{RunReport, SourceReport, Stage};
use crate::pipeline::storage::{write_text, EnrichmentCache, StateStore};
use chrono::{DateTime, FixedOffset, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Where a run reads and writes its files.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub output: PathBuf,
    pub report: PathBuf,
    pub state: PathBuf,
    pub cache: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            output: PathBuf::from("build/events.ics"),
            report: PathBuf::from("build/last_run_report.json"),
            state: PathBuf::from("state/events.json"),
            cache: PathBuf::from("state/enrichment_cache.json"),
        }
    }
}

/// Result of the in-memory part of a run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: RunReport,
    pub calendar: String,
}

pub struct Orchestrator {
    loaded: LoadedConfig,
    fetcher: Fetcher,
}

impl Orchestrator {
    pub fn new(loaded: LoadedConfig, fetcher: Fetcher) -> Self {
        Self { loaded, fetcher }
    }

    /// Production wiring: reqwest client behind the per-domain limiter.
    pub fn from_config(loaded: LoadedConfig) -> Result<Self> {
        let run = &loaded.config.run;
        let timeout = Duration::from_secs(run.fetch_timeout_secs.max(1));
        let http = ReqwestHttp::new(&run.user_agent, timeout)
            .map_err(|e| ScraperError::Config(e.to_string()))?;
        let limiter = DomainRateLimiter::new(Limits {
            requests_per_min: Some(loaded.config.rate_limit.requests_per_min).filter(|r| *r > 0),
            concurrency: Some(loaded.config.rate_limit.concurrency).filter(|c| *c > 0),
        });
        let policy = RetryPolicy {
            timeout,
            max_retries: run.max_retries,
            backoff: Duration::from_millis(run.retry_backoff_ms),
        };
        let fetcher = Fetcher::new(Arc::new(http), Arc::new(limiter), policy);
        Ok(Self::new(loaded, fetcher))
    }

    pub fn loaded(&self) -> &LoadedConfig {
        &self.loaded
    }

    /// Current time in the run's reference zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        in_zone(&Utc::now(), self.loaded.config.run.zone())
    }

    /// Full run against files on disk. File problems are logged into the report;
    /// the run itself never fails.
    #[instrument(skip_all)]
    pub async fn run(&self, paths: &RunPaths, now: DateTime<FixedOffset>) -> RunReport {
        let mut io_errors = Vec::new();
        let mut state = StateStore::load(&paths.state).unwrap_or_else(|e| {
            io_errors.push(format!("state load {} -> {}", paths.state.display(), e));
            StateStore::default()
        });
        let mut cache = EnrichmentCache::load(&paths.cache).unwrap_or_else(|e| {
            io_errors.push(format!("cache load {} -> {}", paths.cache.display(), e));
            EnrichmentCache::default()
        });

        let RunOutput { mut report, calendar } = self.run_with(&mut state, &mut cache, now).await;
        for line in io_errors {
            warn!("{}", line);
            report.log(line);
        }

        if let Err(e) = state.save(&paths.state) {
            report.log(format!("state save {} -> {}", paths.state.display(), e));
        }
        if let Err(e) = cache.save(&paths.cache) {
            report.log(format!("cache save {} -> {}", paths.cache.display(), e));
        }
        if let Err(e) = write_text(&paths.output, &calendar) {
            error!("Failed to write calendar {}: {}", paths.output.display(), e);
            report.log(format!("calendar write {} -> {}", paths.output.display(), e));
        }
        if let Err(e) = report.save(&paths.report) {
            error!("Failed to write report {}: {}", paths.report.display(), e);
        }
        info!(
            "✅ Run complete: {} raw, {} deduplicated, {} stored, calendar at {}",
            report.total_raw,
            report.total_deduplicated,
            report.state.total,
            paths.output.display()
        );
        report
    }

    /// Every stage against caller-owned state and cache.
    pub async fn run_with(
        &self,
        state: &mut StateStore,
        cache: &mut EnrichmentCache,
        now: DateTime<FixedOffset>,
    ) -> RunOutput {
        let run = &self.loaded.config.run;
        let mut report = RunReport::new(now, &run.timezone, run.log_tail);
        report.rejected_sources = self.loaded.rejected.clone();
        report.config_error = self.loaded.load_error.clone();
        for rejected in &self.loaded.rejected {
            report.log(format!("{}: rejected ({})", rejected.source_id, rejected.reason));
        }
        if self.loaded.sources.is_empty() {
            warn!("No sources configured, producing an empty calendar");
            report.log("no sources configured");
        }

        // FETCH_SOURCES / EXTRACT_CANDIDATES
        let outcomes = self.collect_sources().await;
        report.complete(Stage::FetchSources);
        let mut candidates: Vec<(usize, RawCandidate)> = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            let source = &self.loaded.sources[index];
            let id = source.config.source_id.clone();
            metrics::sources::candidates(&id, outcome.candidates.len());
            if outcome.failures > 0 {
                metrics::sources::failure(&id);
            }
            report.per_source.insert(
                id,
                SourceReport {
                    kind: source.adapter.kind().to_string(),
                    candidates: outcome.candidates.len(),
                    failures: outcome.failures,
                },
            );
            for line in outcome.log {
                report.log(line);
            }
            candidates.extend(outcome.candidates.into_iter().map(|c| (index, c)));
        }
        report.total_raw = candidates.len();
        report.complete(Stage::ExtractCandidates);

        // NORMALIZE
        let allow_list = self.loaded.enrichment_allow_list();
        let mut normalized = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates {
            let source = &self.loaded.sources[index];
            let ctx = NormalizeContext {
                source,
                now,
                enrich_allowed: allow_list.contains(&source.config.source_id),
            };
            let title = candidate.title.clone();
            match normalize_candidate(candidate, &ctx) {
                Ok(event) => normalized.push(event),
                Err(failure) => {
                    metrics::normalize::dropped(failure.reason());
                    report.record_drop(failure.reason());
                    report.log(format!("{}: dropped {:?} ({})", source.config.source_id, title, failure.reason()));
                }
            }
        }
        metrics::normalize::accepted(normalized.len());
        report.total_normalized = normalized.len();
        report.complete(Stage::Normalize);

        // DEDUPLICATE
        let deduped = deduplicate(normalized);
        report.collisions = deduped.collisions;
        let mut events = deduped.events;
        report.complete(Stage::Deduplicate);

        // ENRICH
        let enricher = Enricher::new(
            &self.fetcher,
            &self.loaded.config.enrichment,
            &self.loaded.sources,
            &allow_list,
            now,
        );
        report.enrichment = enricher.enrich(&mut events, cache).await;
        let (events, dropped) = retain_complete(events);
        for failure in dropped {
            metrics::normalize::dropped(failure.reason());
            report.record_drop(failure.reason());
        }
        // Enrichment can give pending events a date that now collides.
        let settled = deduplicate(events);
        report.collisions += settled.collisions;
        report.total_deduplicated = settled.events.len();
        metrics::dedup::completed(report.total_deduplicated, report.collisions);
        report.complete(Stage::Enrich);

        // MERGE_STATE
        let merge = state.merge(settled.events, now);
        report.state.merged = merge.merged;
        report.state.inserted = merge.inserted;
        metrics::state::merged(merge.merged);
        report.complete(Stage::MergeState);

        // PURGE_EXPIRED
        report.state.purged = state.purge(now, run.zone());
        report.state.total = state.len();
        metrics::state::purged(report.state.purged);
        metrics::state::total(report.state.total);
        report.complete(Stage::PurgeExpired);

        // ENCODE_OUTPUT
        let options = EncodeOptions {
            calendar_name: run.calendar_name.clone(),
            timezone: run.timezone.clone(),
            generated_at: now.with_timezone(&Utc),
        };
        let calendar = encode(&state.to_sorted_list(), &options);
        report.complete(Stage::EncodeOutput);

        report.complete(Stage::Done);
        RunOutput { report, calendar }
    }

    /// One task per source, at most `max_in_flight` at a time. Results come
    /// back in configuration order regardless of completion order.
    async fn collect_sources(&self) -> Vec<SourceOutcome> {
        let permits = Arc::new(Semaphore::new(self.loaded.config.run.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        for (index, source) in self.loaded.sources.iter().cloned().enumerate() {
            let fetcher = self.fetcher.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let outcome = source.adapter.collect(&source, &fetcher).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<SourceOutcome>> = vec![None; self.loaded.sources.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("Source task failed to complete: {}", e),
            }
        }
        slots
            .into_iter()
            .zip(&self.loaded.sources)
            .map(|(slot, source)| {
                slot.unwrap_or_else(|| {
                    let mut outcome = SourceOutcome::default();
                    outcome.failure(&source.config.source_id, "source task aborted");
                    outcome
                })
            })
            .collect()
    }
}
