use crate::common::error::Result;
use crate::config::RejectedSource;
use crate::pipeline::processing::enrich::EnrichmentStats;
use crate::pipeline::storage::write_json_atomic;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::Path;

/// Run state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    FetchSources,
    ExtractCandidates,
    Normalize,
    Deduplicate,
    Enrich,
    MergeState,
    PurgeExpired,
    EncodeOutput,
    Done,
}

impl Stage {
    pub const ORDER: [Stage; 9] = [
        Stage::FetchSources,
        Stage::ExtractCandidates,
        Stage::Normalize,
        Stage::Deduplicate,
        Stage::Enrich,
        Stage::MergeState,
        Stage::PurgeExpired,
        Stage::EncodeOutput,
        Stage::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchSources => "FETCH_SOURCES",
            Stage::ExtractCandidates => "EXTRACT_CANDIDATES",
            Stage::Normalize => "NORMALIZE",
            Stage::Deduplicate => "DEDUPLICATE",
            Stage::Enrich => "ENRICH",
            Stage::MergeState => "MERGE_STATE",
            Stage::PurgeExpired => "PURGE_EXPIRED",
            Stage::EncodeOutput => "ENCODE_OUTPUT",
            Stage::Done => "DONE",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub kind: String,
    pub candidates: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateReport {
    pub merged: usize,
    pub inserted: usize,
    pub purged: usize,
    pub total: usize,
}

/// Diagnostic summary written next to the calendar after every run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_timestamp: DateTime<FixedOffset>,
    pub timezone: String,
    pub stages: Vec<Stage>,
    pub per_source: BTreeMap<String, SourceReport>,
    pub rejected_sources: Vec<RejectedSource>,
    pub total_raw: usize,
    pub total_normalized: usize,
    pub total_deduplicated: usize,
    pub collisions: usize,
    pub dropped: BTreeMap<String, usize>,
    pub enrichment: EnrichmentStats,
    pub state: StateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_error: Option<String>,
    pub log_tail: VecDeque<String>,
    #[serde(skip)]
    log_capacity: usize,
}

impl RunReport {
    pub fn new(run_timestamp: DateTime<FixedOffset>, timezone: &str, log_capacity: usize) -> Self {
        Self {
            run_timestamp,
            timezone: timezone.to_string(),
            stages: Vec::new(),
            per_source: BTreeMap::new(),
            rejected_sources: Vec::new(),
            total_raw: 0,
            total_normalized: 0,
            total_deduplicated: 0,
            collisions: 0,
            dropped: BTreeMap::new(),
            enrichment: EnrichmentStats::default(),
            state: StateReport::default(),
            config_error: None,
            log_tail: VecDeque::new(),
            log_capacity,
        }
    }

    pub fn complete(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn last_stage(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    /// Oldest lines fall off once the tail is full.
    pub fn log(&mut self, line: impl Into<String>) {
        if self.log_capacity == 0 {
            return;
        }
        while self.log_tail.len() >= self.log_capacity {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(line.into());
    }

    pub fn record_drop(&mut self, reason: &str) {
        *self.dropped.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}
