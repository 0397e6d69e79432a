use super::{read_json_or_default, write_json_atomic};
use crate::common::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Fields derived from one detail page. Times are kept as the page stated them
/// and resolved against the owning source's zone when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentCacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Exclusive when date-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl EnrichmentCacheEntry {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.start.is_none() && self.location.is_none()
    }
}

/// URL → derived fields, kept across runs so a URL is fetched at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentCache {
    entries: BTreeMap<String, EnrichmentCacheEntry>,
}

impl EnrichmentCache {
    pub fn load(path: &Path) -> Result<Self> {
        read_json_or_default(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn get(&self, url: &str) -> Option<&EnrichmentCacheEntry> {
        self.entries.get(url)
    }

    pub fn insert(&mut self, url: impl Into<String>, entry: EnrichmentCacheEntry) {
        self.entries.insert(url.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
