//! JSON files that persist across runs.

pub mod enrichment_cache;
pub mod state_store;

pub use enrichment_cache::{EnrichmentCache, EnrichmentCacheEntry};
pub use state_store::{MergeStats, StateStore, StoredEvent};

use crate::common::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Missing file → default. Unparseable file is moved aside to `<name>.corrupt`
/// and the run starts from default.
pub(crate) fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No file yet, starting empty");
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    match serde_json::from_str(&content) {
        Ok(value) => Ok(value),
        Err(e) => {
            let aside = corrupt_path(path);
            warn!(path = %path.display(), error = %e, "Unparseable file, moving to {}", aside.display());
            std::fs::rename(path, &aside)?;
            Ok(T::default())
        }
    }
}

/// Pretty JSON written to a sibling temp file, then renamed into place.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    let tmp = with_suffix(path, "tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Plain write for outputs that are regenerated every run.
pub fn write_text(path: &Path, body: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, body)?;
    Ok(())
}

pub(crate) fn corrupt_path(path: &Path) -> PathBuf {
    with_suffix(path, "corrupt")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let value: BTreeMap<String, u32> = read_json_or_default(&dir.path().join("nope.json")).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "{ not json").unwrap();

        let value: BTreeMap<String, u32> = read_json_or_default(&path).unwrap();
        assert!(value.is_empty());
        assert!(!path.exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("events.json.corrupt")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let mut value = BTreeMap::new();
        value.insert("b".to_string(), 2u32);
        value.insert("a".to_string(), 1u32);

        write_json_atomic(&path, &value).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.find("\"a\"").unwrap() < body.find("\"b\"").unwrap());
        assert!(!dir.path().join("nested").join("cache.json.tmp").exists());
    }
}
