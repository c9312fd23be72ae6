//! Index cache with a freshness window.
//!
//! Rebuilding the index walks the whole page tree. Requests arrive in bursts
//! (an admin save triggers a handful of reads), so the built index is
//! persisted together with its build time and reused while it is younger
//! than `index.freshness_secs` (two seconds by default).
//!
//! # Design
//!
//! The window is a debounce, not a consistency guarantee: a writer that
//! changes the tree inside the window is not seen by readers until the window
//! passes or the cache is invalidated. The store invalidates after every
//! mutation that touched the disk; callers that need certainty force a
//! rebuild.
//!
//! ## Storage
//!
//! The cache is a JSON document at `cache://pages/index.json`:
//!
//! ```json
//! { "timestamp": 1718000000, "index": { "": { ... }, "01.home": { ... } } }
//! ```
//!
//! Writes go to an exclusively-created temp file in the same directory which
//! is then renamed over the cache file, so a reader never sees a partial
//! document. An unreadable or corrupt cache file counts as absent.

use crate::index::Index;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("index cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("index cache encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk cache document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedIndex {
    /// Unix seconds at which `index` was built.
    pub timestamp: u64,
    pub index: Index,
}

#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
    freshness_secs: u64,
}

impl IndexCache {
    pub fn new(path: impl Into<PathBuf>, freshness_secs: u64) -> Self {
        Self {
            path: path.into(),
            freshness_secs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache file regardless of age.
    pub fn load(&self) -> Option<CachedIndex> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("index cache read failed for {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(cached) => Some(cached),
            Err(e) => {
                log::warn!("index cache {} is corrupt: {e}", self.path.display());
                None
            }
        }
    }

    /// The cached index if it was built less than the window before `now`.
    pub fn load_fresh(&self, now: u64) -> Option<Index> {
        let cached = self.load()?;
        let age = now.checked_sub(cached.timestamp)?;
        if age < self.freshness_secs {
            log::debug!("index cache hit ({}s old)", age);
            Some(cached.index)
        } else {
            log::debug!("index cache stale ({}s old)", age);
            None
        }
    }

    /// Persist `index` as built at `now`.
    pub fn save(&self, index: &Index, now: u64) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        #[derive(Serialize)]
        struct Borrowed<'a> {
            timestamp: u64,
            index: &'a Index,
        }

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(
                &mut writer,
                &Borrowed {
                    timestamp: now,
                    index,
                },
            )?;
            writer.flush().map_err(io_err)?;
        }
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        log::debug!(
            "wrote index cache to {} ({} folders)",
            self.path.display(),
            index.len()
        );
        Ok(())
    }

    /// Remove the cache file so the next read rebuilds.
    pub fn invalidate(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Current time in unix seconds.
pub fn unix_now() -> u64 {
    crate::scan::unix_secs(Some(SystemTime::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NaturalKey;
    use crate::scan::PageMetadata;
    use tempfile::TempDir;

    fn sample_index() -> Index {
        let mut index = Index::new();
        index.insert(NaturalKey::from(""), PageMetadata::empty(""));
        index.insert(NaturalKey::from("01.home"), PageMetadata::empty("01.home"));
        index
    }

    // =========================================================================
    // Freshness window
    // =========================================================================

    #[test]
    fn fresh_within_window() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("pages/index.json"), 2);
        cache.save(&sample_index(), 1000).unwrap();

        assert!(cache.load_fresh(1000).is_some());
        assert!(cache.load_fresh(1001).is_some());
    }

    #[test]
    fn stale_after_window() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 2);
        cache.save(&sample_index(), 1000).unwrap();

        assert!(cache.load_fresh(1002).is_none());
        // Still readable regardless of age.
        assert_eq!(cache.load().unwrap().timestamp, 1000);
    }

    #[test]
    fn future_timestamp_is_stale() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 2);
        cache.save(&sample_index(), 2000).unwrap();
        assert!(cache.load_fresh(1999).is_none());
    }

    #[test]
    fn zero_window_never_fresh() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 0);
        cache.save(&sample_index(), 1000).unwrap();
        assert!(cache.load_fresh(1000).is_none());
    }

    // =========================================================================
    // Save / load
    // =========================================================================

    #[test]
    fn saved_index_reads_back_in_order() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 60);
        cache.save(&sample_index(), 10).unwrap();

        let loaded = cache.load_fresh(10).unwrap();
        let keys: Vec<&str> = loaded.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["", "01.home"]);
        assert_eq!(loaded, sample_index());
    }

    #[test]
    fn document_shape() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 60);
        cache.save(&sample_index(), 77).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(raw["timestamp"], 77);
        assert!(raw["index"]["01.home"]["checksum"].is_string());
        assert_eq!(raw["index"]["01.home"]["key"], "home");
    }

    #[test]
    fn missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 2);
        assert!(cache.load().is_none());
    }

    #[test]
    fn corrupt_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        fs::write(&path, "not json").unwrap();
        let cache = IndexCache::new(&path, 2);
        assert!(cache.load().is_none());
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 2);
        cache.save(&sample_index(), 1).unwrap();
        cache.save(&sample_index(), 2).unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["index.json"]);
    }

    #[test]
    fn invalidate_removes_file_and_tolerates_absence() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("index.json"), 2);
        cache.save(&sample_index(), 1).unwrap();
        cache.invalidate().unwrap();
        assert!(!cache.path().exists());
        cache.invalidate().unwrap();
    }
}
