//! Logical → physical path resolution.
//!
//! The store never joins paths onto a hard-coded root. It asks a [`Locator`]
//! for `page://<storage key>` or `cache://<file>` and works with whatever
//! physical path comes back. [`FsLocator`] is the filesystem implementation:
//! each stream name maps to a base directory, and resolutions are memoized
//! until [`Locator::clear_cache`] is called (the store does this after every
//! structural change).

use crate::config::StoreConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Stream holding the page tree.
pub const PAGE_STREAM: &str = "page";
/// Stream holding the index cache.
pub const CACHE_STREAM: &str = "cache";

/// Logical location of a storage key in the page stream.
pub fn page_location(storage_key: &str) -> String {
    format!("{PAGE_STREAM}://{storage_key}")
}

/// Resolves logical `stream://path` locations to physical paths.
pub trait Locator: Send + Sync {
    /// Physical path for `logical`, or `None` when the stream is unknown.
    fn resolve(&self, logical: &str) -> Option<PathBuf>;

    /// Drop any memoized resolutions.
    fn clear_cache(&self);
}

/// Filesystem locator: stream name → base directory.
#[derive(Debug, Default)]
pub struct FsLocator {
    streams: HashMap<String, PathBuf>,
    resolved: Mutex<HashMap<String, PathBuf>>,
}

impl FsLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locator for a site root laid out as `config` describes.
    pub fn for_site(site_root: &Path, config: &StoreConfig) -> Self {
        Self::new()
            .with_stream(PAGE_STREAM, site_root.join(&config.data_root))
            .with_stream(CACHE_STREAM, site_root.join(&config.cache_dir))
    }

    pub fn with_stream(mut self, name: &str, base: impl Into<PathBuf>) -> Self {
        self.streams.insert(name.to_string(), base.into());
        self
    }

    /// Number of memoized resolutions.
    pub fn cached_len(&self) -> usize {
        self.resolved.lock().map(|m| m.len()).unwrap_or_default()
    }
}

impl Locator for FsLocator {
    fn resolve(&self, logical: &str) -> Option<PathBuf> {
        if let Ok(memo) = self.resolved.lock()
            && let Some(path) = memo.get(logical)
        {
            return Some(path.clone());
        }

        let (stream, rest) = logical.split_once("://")?;
        let base = self.streams.get(stream)?;
        let rest = rest.trim_matches('/');
        let path = if rest.is_empty() {
            base.clone()
        } else {
            base.join(rest)
        };

        if let Ok(mut memo) = self.resolved.lock() {
            memo.insert(logical.to_string(), path.clone());
        }
        Some(path)
    }

    fn clear_cache(&self) {
        if let Ok(mut memo) = self.resolved.lock() {
            memo.clear();
        }
    }
}

/// Everything a store needs from its surroundings: a config snapshot and a
/// path resolver. Passed explicitly, never looked up globally.
#[derive(Clone)]
pub struct Context {
    pub config: StoreConfig,
    pub locator: Arc<dyn Locator>,
}

impl Context {
    pub fn new(config: StoreConfig, locator: Arc<dyn Locator>) -> Self {
        Self { config, locator }
    }

    /// Context for a site root, using its `pagetree.toml` (or defaults).
    pub fn for_site(site_root: &Path, config: StoreConfig) -> Self {
        let locator = FsLocator::for_site(site_root, &config);
        Self::new(config, Arc::new(locator))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
