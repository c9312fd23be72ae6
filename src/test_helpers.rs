//! Shared test utilities for the pagetree test suite.
//!
//! Builds small page trees in temp directories with pinned mtimes, so
//! timestamp and checksum assertions are deterministic.
//!
//! # Standard site
//!
//! ```text
//! pages/
//! ├── 01.home/default.md            mtime 1000
//! ├── 02.blog/blog.md               mtime 1100
//! │   ├── 01.post-a/item.md         mtime 1200
//! │   ├── 01.post-a/item.fr.md      mtime 1300
//! │   ├── 02.post-b/item.md         mtime 1250
//! │   └── _hero/hero.md             mtime 1400
//! ├── 03.about/default.md           mtime 1050
//! └── .git/config                   (ignored)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tempfile::TempDir;

use crate::config::StoreConfig;
use crate::locator::{Context, FsLocator};
use crate::store::PageStore;

/// Write `content` to `dir/rel` (creating parents) and pin its mtime.
pub fn write_file(dir: &Path, rel: &str, content: &str, mtime: u64) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    set_mtime(&path, mtime);
    path
}

/// Set a file's modification time to `secs` after the epoch.
pub fn set_mtime(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// Modification time of a file in whole seconds.
pub fn mtime_of(path: &Path) -> u64 {
    fs::metadata(path)
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn pages_dir(tmp: &TempDir) -> PathBuf {
    tmp.path().join("pages")
}

/// Build the standard site (see module docs) in a fresh temp dir.
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let pages = pages_dir(&tmp);
    write_file(&pages, "01.home/default.md", "# Home\n", 1000);
    write_file(&pages, "02.blog/blog.md", "# Blog\n", 1100);
    write_file(&pages, "02.blog/01.post-a/item.md", "# Post A\n", 1200);
    write_file(&pages, "02.blog/01.post-a/item.fr.md", "# Article A\n", 1300);
    write_file(&pages, "02.blog/02.post-b/item.md", "# Post B\n", 1250);
    write_file(&pages, "02.blog/_hero/hero.md", "# Hero\n", 1400);
    write_file(&pages, "03.about/default.md", "# About\n", 1050);
    write_file(&pages, ".git/config", "[core]\n", 1500);
    tmp
}

/// Store over `tmp` with the default config.
pub fn store_for(tmp: &TempDir) -> PageStore {
    store_with(tmp, StoreConfig::default())
}

/// Store over `tmp` with a custom config.
pub fn store_with(tmp: &TempDir, config: StoreConfig) -> PageStore {
    let locator = FsLocator::for_site(tmp.path(), &config);
    PageStore::new(Context::new(config, Arc::new(locator)))
}
