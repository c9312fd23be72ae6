//! Record storage: reads, saves and structural changes.
//!
//! [`Storage`] maps storage keys to folders and content files; its default
//! methods are all a folder-backed store needs. [`PageStore`] adds page
//! semantics on top: frontmatter records, move/copy/rename on save, language
//! variants, sibling ordering and the cached index.
//!
//! ## Saving
//!
//! A record loaded from `old` and saved under `new` goes through:
//!
//! 1. Folder change (`old` folder ≠ `new` folder): move the folder, or copy it
//!    when the record is flagged `copy`. Moving or copying a folder into its
//!    own subtree is rejected before anything touches the disk.
//! 2. Filename change (template or language differs): rename the content file
//!    inside the relocated folder, unless the record is flagged `clone`, in
//!    which case the new file is written next to the old one.
//! 3. Write the rendered content, but only if the bytes differ from what is
//!    already on disk, so unchanged saves keep their mtime and the index
//!    cache.
//!
//! Steps are not rolled back: a failed rename after a successful folder move
//! leaves the folder moved. Re-read metadata after an error.
//!
//! Saves are not coordinated between processes; two writers on the same
//! folder race.

use crate::cache::{CacheError, IndexCache, unix_now};
use crate::config::{self, ConfigError, StoreConfig};
use crate::index::{Index, IndexBuilder, IndexError};
use crate::locator::{self, CACHE_STREAM, Context};
use crate::naming::{KeyError, StorageKey};
use crate::record::{self, Frontmatter, PageRecord};
use crate::scan::{CONTENT_EXTENSION, PageMetadata, ScanError, Scanner};
use std::fs;
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Order given to ordered siblings missing from an explicit ordering.
pub const LARGE_ORDER: u32 = 999_999;

/// Template used when a folder has no content file to derive one from.
pub const DEFAULT_TEMPLATE: &str = "folder";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("nothing stored at '{0}'")]
    PathNotFound(String),
    #[error("cannot move '{key}' into itself: {to} is inside {from}")]
    SelfReferentialMove {
        key: String,
        from: PathBuf,
        to: PathBuf,
    },
    #[error("{op} '{key}': rename {from} -> {to} failed: {source}")]
    RenameFailed {
        key: String,
        op: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("copy '{key}': {from} -> {to} failed: {source}")]
    CopyFailed {
        key: String,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("delete '{key}': {path} failed: {source}")]
    DeleteFailed {
        key: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    MalformedKey(#[from] KeyError),
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("write of '{key}' to {path} did not persist the requested content")]
    StorageConsistency { key: String, path: PathBuf },
    #[error("frontmatter of '{key}': {source}")]
    Frontmatter {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{op} '{key}': {path}: {source}")]
    Io {
        key: String,
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("scan '{key}': {source}")]
    Scan {
        key: String,
        #[source]
        source: ScanError,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result of a save: the key the record now lives under and its folder's
/// freshly scanned metadata.
#[derive(Debug, Clone)]
pub struct SavedRecord {
    pub storage_key: String,
    pub metadata: PageMetadata,
}

/// Generic folder-backed key → path mapping.
pub trait Storage {
    fn context(&self) -> &Context;

    fn parse_key(&self, key: &str) -> Result<StorageKey, StoreError> {
        Ok(StorageKey::parse(key)?)
    }

    /// Physical folder of a record.
    fn build_folder(&self, keys: &StorageKey) -> Result<PathBuf, StoreError> {
        let key = keys.to_key(false);
        self.context()
            .locator
            .resolve(&locator::page_location(&key))
            .ok_or(StoreError::PathNotFound(key))
    }

    /// Scan the record's folder.
    fn load_metadata(&self, keys: &StorageKey) -> Result<PageMetadata, StoreError> {
        let folder = self.build_folder(keys)?;
        let key = keys.to_key(false);
        Scanner::new(&self.context().config)
            .scan(&folder, &key)
            .map_err(|source| StoreError::Scan { key, source })
    }

    /// `.md`, `.<lang>.md`, or `.<default>.md` when the default language
    /// extension is configured.
    fn file_extension(&self, lang: &str) -> String {
        let languages = &self.context().config.languages;
        if !lang.is_empty() {
            format!(".{lang}{CONTENT_EXTENSION}")
        } else if languages.include_default_lang_file_extension && !languages.default.is_empty()
        {
            format!(".{}{CONTENT_EXTENSION}", languages.default)
        } else {
            CONTENT_EXTENSION.to_string()
        }
    }

    /// The key's template, else the folder's, else [`DEFAULT_TEMPLATE`].
    fn resolve_template(&self, keys: &StorageKey) -> Result<String, StoreError> {
        if !keys.template.is_empty() {
            return Ok(keys.template.clone());
        }
        Ok(self
            .load_metadata(keys)?
            .template
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()))
    }

    fn build_filename(&self, keys: &StorageKey) -> Result<String, StoreError> {
        Ok(format!(
            "{}{}",
            self.resolve_template(keys)?,
            self.file_extension(&keys.lang)
        ))
    }

    fn build_path(&self, keys: &StorageKey) -> Result<PathBuf, StoreError> {
        Ok(self.build_folder(keys)?.join(self.build_filename(keys)?))
    }
}

/// Page records over a folder tree.
#[derive(Debug, Clone)]
pub struct PageStore {
    context: Context,
}

impl Storage for PageStore {
    fn context(&self) -> &Context {
        &self.context
    }
}

impl PageStore {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Store for a site root, configured by its `pagetree.toml`.
    pub fn open(site_root: &Path) -> Result<Self, ConfigError> {
        let config = config::load_config(site_root)?;
        Ok(Self::new(Context::for_site(site_root, config)))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.context.config
    }

    /// Metadata of the folder behind `key`.
    pub fn metadata(&self, key: &str) -> Result<PageMetadata, StoreError> {
        self.load_metadata(&self.parse_key(key)?)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Raw bytes of the content file behind `key`.
    pub fn read_raw(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        Ok(self.read_content(key)?.1)
    }

    /// Content file behind `key`, split into header and body.
    pub fn read_frontmatter(&self, key: &str) -> Result<Frontmatter, StoreError> {
        let (path, raw) = self.read_content(key)?;
        let text = String::from_utf8(raw).map_err(|e| StoreError::Io {
            key: key.to_string(),
            op: "read",
            path,
            source: io::Error::new(ErrorKind::InvalidData, e),
        })?;
        record::parse_frontmatter(&text).map_err(|source| StoreError::Frontmatter {
            key: key.to_string(),
            source,
        })
    }

    /// Resolved content path and bytes.
    fn read_content(&self, key: &str) -> Result<(PathBuf, Vec<u8>), StoreError> {
        let keys = self.parse_key(key)?;
        let path = self.build_path(&keys)?;
        match read_file(&path) {
            Ok(bytes) => Ok((path, bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::PathNotFound(key.to_string()))
            }
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                op: "read",
                path,
                source,
            }),
        }
    }

    /// Load a record, with its template resolved, ready to modify and save.
    pub fn load(&self, key: &str) -> Result<PageRecord, StoreError> {
        let mut keys = self.parse_key(key)?;
        keys.template = self.resolve_template(&keys)?;
        let frontmatter = self.read_frontmatter(&keys.to_key(true))?;
        let original = keys.to_key(true);
        Ok(PageRecord::loaded(keys, original, frontmatter))
    }

    /// Whether `key` is backed by the filesystem.
    ///
    /// Without params, the folder must exist. With params, the folder must
    /// hold that template/language variant, or have children (folder-only
    /// pages exist for any template).
    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let keys = self.parse_key(key)?;
        let folder = self.build_folder(&keys)?;
        if !folder.is_dir() {
            return Ok(false);
        }
        if !keys.has_params() {
            return Ok(true);
        }
        let meta = self.load_metadata(&keys)?;
        let template = match keys.template.as_str() {
            "" => meta
                .template
                .clone()
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            t => t.to_string(),
        };
        Ok(meta.has_variant(&template, &keys.lang))
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Save a record, moving/copying/renaming as its keys require.
    pub fn save(&self, record: &PageRecord) -> Result<SavedRecord, StoreError> {
        let key = record.storage_key();
        let old_keys = record
            .original_key
            .as_deref()
            .map(|k| self.parse_key(k))
            .transpose()?;

        let mut new_keys = record.key.clone();
        if new_keys.template.is_empty() {
            new_keys.template = match &old_keys {
                Some(old) => self.resolve_template(old)?,
                None => self.resolve_template(&new_keys)?,
            };
        }
        let new_folder = self.build_folder(&new_keys)?;
        let new_filename = self.build_filename(&new_keys)?;
        let mut changed = false;

        if let Some(old_keys) = &old_keys {
            let old_folder = self.build_folder(old_keys)?;
            let old_filename = self.build_filename(old_keys)?;

            if old_folder != new_folder {
                if new_folder.starts_with(&old_folder) {
                    return Err(StoreError::SelfReferentialMove {
                        key,
                        from: old_folder,
                        to: new_folder,
                    });
                }
                if old_folder.is_dir() {
                    self.relocate_folder(&key, &old_folder, &new_folder, record.copy)?;
                    changed = true;
                }
            }

            if old_filename != new_filename && !record.clone {
                let from = new_folder.join(&old_filename);
                let to = new_folder.join(&new_filename);
                if from.is_file() {
                    rename_exclusive(&key, "rename file", &from, &to)?;
                    log::info!("renamed '{key}' content {old_filename} -> {new_filename}");
                    changed = true;
                }
            }
        }

        let path = new_folder.join(&new_filename);
        let content = record.render().map_err(|source| StoreError::Frontmatter {
            key: key.clone(),
            source,
        })?;
        let io_err = |op: &'static str, path: &Path| {
            let key = key.clone();
            let path = path.to_path_buf();
            move |source| StoreError::Io {
                key,
                op,
                path,
                source,
            }
        };

        let existing = match read_file(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(io_err("read", &path)(e)),
        };
        if existing.as_deref() == Some(content.as_bytes()) {
            log::debug!("'{key}' unchanged, skipping write");
        } else {
            fs::create_dir_all(&new_folder).map_err(io_err("create folder", &new_folder))?;
            fs::write(&path, content.as_bytes()).map_err(io_err("write", &path))?;
            let written = read_file(&path).map_err(io_err("verify", &path))?;
            if written != content.as_bytes() {
                return Err(StoreError::StorageConsistency { key, path });
            }
            log::debug!("wrote '{key}' to {}", path.display());
            changed = true;
        }

        self.context.locator.clear_cache();
        if changed {
            self.index_cache()?.invalidate()?;
        }

        Ok(SavedRecord {
            storage_key: new_keys.to_key(true),
            metadata: self.load_metadata(&new_keys)?,
        })
    }

    /// Save a record that must not exist yet.
    pub fn create(&self, record: &PageRecord) -> Result<SavedRecord, StoreError> {
        let key = record.storage_key();
        let probe = if record.key.has_params() {
            key.clone()
        } else {
            record.key.to_key(false)
        };
        if self.exists(&probe)? {
            return Err(StoreError::AlreadyExists(key));
        }
        let mut fresh = record.clone();
        fresh.original_key = None;
        self.save(&fresh)
    }

    /// Whether deleting `key` may remove its whole folder.
    ///
    /// Always for keys without a language; for a language variant only once
    /// no content file of any language is left.
    pub fn can_delete_folder(&self, key: &str) -> Result<bool, StoreError> {
        let keys = self.parse_key(key)?;
        if keys.lang.is_empty() {
            return Ok(true);
        }
        Ok(!self.load_metadata(&keys.without_params())?.has_content())
    }

    /// Delete the content file behind `key`, and its folder when
    /// [`can_delete_folder`](Self::can_delete_folder) allows.
    ///
    /// A key with params must name an existing content file; nothing is
    /// removed otherwise.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let keys = self.parse_key(key)?;
        let folder = self.build_folder(&keys)?;
        if !folder.is_dir() {
            return Err(StoreError::PathNotFound(key.to_string()));
        }

        if keys.has_params() {
            let path = self.build_path(&keys)?;
            match fs::remove_file(&path) {
                Ok(()) => log::info!("deleted {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::PathNotFound(key.to_string()));
                }
                Err(source) => {
                    return Err(StoreError::DeleteFailed {
                        key: key.to_string(),
                        path,
                        source,
                    });
                }
            }
        }

        if self.can_delete_folder(key)? {
            fs::remove_dir_all(&folder).map_err(|source| StoreError::DeleteFailed {
                key: key.to_string(),
                path: folder.clone(),
                source,
            })?;
            log::info!("deleted folder {}", folder.display());
        }

        self.context.locator.clear_cache();
        self.index_cache()?.invalidate()?;
        Ok(())
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Renumber the siblings of `record` to follow `ordering` (a list of
    /// folder slugs).
    ///
    /// The record itself is skipped; its new order is set on `record` for the
    /// caller to save. Ordered siblings missing from the list move to
    /// [`LARGE_ORDER`]; unordered ones missing from it are left alone.
    /// Returns the new keys of the siblings that were renamed.
    pub fn reorder_siblings(
        &self,
        record: &mut PageRecord,
        ordering: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let position = |slug: &str| {
            ordering
                .iter()
                .position(|s| s == slug)
                .and_then(|i| u32::try_from(i + 1).ok())
        };
        if let Some(order) = position(&record.key.folder) {
            record.key.order = Some(order);
        }

        let parent = self.parse_key(&record.key.parent_key)?;
        let siblings = self.load_metadata(&parent)?.child_keys();
        let mut renamed = Vec::new();
        for (sibling, _) in siblings {
            if sibling.folder == record.key.folder {
                continue;
            }
            let order = match (position(&sibling.folder), sibling.order) {
                (Some(order), _) => order,
                (None, Some(_)) => LARGE_ORDER,
                (None, None) => continue,
            };
            if sibling.order == Some(order) {
                continue;
            }
            let mut target = sibling.clone();
            target.order = Some(order);
            self.move_folder(&sibling, &target)?;
            renamed.push(target.to_key(false));
        }
        Ok(renamed)
    }

    /// Reorder `key` and its siblings, renaming the folders on disk.
    /// Returns the record's new storage key.
    pub fn reorder(&self, key: &str, ordering: &[String]) -> Result<String, StoreError> {
        let keys = self.parse_key(key)?.without_params();
        if !self.build_folder(&keys)?.is_dir() {
            return Err(StoreError::PathNotFound(key.to_string()));
        }
        let mut record = PageRecord::new(keys.clone());
        record.original_key = Some(keys.to_key(false));
        self.reorder_siblings(&mut record, ordering)?;
        if record.key != keys {
            self.move_folder(&keys, &record.key)?;
        }
        Ok(record.key.to_key(false))
    }

    /// Rename a record's folder without touching its content.
    fn move_folder(&self, from: &StorageKey, to: &StorageKey) -> Result<(), StoreError> {
        let key = from.to_key(false);
        let old_folder = self.build_folder(from)?;
        let new_folder = self.build_folder(to)?;
        if new_folder.starts_with(&old_folder) {
            return Err(StoreError::SelfReferentialMove {
                key,
                from: old_folder,
                to: new_folder,
            });
        }
        self.relocate_folder(&key, &old_folder, &new_folder, false)?;
        self.context.locator.clear_cache();
        self.index_cache()?.invalidate()?;
        Ok(())
    }

    fn relocate_folder(
        &self,
        key: &str,
        from: &Path,
        to: &Path,
        copy: bool,
    ) -> Result<(), StoreError> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                key: key.to_string(),
                op: "create folder",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        if copy {
            if to.exists() {
                return Err(StoreError::CopyFailed {
                    key: key.to_string(),
                    from: from.to_path_buf(),
                    to: to.to_path_buf(),
                    source: io::Error::from(ErrorKind::AlreadyExists),
                });
            }
            copy_dir_recursive(from, to).map_err(|source| StoreError::CopyFailed {
                key: key.to_string(),
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })?;
            log::info!("copied '{key}' {} -> {}", from.display(), to.display());
        } else {
            rename_exclusive(key, "move", from, to)?;
            log::info!("moved '{key}' {} -> {}", from.display(), to.display());
        }
        Ok(())
    }

    // =========================================================================
    // Index
    // =========================================================================

    fn index_cache(&self) -> Result<IndexCache, StoreError> {
        let logical = format!("{CACHE_STREAM}://{}", self.config().index.file);
        let path = self
            .context
            .locator
            .resolve(&logical)
            .ok_or(StoreError::PathNotFound(logical))?;
        Ok(IndexCache::new(path, self.config().index.freshness_secs))
    }

    /// The full index: cached if fresh (and not `force`d), rebuilt otherwise.
    pub fn index(&self, force: bool) -> Result<Index, StoreError> {
        let cache = self.index_cache()?;
        let now = unix_now();
        if !force && let Some(index) = cache.load_fresh(now) {
            return Ok(index);
        }
        let scanner = Scanner::new(self.config());
        let index = IndexBuilder::new(scanner, self.context.locator.as_ref()).build()?;
        cache.save(&index, now)?;
        log::info!("rebuilt page index ({} folders)", index.len());
        Ok(index)
    }

    /// Every storage key in the index, in natural order.
    pub fn existing_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .index(false)?
            .into_keys()
            .map(|k| k.into_string())
            .collect())
    }
}

/// Read a whole file; the handle is closed on every path out.
fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Rename that refuses to overwrite an existing target.
fn rename_exclusive(key: &str, op: &'static str, from: &Path, to: &Path) -> Result<(), StoreError> {
    let failed = |source| StoreError::RenameFailed {
        key: key.to_string(),
        op,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if to.exists() {
        return Err(failed(io::Error::from(ErrorKind::AlreadyExists)));
    }
    fs::rename(from, to).map_err(failed)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NaturalKey;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn list(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    // =========================================================================
    // Key → path mapping
    // =========================================================================

    #[test]
    fn filename_resolves_template_from_folder() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let keys = StorageKey::parse("02.blog/01.post-a").unwrap();
        assert_eq!(store.build_filename(&keys).unwrap(), "item.md");
        let fr = StorageKey::parse("02.blog/01.post-a|.fr").unwrap();
        assert_eq!(store.build_filename(&fr).unwrap(), "item.fr.md");
    }

    #[test]
    fn filename_defaults_to_folder_template() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let keys = StorageKey::parse("04.new").unwrap();
        assert_eq!(store.build_filename(&keys).unwrap(), "folder.md");
    }

    #[test]
    fn sole_language_file_resolves_without_suffix() {
        let tmp = TempDir::new().unwrap();
        write_file(&pages_dir(&tmp), "intro/page.en.md", "x", 10);
        let store = store_for(&tmp);
        let keys = StorageKey::parse("intro").unwrap();
        assert_eq!(store.resolve_template(&keys).unwrap(), "page");
        assert_eq!(store.build_filename(&keys).unwrap(), "page.md");
    }

    #[test]
    fn default_lang_extension_when_configured() {
        let tmp = TempDir::new().unwrap();
        write_file(&pages_dir(&tmp), "intro/page.en.md", "x", 10);
        let mut config = StoreConfig::default();
        config.languages.default = "en".into();
        config.languages.include_default_lang_file_extension = true;
        let store = store_with(&tmp, config);
        let keys = StorageKey::parse("intro").unwrap();
        assert_eq!(store.build_filename(&keys).unwrap(), "page.en.md");
        assert_eq!(store.read_raw("intro").unwrap(), b"x");
    }

    // =========================================================================
    // Reading
    // =========================================================================

    #[test]
    fn read_raw_default_and_language() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        assert_eq!(store.read_raw("02.blog/01.post-a").unwrap(), b"# Post A\n");
        assert_eq!(
            store.read_raw("02.blog/01.post-a|item.fr").unwrap(),
            b"# Article A\n"
        );
    }

    #[test]
    fn read_raw_missing_is_path_not_found() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        assert!(matches!(
            store.read_raw("02.blog/99.nope"),
            Err(StoreError::PathNotFound(_))
        ));
        assert!(matches!(
            store.read_raw("02.blog/01.post-a|item.de"),
            Err(StoreError::PathNotFound(_))
        ));
    }

    #[test]
    fn read_raw_malformed_key() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        assert!(matches!(
            store.read_raw("02.blog//x"),
            Err(StoreError::MalformedKey(_))
        ));
    }

    #[test]
    fn read_frontmatter_splits_header() {
        let tmp = setup_site();
        write_file(
            &pages_dir(&tmp),
            "03.about/default.md",
            "---\ntitle: About us\n---\n# About\n",
            1050,
        );
        let store = store_for(&tmp);
        let fm = store.read_frontmatter("03.about").unwrap();
        assert_eq!(
            fm.header.get("title").and_then(|v| v.as_str()),
            Some("About us")
        );
        assert_eq!(fm.body, "# About\n");
    }

    #[test]
    fn invalid_utf8_reports_content_path() {
        let tmp = setup_site();
        let path = pages_dir(&tmp).join("03.about/default.md");
        fs::write(&path, [0xff, 0xfe, b'x']).unwrap();
        let store = store_for(&tmp);

        match store.read_frontmatter("03.about") {
            Err(StoreError::Io { path: reported, op, .. }) => {
                assert_eq!(op, "read");
                assert_eq!(reported, path);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn load_fills_template() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let record = store.load("02.blog/01.post-a").unwrap();
        assert_eq!(record.key.template, "item");
        assert_eq!(record.original_key.as_deref(), Some("02.blog/01.post-a|item"));
        assert_eq!(record.body, "# Post A\n");
    }

    #[test]
    fn exists_rules() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        assert!(store.exists("02.blog").unwrap());
        assert!(!store.exists("02.blog/99.nope").unwrap());
        assert!(store.exists("02.blog/01.post-a|item.fr").unwrap());
        assert!(!store.exists("02.blog/01.post-a|item.de").unwrap());
        // Folder with children exists for any template.
        assert!(store.exists("02.blog|anything").unwrap());
    }

    // =========================================================================
    // Saving
    // =========================================================================

    #[test]
    fn save_new_record_creates_folder_and_file() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let record = PageRecord::new(StorageKey::parse("02.blog/03.post-c|item").unwrap())
            .with_body("# Post C\n");
        let saved = store.save(&record).unwrap();
        assert_eq!(saved.storage_key, "02.blog/03.post-c|item");
        assert_eq!(saved.metadata.template.as_deref(), Some("item"));
        assert_eq!(
            fs::read_to_string(pages_dir(&tmp).join("02.blog/03.post-c/item.md")).unwrap(),
            "# Post C\n"
        );
    }

    #[test]
    fn save_twice_keeps_bytes_and_mtime() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let path = pages_dir(&tmp).join("02.blog/01.post-a/item.md");

        let record = store.load("02.blog/01.post-a").unwrap();
        store.save(&record).unwrap();
        store.save(&record).unwrap();

        assert_eq!(mtime_of(&path), 1200);
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Post A\n");
    }

    #[test]
    fn save_changed_body_writes() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let record = store
            .load("02.blog/01.post-a")
            .unwrap()
            .with_body("# Post A, edited\n");
        store.save(&record).unwrap();
        assert_eq!(
            fs::read_to_string(pages_dir(&tmp).join("02.blog/01.post-a/item.md")).unwrap(),
            "# Post A, edited\n"
        );
    }

    #[test]
    fn save_moves_folder_to_new_parent() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/02.post-b").unwrap();
        record.move_to("03.about");
        let saved = store.save(&record).unwrap();

        assert_eq!(saved.storage_key, "03.about/02.post-b|item");
        assert!(pages_dir(&tmp).join("03.about/02.post-b/item.md").is_file());
        assert!(!pages_dir(&tmp).join("02.blog/02.post-b").exists());
    }

    #[test]
    fn save_copy_keeps_original() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/01.post-a").unwrap().as_copy();
        record.key.folder = "post-a-copy".into();
        record.key.order = Some(5);
        store.save(&record).unwrap();

        let pages = pages_dir(&tmp);
        assert!(pages.join("02.blog/01.post-a/item.md").is_file());
        assert_eq!(
            list(&pages.join("02.blog/05.post-a-copy")),
            vec!["item.fr.md", "item.md"]
        );
    }

    #[test]
    fn save_into_own_subtree_rejected_without_changes() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let before = list(&pages_dir(&tmp).join("02.blog/01.post-a"));

        let mut record = store.load("02.blog/01.post-a").unwrap();
        record.move_to("02.blog/01.post-a/sub");
        let err = store.save(&record).unwrap_err();

        assert!(matches!(err, StoreError::SelfReferentialMove { .. }));
        assert_eq!(list(&pages_dir(&tmp).join("02.blog/01.post-a")), before);
    }

    #[test]
    fn copy_into_own_subtree_rejected() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog").unwrap().as_copy();
        record.move_to("02.blog/01.post-a");
        assert!(matches!(
            store.save(&record),
            Err(StoreError::SelfReferentialMove { .. })
        ));
        assert!(!pages_dir(&tmp).join("02.blog/01.post-a/02.blog").exists());
    }

    #[test]
    fn move_onto_existing_folder_fails() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/02.post-b").unwrap();
        record.key.order = Some(1);
        record.key.folder = "post-a".into();
        assert!(matches!(
            store.save(&record),
            Err(StoreError::RenameFailed { .. })
        ));
        assert!(pages_dir(&tmp).join("02.blog/02.post-b/item.md").is_file());
    }

    #[test]
    fn copy_onto_existing_folder_fails() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/02.post-b").unwrap().as_copy();
        record.key.order = Some(1);
        record.key.folder = "post-a".into();

        assert!(matches!(
            store.save(&record),
            Err(StoreError::CopyFailed { .. })
        ));
        let pages = pages_dir(&tmp);
        assert_eq!(list(&pages.join("02.blog/02.post-b")), vec!["item.md"]);
        assert_eq!(
            list(&pages.join("02.blog/01.post-a")),
            vec!["item.fr.md", "item.md"]
        );
    }

    #[test]
    fn template_change_renames_file() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/02.post-b").unwrap();
        record.key.template = "post".into();
        store.save(&record).unwrap();
        assert_eq!(list(&pages_dir(&tmp).join("02.blog/02.post-b")), vec!["post.md"]);
    }

    #[test]
    fn language_change_renames_file() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/01.post-a|item.fr").unwrap();
        record.key.lang = "de".into();
        store.save(&record).unwrap();
        assert_eq!(
            list(&pages_dir(&tmp).join("02.blog/01.post-a")),
            vec!["item.de.md", "item.md"]
        );
    }

    #[test]
    fn clone_writes_new_variant_beside_old() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/01.post-a|item.fr").unwrap().as_clone();
        record.key.lang = "de".into();
        store.save(&record).unwrap();
        assert_eq!(
            list(&pages_dir(&tmp).join("02.blog/01.post-a")),
            vec!["item.de.md", "item.fr.md", "item.md"]
        );
        assert_eq!(
            store.read_raw("02.blog/01.post-a|item.de").unwrap(),
            b"# Article A\n"
        );
    }

    #[test]
    fn move_and_rename_together() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("01.home").unwrap();
        record.key.folder = "start".into();
        record.key.template = "landing".into();
        let saved = store.save(&record).unwrap();
        assert_eq!(saved.storage_key, "01.start|landing");
        assert_eq!(list(&pages_dir(&tmp).join("01.start")), vec!["landing.md"]);
    }

    #[test]
    fn create_rejects_existing() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let record = PageRecord::new(StorageKey::parse("03.about").unwrap()).with_body("x");
        assert!(matches!(
            store.create(&record),
            Err(StoreError::AlreadyExists(_))
        ));
        let fresh = PageRecord::new(StorageKey::parse("04.contact|form").unwrap()).with_body("x");
        store.create(&fresh).unwrap();
        assert!(pages_dir(&tmp).join("04.contact/form.md").is_file());
    }

    // =========================================================================
    // Deleting
    // =========================================================================

    #[test]
    fn can_delete_folder_rules() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        assert!(store.can_delete_folder("02.blog/01.post-a").unwrap());
        assert!(!store.can_delete_folder("02.blog/01.post-a|item.fr").unwrap());

        let pages = pages_dir(&tmp);
        fs::remove_file(pages.join("02.blog/01.post-a/item.md")).unwrap();
        fs::remove_file(pages.join("02.blog/01.post-a/item.fr.md")).unwrap();
        assert!(store.can_delete_folder("02.blog/01.post-a|item.fr").unwrap());
    }

    #[test]
    fn delete_language_variant_keeps_folder() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        store.delete("02.blog/01.post-a|item.fr").unwrap();
        assert_eq!(list(&pages_dir(&tmp).join("02.blog/01.post-a")), vec!["item.md"]);
    }

    #[test]
    fn delete_last_variant_removes_folder() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        fs::remove_file(pages_dir(&tmp).join("02.blog/01.post-a/item.md")).unwrap();
        store.delete("02.blog/01.post-a|item.fr").unwrap();
        assert!(!pages_dir(&tmp).join("02.blog/01.post-a").exists());
    }

    #[test]
    fn delete_without_lang_removes_folder() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        store.delete("02.blog/02.post-b").unwrap();
        assert!(!pages_dir(&tmp).join("02.blog/02.post-b").exists());
    }

    #[test]
    fn delete_missing_is_path_not_found() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        assert!(matches!(
            store.delete("09.gone"),
            Err(StoreError::PathNotFound(_))
        ));
    }

    #[test]
    fn delete_missing_variant_keeps_folder() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let folder = pages_dir(&tmp).join("02.blog/01.post-a");

        for key in ["02.blog/01.post-a|other", "02.blog/01.post-a|item.de"] {
            assert!(matches!(
                store.delete(key),
                Err(StoreError::PathNotFound(_))
            ));
        }
        assert_eq!(list(&folder), vec!["item.fr.md", "item.md"]);
    }

    #[test]
    fn delete_failure_reports_content_path() {
        let tmp = setup_site();
        let folder = pages_dir(&tmp).join("02.blog/01.post-a");
        fs::create_dir(folder.join("item.de.md")).unwrap();
        let store = store_for(&tmp);

        match store.delete("02.blog/01.post-a|item.de") {
            Err(StoreError::DeleteFailed { path, .. }) => {
                assert_eq!(path, folder.join("item.de.md"));
            }
            other => panic!("expected DeleteFailed, got {other:?}"),
        }
        assert!(folder.join("item.md").is_file());
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[test]
    fn reorder_follows_list() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let ordering = vec!["about".to_string(), "home".to_string(), "blog".to_string()];
        let key = store.reorder("03.about", &ordering).unwrap();
        assert_eq!(key, "01.about");
        assert_eq!(
            list(&pages_dir(&tmp)),
            vec![".git", "01.about", "02.home", "03.blog"]
        );
    }

    #[test]
    fn reorder_pushes_missing_siblings_last() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let ordering = vec!["blog".to_string(), "about".to_string()];
        store.reorder("02.blog", &ordering).unwrap();
        assert_eq!(
            list(&pages_dir(&tmp)),
            vec![".git", "01.blog", "02.about", "999999.home"]
        );
    }

    #[test]
    fn reorder_leaves_unordered_siblings() {
        let tmp = setup_site();
        write_file(&pages_dir(&tmp), "drafts/default.md", "x", 1);
        let store = store_for(&tmp);
        let ordering = vec!["home".to_string(), "blog".to_string(), "about".to_string()];
        store.reorder("01.home", &ordering).unwrap();
        assert!(pages_dir(&tmp).join("drafts").is_dir());
    }

    #[test]
    fn reorder_siblings_sets_record_order_only() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let mut record = store.load("02.blog/02.post-b").unwrap();
        let ordering = vec!["post-b".to_string(), "post-a".to_string()];
        let renamed = store.reorder_siblings(&mut record, &ordering).unwrap();

        assert_eq!(record.key.order, Some(1));
        assert_eq!(renamed, vec!["02.blog/02.post-a"]);
        // Record itself is saved by the caller.
        assert!(pages_dir(&tmp).join("02.blog/02.post-b").is_dir());
        store.save(&record).unwrap();
        assert!(pages_dir(&tmp).join("02.blog/01.post-b/item.md").is_file());
    }

    // =========================================================================
    // Index
    // =========================================================================

    #[test]
    fn index_is_cached_within_window() {
        let tmp = setup_site();
        let mut config = StoreConfig::default();
        config.index.freshness_secs = 60;
        let store = store_with(&tmp, config);

        let first = store.index(false).unwrap();
        write_file(&pages_dir(&tmp), "04.new/default.md", "x", 10);
        let cached = store.index(false).unwrap();
        assert_eq!(first, cached);

        let forced = store.index(true).unwrap();
        assert!(forced.contains_key(&NaturalKey::from("04.new")));
    }

    #[test]
    fn save_invalidates_index_cache() {
        let tmp = setup_site();
        let mut config = StoreConfig::default();
        config.index.freshness_secs = 60;
        let store = store_with(&tmp, config);
        store.index(false).unwrap();

        let record = PageRecord::new(StorageKey::parse("04.new|default").unwrap()).with_body("x");
        store.save(&record).unwrap();
        assert!(store.existing_keys().unwrap().contains(&"04.new".to_string()));
    }

    #[test]
    fn unchanged_save_keeps_index_cache() {
        let tmp = setup_site();
        let mut config = StoreConfig::default();
        config.index.freshness_secs = 60;
        let store = store_with(&tmp, config);
        store.index(false).unwrap();
        let cache_file = tmp.path().join("cache/pages/index.json");
        assert!(cache_file.is_file());

        let record = store.load("03.about").unwrap();
        store.save(&record).unwrap();
        assert!(cache_file.is_file());
    }

    #[test]
    fn existing_keys_lists_index() {
        let tmp = setup_site();
        let store = store_for(&tmp);
        let keys = store.existing_keys().unwrap();
        assert_eq!(keys.first().map(String::as_str), Some(""));
        assert!(keys.contains(&"02.blog/_hero".to_string()));
        assert_eq!(keys.len(), 7);
    }
}
