//! Single-folder metadata scanning.
//!
//! [`Scanner::scan`] lists the immediate entries of one folder (never
//! recursing; walking the tree is [`crate::index`]'s job) and classifies them:
//!
//! ```text
//! 02.blog/01.post-a/
//! ├── item.md          → markdown[""]["item"]   = mtime
//! ├── item.fr.md       → markdown["fr"]["item"] = mtime
//! ├── photo.jpg        → page media, not tracked here
//! ├── _gallery/        → children["_gallery"]   = false (not yet scanned)
//! ├── shared -> ../x   → linked folder, never a child
//! └── .git/            → ignored
//! ```
//!
//! ## Content variants
//!
//! A content file is `template[.lang].md`. The language suffix is a lowercase
//! code (restricted to `languages.supported` when that list is set); anything
//! else before `.md` belongs to the template name.
//!
//! ## Checksum
//!
//! Every scan ends with a SHA-256 over the JSON of the metadata (minus the
//! checksum itself). Maps are naturally sorted before hashing, so the
//! checksum only moves when a scanned attribute does.

use crate::config::{IgnoreConfig, LanguageSettings, StoreConfig};
use crate::naming::{self, NaturalKey, StorageKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Extension of content files.
pub const CONTENT_EXTENSION: &str = ".md";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot list folder {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Modification time of a child folder, or `Unscanned` until the index
/// builder has visited it. Serialized as the timestamp or `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStamp {
    Unscanned,
    Scanned(u64),
}

impl Serialize for ChildStamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChildStamp::Unscanned => serializer.serialize_bool(false),
            ChildStamp::Scanned(stamp) => serializer.serialize_u64(*stamp),
        }
    }
}

impl<'de> Deserialize<'de> for ChildStamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Stamp(u64),
            Flag(bool),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Stamp(stamp) => Ok(ChildStamp::Scanned(stamp)),
            Raw::Flag(false) => Ok(ChildStamp::Unscanned),
            Raw::Flag(true) => Err(serde::de::Error::custom(
                "child stamp must be a timestamp or false",
            )),
        }
    }
}

/// `lang → variant stem → mtime`.
pub type MarkdownMap = BTreeMap<NaturalKey, BTreeMap<NaturalKey, u64>>;
/// `physical folder name → stamp`.
pub type ChildMap = BTreeMap<NaturalKey, ChildStamp>;

/// Cached description of one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Route: order prefixes stripped, slashes collapsed.
    pub key: String,
    pub storage_key: String,
    /// Lowest-sorted variant stem of the default language.
    pub template: Option<String>,
    /// Newest content file mtime, raised by the index builder from children.
    pub storage_timestamp: u64,
    pub markdown: MarkdownMap,
    pub children: ChildMap,
    pub checksum: String,
}

#[derive(Serialize)]
struct ChecksumInput<'a> {
    key: &'a str,
    storage_key: &'a str,
    template: &'a Option<String>,
    storage_timestamp: u64,
    markdown: &'a MarkdownMap,
    children: &'a ChildMap,
}

impl PageMetadata {
    /// Metadata of a folder that does not exist (or holds nothing).
    pub fn empty(storage_key: &str) -> Self {
        let mut meta = Self {
            key: naming::route(storage_key),
            storage_key: storage_key.to_string(),
            template: None,
            storage_timestamp: 0,
            markdown: MarkdownMap::new(),
            children: ChildMap::new(),
            checksum: String::new(),
        };
        meta.refresh_checksum();
        meta
    }

    /// Recompute `checksum` from the current attributes.
    pub fn refresh_checksum(&mut self) {
        let input = ChecksumInput {
            key: &self.key,
            storage_key: &self.storage_key,
            template: &self.template,
            storage_timestamp: self.storage_timestamp,
            markdown: &self.markdown,
            children: &self.children,
        };
        let mut hasher = Sha256::new();
        if let Err(e) = serde_json::to_writer(&mut hasher, &input) {
            log::warn!("checksum input for '{}' failed to encode: {e}", self.storage_key);
        }
        self.checksum = format!("{:x}", hasher.finalize());
    }

    /// Whether the record exists for a `template`/`lang` pair.
    ///
    /// A folder with children counts as existing for any template, so
    /// folder-only pages resolve without a content file.
    pub fn has_variant(&self, template: &str, lang: &str) -> bool {
        (!template.is_empty() && !self.children.is_empty())
            || self
                .markdown
                .get(&NaturalKey::from(lang))
                .is_some_and(|variants| variants.contains_key(&NaturalKey::from(template)))
    }

    /// Language codes that have at least one content file.
    pub fn languages(&self) -> Vec<&str> {
        self.markdown.keys().map(NaturalKey::as_str).collect()
    }

    /// Whether any content file remains in any language.
    pub fn has_content(&self) -> bool {
        self.markdown.values().any(|variants| !variants.is_empty())
    }

    /// Children as structured keys, in natural order, with their stamps.
    pub fn child_keys(&self) -> Vec<(StorageKey, ChildStamp)> {
        self.children
            .iter()
            .map(|(name, stamp)| {
                let (order, folder) = naming::parse_folder_name(name.as_str());
                let key = StorageKey {
                    parent_key: self.storage_key.clone(),
                    order,
                    folder: folder.to_string(),
                    template: String::new(),
                    lang: String::new(),
                };
                (key, *stamp)
            })
            .collect()
    }
}

/// Scans one folder at a time with the configured ignore rules.
pub struct Scanner<'a> {
    ignore: &'a dyn IgnoreConfig,
    languages: &'a LanguageSettings,
}

impl<'a> Scanner<'a> {
    pub fn new(config: &'a StoreConfig) -> Self {
        Self {
            ignore: config,
            languages: &config.languages,
        }
    }

    pub fn with_rules(ignore: &'a dyn IgnoreConfig, languages: &'a LanguageSettings) -> Self {
        Self { ignore, languages }
    }

    /// Scan `folder`, the physical location of `storage_key`.
    pub fn scan(&self, folder: &Path, storage_key: &str) -> Result<PageMetadata, ScanError> {
        let mut meta = PageMetadata::empty(storage_key);
        if !folder.is_dir() {
            return Ok(meta);
        }

        let entries = fs::read_dir(folder).map_err(|source| ScanError::ReadDir {
            path: folder.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("skipping unreadable entry in {}: {e}", folder.display());
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if self.ignore.ignore_hidden() && name.starts_with('.') {
                continue;
            }
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("skipping {}: {e}", entry.path().display());
                    continue;
                }
            };
            // Linked content files are followed; a dangling link is skipped.
            let info = match entry.path().metadata() {
                Ok(info) => info,
                Err(e) => {
                    log::warn!("skipping {}: {e}", entry.path().display());
                    continue;
                }
            };

            if file_type.is_symlink() && info.is_dir() {
                // Never a child page: a link to an ancestor would loop the walk.
                log::debug!("not descending into linked folder {}", entry.path().display());
            } else if info.is_dir() {
                if self.ignore.ignore_folders().contains(&name) {
                    continue;
                }
                meta.children
                    .insert(NaturalKey::from(name), ChildStamp::Unscanned);
            } else if info.is_file() {
                if self.ignore.ignore_files().contains(&name) {
                    continue;
                }
                let Some((lang, stem)) = self.parse_variant(&name) else {
                    continue;
                };
                let mtime = unix_secs(info.modified().ok());
                meta.markdown
                    .entry(NaturalKey::from(lang))
                    .or_default()
                    .insert(NaturalKey::from(stem), mtime);
                meta.storage_timestamp = meta.storage_timestamp.max(mtime);
            }
        }

        meta.template = self.derive_template(&meta.markdown);
        meta.refresh_checksum();
        Ok(meta)
    }

    /// Split a content filename into `(lang, template)`.
    fn parse_variant<'n>(&self, name: &'n str) -> Option<(&'n str, &'n str)> {
        let stem = name.strip_suffix(CONTENT_EXTENSION)?;
        if stem.is_empty() {
            return None;
        }
        if let Some((template, lang)) = stem.rsplit_once('.')
            && !template.is_empty()
            && self.languages.is_language(lang)
        {
            return Some((lang, template));
        }
        Some(("", stem))
    }

    /// First variant of the default language, else of the first language.
    fn derive_template(&self, markdown: &MarkdownMap) -> Option<String> {
        let first = |lang: &str| {
            markdown
                .get(&NaturalKey::from(lang))
                .and_then(|variants| variants.keys().next())
                .map(|stem| stem.as_str().to_string())
        };
        first("")
            .or_else(|| {
                let default = &self.languages.default;
                if default.is_empty() { None } else { first(default.as_str()) }
            })
            .or_else(|| {
                markdown
                    .values()
                    .find_map(|variants| variants.keys().next())
                    .map(|stem| stem.as_str().to_string())
            })
    }
}

pub(crate) fn unix_secs(time: Option<SystemTime>) -> u64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
