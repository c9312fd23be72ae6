//! Store configuration.
//!
//! Handles loading, validating, and merging `pagetree.toml`. Stock defaults
//! are serialized to a TOML value and the user file is merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! data_root = "pages"        # Page tree, relative to the site root
//! cache_dir = "cache"        # Index cache directory, relative to the site root
//!
//! [ignore]
//! hidden = true              # Skip entries whose name starts with '.'
//! files = [".DS_Store", "Thumbs.db"]
//! folders = [".git", ".svn", "node_modules"]
//!
//! [languages]
//! supported = []             # e.g. ["en", "fr"]; empty = any lowercase suffix
//! default = ""               # Default language code
//! include_default_lang_file_extension = false
//!
//! [index]
//! freshness_secs = 2         # Reuse the cached index if younger than this
//! file = "pages/index.json"  # Index file, relative to cache_dir
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Config file name looked up in the site root.
pub const CONFIG_FILENAME: &str = "pagetree.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Ignore rules applied while scanning folders.
pub trait IgnoreConfig {
    fn ignore_hidden(&self) -> bool;
    fn ignore_files(&self) -> &[String];
    fn ignore_folders(&self) -> &[String];
}

/// Store configuration loaded from `pagetree.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding the page tree, relative to the site root.
    pub data_root: String,
    /// Directory holding the index cache, relative to the site root.
    pub cache_dir: String,
    pub ignore: IgnoreSettings,
    pub languages: LanguageSettings,
    pub index: IndexSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_root: "pages".to_string(),
            cache_dir: "cache".to_string(),
            ignore: IgnoreSettings::default(),
            languages: LanguageSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl StoreConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.freshness_secs > 3600 {
            return Err(ConfigError::Validation(
                "index.freshness_secs must be at most 3600".into(),
            ));
        }
        if self.index.file.is_empty() || Path::new(&self.index.file).is_absolute() {
            return Err(ConfigError::Validation(
                "index.file must be a non-empty relative path".into(),
            ));
        }
        for lang in &self.languages.supported {
            if !is_language_code(lang) {
                return Err(ConfigError::Validation(format!(
                    "languages.supported: '{lang}' is not a lowercase language code"
                )));
            }
        }
        let default = &self.languages.default;
        if !default.is_empty() {
            if !is_language_code(default) {
                return Err(ConfigError::Validation(format!(
                    "languages.default: '{default}' is not a lowercase language code"
                )));
            }
            if !self.languages.supported.is_empty() && !self.languages.supported.contains(default)
            {
                return Err(ConfigError::Validation(format!(
                    "languages.default '{default}' is not in languages.supported"
                )));
            }
        }
        Ok(())
    }
}

impl IgnoreConfig for StoreConfig {
    fn ignore_hidden(&self) -> bool {
        self.ignore.hidden
    }

    fn ignore_files(&self) -> &[String] {
        &self.ignore.files
    }

    fn ignore_folders(&self) -> &[String] {
        &self.ignore.folders
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IgnoreSettings {
    /// Skip entries whose name starts with `.`.
    pub hidden: bool,
    /// File names skipped while scanning.
    pub files: Vec<String>,
    /// Folder names skipped while scanning.
    pub folders: Vec<String>,
}

impl Default for IgnoreSettings {
    fn default() -> Self {
        Self {
            hidden: true,
            files: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
            folders: vec![
                ".git".to_string(),
                ".svn".to_string(),
                "node_modules".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanguageSettings {
    /// Recognised language suffixes. Empty accepts any lowercase code.
    pub supported: Vec<String>,
    /// Default language code, `""` when the site is single-language.
    pub default: String,
    /// Write `template.<default>.md` instead of `template.md` for the
    /// default language.
    pub include_default_lang_file_extension: bool,
}

impl LanguageSettings {
    /// Whether `suffix` counts as a language code in a content filename.
    pub fn is_language(&self, suffix: &str) -> bool {
        if self.supported.is_empty() {
            is_language_code(suffix)
        } else {
            self.supported.iter().any(|lang| lang == suffix)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSettings {
    /// Age in seconds below which the cached index is returned as-is.
    pub freshness_secs: u64,
    /// Index file, relative to `cache_dir`.
    pub file: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            freshness_secs: 2,
            file: "pages/index.json".to_string(),
        }
    }
}

/// Lowercase word characters and dashes: `en`, `pt-br`, `zh_hans`.
pub fn is_language_code(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(StoreConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `pagetree.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from `pagetree.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<StoreConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(root)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: StoreConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `pagetree.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pagetree configuration
# ======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Page tree, relative to the site root. Every folder below it is a record;
# a leading "NN." on a folder name sets its position among its siblings.
data_root = "pages"

# Index cache directory, relative to the site root.
cache_dir = "cache"

# ---------------------------------------------------------------------------
# Entries skipped while scanning
# ---------------------------------------------------------------------------
[ignore]
hidden = true
files = [".DS_Store", "Thumbs.db"]
folders = [".git", ".svn", "node_modules"]

# ---------------------------------------------------------------------------
# Languages
# ---------------------------------------------------------------------------
[languages]
# Language suffixes recognised in content filenames (template.fr.md).
# Empty accepts any lowercase code.
supported = []

# Default language code.
default = ""

# Write template.<default>.md rather than template.md for the default language.
include_default_lang_file_extension = false

# ---------------------------------------------------------------------------
# Index cache
# ---------------------------------------------------------------------------
[index]
# A cached index younger than this many seconds is reused without rescanning.
freshness_secs = 2

# Index file, relative to cache_dir.
file = "pages/index.json"
"##
}
