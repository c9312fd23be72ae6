//! Storage keys and the `NN.folder` naming convention.
//!
//! Every record is addressed by a *storage key*: the slash-separated path of
//! its folder below the data root, exactly as it exists on disk, optionally
//! followed by `|template.lang` when the content variant cannot be derived
//! from context:
//!
//! ```text
//! 02.blog/01.post-a              folder only
//! 02.blog/01.post-a|item         template "item", default language
//! 02.blog/01.post-a|item.fr      template "item", language "fr"
//! ```
//!
//! ## Order prefixes
//!
//! A physical folder name may start with a numeric prefix followed by a dot
//! (`03.about`). The prefix controls sibling ordering and is parsed as an
//! integer of any width; keys built here always write it back zero-padded to
//! two digits. The name after the prefix is the *folder* (slug).
//!
//! - `"03.about"` → order=Some(3), folder="about"
//! - `"about"` → order=None, folder="about"
//! - `"2024.05.report"` → order=Some(2024), folder="05.report"
//! - `"03."` → order=None, folder="03." (nothing follows the dot)
//!
//! ## Routes
//!
//! The route of a record is its storage key with every order prefix removed,
//! so `02.blog/01.post-a` is served as `blog/post-a`.
//!
//! ## Ordering
//!
//! Index keys, markdown variants and child folders are all sorted with
//! [`natural_cmp`]: case-insensitive, with digit runs compared numerically
//! (`page2` sorts before `page10`).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("malformed storage key '{key}': {reason}")]
    Malformed { key: String, reason: &'static str },
}

/// Structured identity of a record.
///
/// `parent_key` is itself a storage key (physical names, order prefixes
/// included). `folder` never contains `/`. `template` and `lang` are empty
/// when not known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    pub parent_key: String,
    pub order: Option<u32>,
    pub folder: String,
    pub template: String,
    pub lang: String,
}

impl StorageKey {
    /// Parse a storage key into its parts.
    ///
    /// This is purely syntactic: the order comes from the key text, not from
    /// the filesystem. `"about"` has no order even if the folder on disk is
    /// `03.about`.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let malformed = |reason| KeyError::Malformed {
            key: key.to_string(),
            reason,
        };

        let (base, params) = parse_key(key);
        if params.contains('|') || params.contains('/') {
            return Err(malformed("parameters may not contain '/' or '|'"));
        }
        let (template, lang) = split_params(params);
        if lang.contains('.') {
            return Err(malformed("language may not contain '.'"));
        }

        let base = base.trim_matches('/');
        if !base.is_empty() {
            for segment in base.split('/') {
                if segment.is_empty() {
                    return Err(malformed("empty path segment"));
                }
                if segment == "." || segment == ".." {
                    return Err(malformed("relative path segment"));
                }
            }
        }

        let (parent_key, basename) = base.rsplit_once('/').unwrap_or(("", base));
        let (order, folder) = match split_order(basename) {
            Some((digits, rest)) => {
                let order = digits
                    .parse::<u32>()
                    .map_err(|_| malformed("order prefix out of range"))?;
                (Some(order), rest)
            }
            None => (None, basename),
        };

        Ok(Self {
            parent_key: parent_key.to_string(),
            order,
            folder: folder.to_string(),
            template: template.to_string(),
            lang: lang.to_string(),
        })
    }

    /// Build the canonical key string.
    ///
    /// `parent_key/[NN.]folder`, with `|template[.lang]` appended when
    /// `include_params` is set and either parameter is non-empty.
    pub fn to_key(&self, include_params: bool) -> String {
        let name = self.folder_name();
        let mut key = match (self.parent_key.is_empty(), name.is_empty()) {
            (true, _) => name,
            (false, true) => self.parent_key.clone(),
            (false, false) => format!("{}/{}", self.parent_key, name),
        };
        if include_params && (!self.template.is_empty() || !self.lang.is_empty()) {
            key.push('|');
            key.push_str(&self.template);
            if !self.lang.is_empty() {
                key.push('.');
                key.push_str(&self.lang);
            }
        }
        key
    }

    /// Physical folder name: `NN.folder` when ordered, `folder` otherwise.
    pub fn folder_name(&self) -> String {
        match self.order {
            Some(order) => format!("{:02}.{}", order, self.folder),
            None => self.folder.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_key.is_empty() && self.folder.is_empty()
    }

    pub fn has_params(&self) -> bool {
        !self.template.is_empty() || !self.lang.is_empty()
    }

    /// Same record, without the template/language parameters.
    pub fn without_params(&self) -> Self {
        Self {
            template: String::new(),
            lang: String::new(),
            ..self.clone()
        }
    }

    /// A child of this record, from its physical folder name.
    pub fn child(&self, physical_name: &str) -> Self {
        let (order, folder) = parse_folder_name(physical_name);
        Self {
            parent_key: self.to_key(false),
            order,
            folder: folder.to_string(),
            template: String::new(),
            lang: String::new(),
        }
    }

    /// Route of this record (order prefixes stripped).
    pub fn route(&self) -> String {
        route(&self.to_key(false))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key(true))
    }
}

impl FromStr for StorageKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Split a key on the first `|` into `(base_key, params)`.
pub fn parse_key(key: &str) -> (&str, &str) {
    key.split_once('|').unwrap_or((key, ""))
}

/// Split params on the first `.` into `(template, lang)`.
pub fn split_params(params: &str) -> (&str, &str) {
    params.split_once('.').unwrap_or((params, ""))
}

/// Split `NN.rest` into its digit prefix and the rest.
///
/// Requires at least one digit and a non-empty rest.
fn split_order(name: &str) -> Option<(&str, &str)> {
    let (digits, rest) = name.split_once('.')?;
    if digits.is_empty() || rest.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits, rest))
}

/// Parse a physical folder name into `(order, folder)`.
///
/// Unlike [`StorageKey::parse`] this never fails: a prefix too large for
/// `u32` is kept as part of the folder name.
pub fn parse_folder_name(name: &str) -> (Option<u32>, &str) {
    match split_order(name) {
        Some((digits, rest)) => match digits.parse::<u32>() {
            Ok(order) => (Some(order), rest),
            Err(_) => (None, name),
        },
        None => (None, name),
    }
}

/// Route for a storage key: params dropped, empty segments collapsed and
/// order prefixes stripped from every segment.
pub fn route(storage_key: &str) -> String {
    let (base, _) = parse_key(storage_key);
    base.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| parse_folder_name(segment).1)
        .collect::<Vec<_>>()
        .join("/")
}

/// Concatenated `NN.` prefixes along the ancestor chain.
///
/// `02.blog/01.post-a` → `"02.01."`; unordered segments contribute nothing.
pub fn full_order(storage_key: &str) -> String {
    let (base, _) = parse_key(storage_key);
    base.split('/')
        .filter_map(|segment| parse_folder_name(segment).0)
        .map(|order| format!("{:02}.", order))
        .collect()
}

/// Underscore-prefixed folders are modular sections of their parent page.
pub fn is_modular(name: &str) -> bool {
    name.starts_with('_')
}

/// Last segment of a storage key (`""` for the root).
pub fn basename(storage_key: &str) -> &str {
    storage_key.rsplit_once('/').map_or(storage_key, |(_, name)| name)
}

/// Parent storage key (`""` for top-level records and the root).
pub fn parent_key(storage_key: &str) -> &str {
    storage_key.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Natural, case-insensitive string comparison.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let xs = take_digits(&mut left);
                let ys = take_digits(&mut right);
                let ord = cmp_digit_runs(&xs, &ys);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

fn cmp_digit_runs(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

/// A map key that sorts naturally and case-insensitively.
///
/// Ties under [`natural_cmp`] (`"A"` vs `"a"`, `"01"` vs `"1"`) fall back to
/// byte order so the ordering stays consistent with equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for NaturalKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NaturalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
