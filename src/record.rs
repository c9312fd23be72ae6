//! In-memory page records.
//!
//! A content file is an optional YAML header between `---` lines followed by
//! the markdown body:
//!
//! ```text
//! ---
//! title: Post A
//! ---
//! # Post A
//! ```
//!
//! A [`PageRecord`] holds the parsed header and body together with the key
//! it should be saved under and, when it was loaded from disk, the key it
//! came from. Changing `key` between load and save is how a record is moved,
//! copied or renamed (see [`crate::store::PageStore::save`]).

use crate::naming::{self, StorageKey};
use serde_yaml::Mapping;

/// A content file split into header and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub header: Mapping,
    pub body: String,
}

/// Split raw file content into YAML header and markdown body.
///
/// Content without an opening `---` line, or without a closing one, is all
/// body.
pub fn parse_frontmatter(raw: &str) -> Result<Frontmatter, serde_yaml::Error> {
    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return Ok(Frontmatter {
            header: Mapping::new(),
            body: raw.to_string(),
        });
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let header = if yaml.trim().is_empty() {
                Mapping::new()
            } else {
                serde_yaml::from_str(yaml)?
            };
            return Ok(Frontmatter {
                header,
                body: body.to_string(),
            });
        }
        offset += line.len();
    }

    Ok(Frontmatter {
        header: Mapping::new(),
        body: raw.to_string(),
    })
}

/// One content variant of a page, as loaded or about to be saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRecord {
    /// Key to save under. An empty template is resolved from the folder.
    pub key: StorageKey,
    /// Storage key (with params) the record was loaded from, if any.
    pub original_key: Option<String>,
    pub header: Mapping,
    pub body: String,
    /// Copy the folder to the new location instead of moving it.
    pub copy: bool,
    /// Write a new content file and leave the old variant untouched.
    pub clone: bool,
}

impl PageRecord {
    /// A record that does not exist on disk yet.
    pub fn new(key: StorageKey) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    /// A record loaded from `original_key`.
    pub fn loaded(key: StorageKey, original_key: String, frontmatter: Frontmatter) -> Self {
        Self {
            key,
            original_key: Some(original_key),
            header: frontmatter.header,
            body: frontmatter.body,
            copy: false,
            clone: false,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, header: Mapping) -> Self {
        self.header = header;
        self
    }

    /// File content: `---\n<yaml>---\n<body>`, or just the body when the
    /// header is empty.
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        if self.header.is_empty() {
            return Ok(self.body.clone());
        }
        let yaml = serde_yaml::to_string(&self.header)?;
        Ok(format!("---\n{yaml}---\n{}", self.body))
    }

    pub fn storage_key(&self) -> String {
        self.key.to_key(true)
    }

    /// Sortable concatenation of the order prefixes along the ancestor chain.
    pub fn full_order(&self) -> String {
        naming::full_order(&self.key.to_key(false))
    }

    /// Move under another parent, keeping folder name and order.
    pub fn move_to(&mut self, parent_key: &str) {
        self.key.parent_key = parent_key.trim_matches('/').to_string();
    }

    pub fn set_order(&mut self, order: Option<u32>) {
        self.key.order = order;
    }

    /// Turn this record into a copy of itself at its current `key`.
    pub fn as_copy(mut self) -> Self {
        self.copy = true;
        self
    }

    /// Turn this record into a new variant alongside the original.
    pub fn as_clone(mut self) -> Self {
        self.clone = true;
        self
    }

    pub fn exists(&self) -> bool {
        self.original_key.is_some()
    }
}
