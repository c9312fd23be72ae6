//! CLI output formatting.
//!
//! # Display
//!
//! Pages are shown by identity first (order and slug), with the physical
//! folder as an indented `Source:` line, so the output reads as a content
//! inventory while still pointing back at the disk.
//!
//! ## Index
//!
//! ```text
//! Pages
//! 001 home (default)
//!     Source: 01.home/
//! 002 blog (blog)
//!     Source: 02.blog/
//!     001 post-a (item)
//!         Source: 02.blog/01.post-a/
//!         Languages: fr
//!     002 post-b (item)
//!         Source: 02.blog/02.post-b/
//!     _hero (modular)
//!         Source: 02.blog/_hero/
//! 003 about (default)
//!     Source: 03.about/
//!
//! Indexed 7 folders, last change at 1400
//! ```
//!
//! ## Metadata
//!
//! ```text
//! 02.blog/01.post-a
//!     Route: blog/post-a
//!     Template: item
//!     Timestamp: 1300
//!     Checksum: 5d41402a…
//!     Content
//!         item.md (1200)
//!         item.fr.md (1300)
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure.

use crate::index::Index;
use crate::naming::{self, NaturalKey};
use crate::scan::{CONTENT_EXTENSION, ChildStamp, PageMetadata};
use crate::store::SavedRecord;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format an order prefix as 3-digit zero-padded.
fn format_order(order: u32) -> String {
    format!("{:0>3}", order)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Header line for one folder.
///
/// ```text
/// 002 blog (blog)      // ordered, with template
/// drafts               // unordered, no content
/// _hero (modular)
/// ```
fn page_header(name: &str, meta: &PageMetadata) -> String {
    let (order, slug) = naming::parse_folder_name(name);
    let label = match order {
        Some(order) => format!("{} {}", format_order(order), slug),
        None => slug.to_string(),
    };
    if naming::is_modular(name) {
        format!("{label} (modular)")
    } else {
        match &meta.template {
            Some(template) => format!("{label} ({template})"),
            None => label,
        }
    }
}

/// Content filename for a variant stem and language.
fn variant_filename(stem: &str, lang: &str) -> String {
    if lang.is_empty() {
        format!("{stem}{CONTENT_EXTENSION}")
    } else {
        format!("{stem}.{lang}{CONTENT_EXTENSION}")
    }
}

fn child_key(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

// ============================================================================
// Index
// ============================================================================

/// Format the index as a tree, children under their parents.
pub fn format_index_output(index: &Index) -> Vec<String> {
    let mut lines = vec!["Pages".to_string()];
    if let Some(root) = index.get(&NaturalKey::from("")) {
        format_children(index, root, 0, &mut lines);
    }
    let newest = index
        .get(&NaturalKey::from(""))
        .map(|root| root.storage_timestamp)
        .unwrap_or_default();
    lines.push(String::new());
    lines.push(format!(
        "Indexed {} folders, last change at {}",
        index.len(),
        newest
    ));
    lines
}

fn format_children(index: &Index, parent: &PageMetadata, depth: usize, lines: &mut Vec<String>) {
    for name in parent.children.keys() {
        let key = child_key(&parent.storage_key, name.as_str());
        let Some(meta) = index.get(&NaturalKey::from(key.as_str())) else {
            continue;
        };
        let base = indent(depth);
        lines.push(format!("{base}{}", page_header(name.as_str(), meta)));
        lines.push(format!("{base}    Source: {key}/"));
        let languages: Vec<&str> = meta
            .languages()
            .into_iter()
            .filter(|l| !l.is_empty())
            .collect();
        if !languages.is_empty() {
            lines.push(format!("{base}    Languages: {}", languages.join(", ")));
        }
        format_children(index, meta, depth + 1, lines);
    }
}

pub fn print_index_output(index: &Index) {
    for line in format_index_output(index) {
        println!("{}", line);
    }
}

// ============================================================================
// Single folder
// ============================================================================

/// Format one folder's metadata in full.
pub fn format_metadata(meta: &PageMetadata) -> Vec<String> {
    let title = if meta.storage_key.is_empty() {
        "(root)"
    } else {
        meta.storage_key.as_str()
    };
    let mut lines = vec![
        title.to_string(),
        format!("    Route: {}", meta.key),
        format!(
            "    Template: {}",
            meta.template.as_deref().unwrap_or("(none)")
        ),
        format!("    Timestamp: {}", meta.storage_timestamp),
        format!("    Checksum: {}", meta.checksum),
    ];

    if meta.has_content() {
        lines.push("    Content".to_string());
        for (lang, variants) in &meta.markdown {
            for (stem, mtime) in variants {
                lines.push(format!(
                    "        {} ({})",
                    variant_filename(stem.as_str(), lang.as_str()),
                    mtime
                ));
            }
        }
    }

    if !meta.children.is_empty() {
        lines.push("    Children".to_string());
        for (name, stamp) in &meta.children {
            let stamp = match stamp {
                ChildStamp::Scanned(ts) => ts.to_string(),
                ChildStamp::Unscanned => "unscanned".to_string(),
            };
            lines.push(format!("        {} ({})", name, stamp));
        }
    }
    lines
}

pub fn print_metadata(meta: &PageMetadata) {
    for line in format_metadata(meta) {
        println!("{}", line);
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Format the result of a save.
pub fn format_saved(from: &str, saved: &SavedRecord) -> Vec<String> {
    vec![
        format!("{} → {}", from, saved.storage_key),
        format!("    Timestamp: {}", saved.metadata.storage_timestamp),
    ]
}

pub fn print_saved(from: &str, saved: &SavedRecord) {
    for line in format_saved(from, saved) {
        println!("{}", line);
    }
}

/// Format the folders renamed by a reorder, the reordered record first.
pub fn format_reordered(key: &str, renamed: &[String]) -> Vec<String> {
    let mut lines = vec![key.to_string()];
    lines.extend(renamed.iter().map(|k| format!("    {}", k)));
    lines
}
