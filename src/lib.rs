//! # pagetree
//!
//! A flat-file hierarchical page store. Your filesystem is the database:
//! folders are pages, a numeric prefix orders a folder among its siblings,
//! and the markdown file inside names the page's template and language.
//!
//! # Architecture: Scan, Index, Store
//!
//! ```text
//! 1. Scan    one folder    →  PageMetadata     (variants, children, checksum)
//! 2. Index   whole tree    →  Index            (every folder, propagated timestamps)
//! 3. Store   PageRecord    →  folders + files  (move, copy, rename, write)
//! ```
//!
//! The index is a JSON document cached next to the site, reused while it is
//! fresh and invalidated by every store mutation that touched the disk.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Storage key grammar, `NN.` order prefixes, routes, natural ordering |
//! | [`config`] | `pagetree.toml` loading, merging over stock defaults, validation |
//! | [`locator`] | Logical `page://` / `cache://` paths → physical paths, passed in a [`locator::Context`] |
//! | [`scan`] | Single-folder metadata: content variants, child folders, checksum |
//! | [`index`] | Full-tree walk and timestamp propagation |
//! | [`cache`] | Index cache file with a freshness window |
//! | [`record`] | In-memory page records, YAML frontmatter |
//! | [`store`] | Reading, saving, deleting and reordering records |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Storage Keys Are Physical
//!
//! A storage key spells the folder names as they are on disk
//! (`02.blog/01.post-a`), plus optional `|template.lang` params. The route
//! (`blog/post-a`) is derived, never stored. Keeping the physical name means
//! a key maps to exactly one folder without a lookup table, and renaming a
//! folder is the only thing it takes to reorder a page.
//!
//! ## Natural Ordering Everywhere
//!
//! Every map keyed by a name (index keys, children, variants) sorts
//! naturally and case-insensitively, so `2.b` comes before `10.a`. Iteration
//! order, serialized output and checksums all follow from that one ordering.
//!
//! ## Timestamps Bubble Up
//!
//! A folder's `storage_timestamp` is the newest content file inside it or
//! anywhere below it. One comparison at the root tells whether anything
//! changed.
//!
//! ## Idempotent Saves
//!
//! Saving a record whose rendered bytes match the file on disk writes
//! nothing: mtimes and the index cache survive, so repeated saves from an
//! editor are free.

pub mod cache;
pub mod config;
pub mod index;
pub mod locator;
pub mod naming;
pub mod output;
pub mod record;
pub mod scan;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
