//! Full-tree index building.
//!
//! The index is a flat map `storage_key → PageMetadata` covering every folder
//! below the data root, the root itself included under `""`.
//!
//! ## Walk
//!
//! The tree is walked with an explicit stack of pending keys rather than
//! recursion: pop a key, scan its folder with [`Scanner`], push one key per
//! child folder. Memory is bounded by the pending fan-out, not the depth.
//!
//! ## Propagation
//!
//! Children are discovered after their parents, so a second pass runs over
//! the naturally sorted keys **in reverse** (every descendant sorts after its
//! ancestors) and back-fills each parent:
//!
//! - the parent's `children[name]` sentinel becomes the child's timestamp;
//! - the parent's `storage_timestamp` is raised to at least the child's.
//!
//! Modular (`_`-prefixed) folders are not pages of their own, so raising the
//! parent is what invalidates it when they change. Regular children are
//! raised the same way, which keeps timestamps monotonic up to the root.

use crate::locator::{self, Locator};
use crate::naming::{self, NaturalKey};
use crate::scan::{ChildStamp, PageMetadata, ScanError, Scanner};
use std::collections::BTreeMap;
use thiserror::Error;

/// Every scanned folder, keyed by storage key in natural order.
pub type Index = BTreeMap<NaturalKey, PageMetadata>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("cannot resolve folder for '{0}'")]
    Unresolved(String),
}

pub struct IndexBuilder<'a> {
    scanner: Scanner<'a>,
    locator: &'a dyn Locator,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(scanner: Scanner<'a>, locator: &'a dyn Locator) -> Self {
        Self { scanner, locator }
    }

    pub fn build(&self) -> Result<Index, IndexError> {
        let mut index = Index::new();
        let mut pending = vec![String::new()];

        while let Some(key) = pending.pop() {
            let folder = self
                .locator
                .resolve(&locator::page_location(&key))
                .ok_or_else(|| IndexError::Unresolved(key.clone()))?;
            let meta = self.scanner.scan(&folder, &key)?;
            for child in meta.children.keys() {
                pending.push(if key.is_empty() {
                    child.to_string()
                } else {
                    format!("{key}/{child}")
                });
            }
            index.insert(NaturalKey::from(key), meta);
        }

        propagate(&mut index);
        log::debug!("indexed {} folders", index.len());
        Ok(index)
    }
}

/// Back-fill child stamps and parent timestamps, deepest keys first.
fn propagate(index: &mut Index) {
    let keys: Vec<NaturalKey> = index.keys().cloned().collect();
    for key in keys.iter().rev() {
        if key.as_str().is_empty() {
            continue;
        }
        let stamp = index[key].storage_timestamp;
        let name = NaturalKey::from(naming::basename(key.as_str()));
        let parent = NaturalKey::from(naming::parent_key(key.as_str()));
        let Some(parent_meta) = index.get_mut(&parent) else {
            continue;
        };
        if let Some(slot) = parent_meta.children.get_mut(&name) {
            *slot = ChildStamp::Scanned(stamp);
            parent_meta.storage_timestamp = parent_meta.storage_timestamp.max(stamp);
        }
    }
    for meta in index.values_mut() {
        meta.refresh_checksum();
    }
}
