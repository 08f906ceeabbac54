//! Mutex-guarded, write-through store over one ProgressDocument.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use super::error::StoreError;
use super::model::{Candidate, Item, ProgressDocument};
use super::persist::{load_document, save_document};

/// The authoritative record of one catalog.
///
/// Every mutation takes the single document lock, applies the change and
/// flushes the whole document to disk before the lock is released, so readers
/// never see a half-applied change and no concurrent writer can lose an update.
/// Persistence happens inside the same critical section; mutators never call
/// each other while holding the lock.
#[derive(Debug)]
pub struct ProgressStore {
    doc: Mutex<ProgressDocument>,
    path: PathBuf,
}

impl ProgressStore {
    /// Open an existing document (marks it as loaded from cache).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = load_document(&path)?;
        tracing::debug!(path = %path.display(), items = doc.items.len(), "opened progress document");
        Ok(Self {
            doc: Mutex::new(doc),
            path,
        })
    }

    /// Persist a freshly built document at `path` and wrap it.
    pub fn create(path: impl Into<PathBuf>, doc: ProgressDocument) -> Result<Self, StoreError> {
        let store = Self {
            doc: Mutex::new(doc),
            path: path.into(),
        };
        {
            let doc = store.lock();
            store.flush(&doc)?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ProgressDocument> {
        // A panic inside a critical section cannot leave a partial document:
        // each mutation is a single map operation followed by the flush.
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, doc: &ProgressDocument) -> Result<(), StoreError> {
        save_document(doc, &self.path).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })
    }

    /// Apply `f` to one item under the lock, then flush.
    fn mutate_item<T>(
        &self,
        item_key: &str,
        f: impl FnOnce(&mut Item) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut doc = self.lock();
        let item = doc
            .items
            .get_mut(item_key)
            .ok_or_else(|| StoreError::ItemNotFound(item_key.to_string()))?;
        let out = f(item)?;
        self.flush(&doc)?;
        Ok(out)
    }

    /// Replace an item's candidate map.
    pub fn set_candidates(
        &self,
        item_key: &str,
        candidates: BTreeMap<String, Candidate>,
    ) -> Result<(), StoreError> {
        let count = candidates.len();
        self.mutate_item(item_key, |item| {
            item.candidates = candidates;
            Ok(())
        })?;
        tracing::debug!(item = item_key, count, "stored candidates");
        Ok(())
    }

    /// Remove one downloaded candidate; the item becomes complete when none are left.
    /// Returns whether the item is now complete.
    pub fn mark_candidate_consumed(&self, item_key: &str, candidate_key: &str) -> Result<bool, StoreError> {
        let complete = self.mutate_item(item_key, |item| {
            if item.candidates.remove(candidate_key).is_none() {
                return Err(StoreError::CandidateNotFound {
                    item: item_key.to_string(),
                    candidate: candidate_key.to_string(),
                });
            }
            if item.candidates.is_empty() {
                item.complete = true;
            }
            Ok(item.complete)
        })?;
        tracing::debug!(item = item_key, candidate = candidate_key, complete, "candidate consumed");
        Ok(complete)
    }

    /// Administrative override of the `complete` flag.
    pub fn mark_all_complete(&self, item_key: &str, complete: bool) -> Result<(), StoreError> {
        self.mutate_item(item_key, |item| {
            item.complete = complete;
            Ok(())
        })
    }

    /// Exclude (or re-include) an item from searching and downloading.
    pub fn set_skip(&self, item_key: &str, skip: bool) -> Result<(), StoreError> {
        self.mutate_item(item_key, |item| {
            item.skip = skip;
            Ok(())
        })
    }

    /// Add tier `all` when the document has none.
    pub fn ensure_default_tier(&self) -> Result<(), StoreError> {
        let mut doc = self.lock();
        if !doc.tiers.is_empty() {
            return Ok(());
        }
        doc.ensure_default_tier();
        self.flush(&doc)
    }

    /// Flush the current document without changing it.
    pub fn save(&self) -> Result<(), StoreError> {
        let doc = self.lock();
        self.flush(&doc)
    }

    /// Read-only copy for iteration outside the lock.
    pub fn snapshot(&self) -> ProgressDocument {
        self.lock().clone()
    }

    /// Copy of one item, if present.
    pub fn item(&self, item_key: &str) -> Option<Item> {
        self.lock().items.get(item_key).cloned()
    }
}
