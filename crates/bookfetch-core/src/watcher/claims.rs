//! Claimed-names registry shared by every watcher of a directory.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// File names adopted by in-flight watches. Construct one per pipeline and
/// pass it down; watchers sharing a directory must share the registry.
#[derive(Debug, Clone, Default)]
pub struct ClaimedNames {
    names: Arc<Mutex<HashSet<String>>>,
}

impl ClaimedNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically pick and claim the first adoptable name among `entries`.
    ///
    /// A name is adoptable when nobody claimed it and either it carries the
    /// transient suffix, or it is a finished file whose transient form is not
    /// being watched by someone else (that watcher will pick it up).
    pub fn claim_first<'a, I>(&self, entries: I, transient_suffix: &str) -> Option<Claim>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in entries {
            if names.contains(entry) {
                continue;
            }
            let in_progress = !transient_suffix.is_empty() && entry.ends_with(transient_suffix);
            let transient_form = format!("{}{}", entry, transient_suffix);
            if in_progress || !names.contains(&transient_form) {
                names.insert(entry.to_string());
                return Some(Claim {
                    name: entry.to_string(),
                    registry: self.clone(),
                });
            }
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

/// A claimed name; released back to the registry when dropped.
#[derive(Debug)]
pub struct Claim {
    name: String,
    registry: ClaimedNames,
}

impl Claim {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.registry.release(&self.name);
    }
}
