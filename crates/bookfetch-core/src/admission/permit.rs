//! RAII permit that returns its slot when dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

/// One unit of admission. Dropping it (or calling [`Permit::release`]) frees the slot.
#[derive(Debug)]
pub struct Permit {
    _inner: OwnedSemaphorePermit,
    in_use: Arc<AtomicUsize>,
}

impl Permit {
    pub(super) fn new(inner: OwnedSemaphorePermit, in_use: Arc<AtomicUsize>) -> Self {
        Self {
            _inner: inner,
            in_use,
        }
    }

    /// Explicit release; equivalent to dropping the permit.
    pub fn release(self) {}
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}
