//! Admission control for downloads.
//!
//! A counting permit pool bounds the number of downloads in flight. The task
//! pool may hold more tasks than there are permits; extra tasks simply wait in
//! `acquire`. A permit is returned when its `Permit` is dropped, so every exit
//! path of a download attempt (success, timeout, error, panic unwinding)
//! releases it exactly once.

mod permit;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

pub use permit::Permit;

/// Shared pool of download permits.
#[derive(Debug)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_use: Arc<AtomicUsize>,
}

impl AdmissionController {
    /// Create a pool with `max_concurrent` permits (at least one).
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configured number of permits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Permits free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait until a permit is free. No timeout: permits are only held for the
    /// duration of one download attempt.
    pub async fn acquire(&self) -> Permit {
        let inner = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("admission semaphore is never closed"));
        self.in_use.fetch_add(1, Ordering::AcqRel);
        Permit::new(inner, Arc::clone(&self.in_use))
    }

    /// Take a permit only if one is free.
    pub fn try_acquire(&self) -> Option<Permit> {
        let inner = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        self.in_use.fetch_add(1, Ordering::AcqRel);
        Some(Permit::new(inner, Arc::clone(&self.in_use)))
    }
}
