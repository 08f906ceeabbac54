//! Poll pacing, injectable so watcher state changes can be tested without sleeping.

use std::future::Future;
use std::time::Duration;

/// Waits between two polls of the watched directory.
pub trait Pacer: Send + Sync {
    fn pause(&self) -> impl Future<Output = ()> + Send;
}

/// Real pacing: sleeps for a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct IntervalPacer {
    interval: Duration,
}

impl IntervalPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Pacer for IntervalPacer {
    fn pause(&self) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(self.interval)
    }
}
