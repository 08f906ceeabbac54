//! Run summary returned by the orchestrator.

use std::fmt;
use std::path::PathBuf;

/// A candidate attempt that did not produce a file. The candidate stays in
/// the document so the next run retries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub item: String,
    pub candidate: String,
    pub reason: String,
    /// The completion watch gave up (as opposed to resolve/fetch errors).
    pub timed_out: bool,
}

/// Outcome of one successful candidate attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub item: String,
    pub candidate: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Items a catalog search was run for.
    pub searched: usize,
    /// Items whose search failed; they keep no new candidates.
    pub search_failures: Vec<String>,
    /// Items that were already complete or skipped.
    pub settled: usize,
    pub downloaded: Vec<Downloaded>,
    pub failed: Vec<FailedAttempt>,
    /// Keys of complete items after the run.
    pub completed: Vec<String>,
}

impl RunReport {
    pub fn downloaded_count(&self) -> usize {
        self.downloaded.len()
    }

    pub(crate) fn merge(&mut self, other: RunReport) {
        self.searched += other.searched;
        self.search_failures.extend(other.search_failures);
        self.settled += other.settled;
        self.downloaded.extend(other.downloaded);
        self.failed.extend(other.failed);
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timeouts = self.failed.iter().filter(|a| a.timed_out).count();
        write!(
            f,
            "{} downloaded, {} failed ({} timed out), {} searched, {} complete",
            self.downloaded.len(),
            self.failed.len(),
            timeouts,
            self.searched,
            self.completed.len()
        )
    }
}
