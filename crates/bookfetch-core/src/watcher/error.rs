use std::fmt;
use std::path::PathBuf;

/// Where a watch gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// No new, unclaimed file appeared.
    Arrival,
    /// A file appeared but never reached a stable, final state.
    Completion,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutPhase::Arrival => write!(f, "download never started"),
            TimeoutPhase::Completion => write!(f, "download never finished"),
        }
    }
}

/// Failure of one completion watch. The candidate stays in the progress
/// document so a later run retries it.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("{phase} after {polls} polls (file: {})", name.as_deref().unwrap_or("-"))]
    DownloadTimeout {
        phase: TimeoutPhase,
        name: Option<String>,
        polls: u32,
    },

    #[error("watch I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WatchError::DownloadTimeout { .. })
    }
}
