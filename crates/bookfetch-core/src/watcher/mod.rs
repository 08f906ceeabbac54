//! Completion watcher for agent-triggered downloads.
//!
//! An external agent (typically a browser) saves files into a shared
//! directory we cannot observe directly. Each watch polls that directory:
//!
//! ```text
//! Idle -> DetectingArrival -> MonitoringSize -> Stabilized
//!               |                   |
//!               +---> TimedOut <----+
//! ```
//!
//! `DetectingArrival` waits for an entry no other watch has claimed.
//! `MonitoringSize` waits until the final (suffix-stripped) file exists and its
//! size is unchanged between two polls. On `Stabilized` the file is moved into
//! the destination directory. Claims are shared through [`ClaimedNames`] so
//! concurrent watches never adopt the same file.

mod claims;
mod error;
mod pacer;
mod relocate;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::naming::ReservedNames;

pub use claims::{Claim, ClaimedNames};
pub use error::{TimeoutPhase, WatchError};
pub use pacer::{IntervalPacer, Pacer};
pub use relocate::relocate;

/// Poll budgets and timing for one watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    /// Polls spent waiting for a new file before giving up.
    pub arrival_retries: u32,
    /// Polls tolerated while the claimed (transient) file is missing.
    pub exists_retries: u32,
    /// Polls tolerated without completion; reset whenever the size changes.
    pub size_stable_retries: u32,
    /// Marker the agent appends to partial downloads (e.g. `.opdownload`).
    pub transient_suffix: String,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            arrival_retries: 10,
            exists_retries: 10,
            size_stable_retries: 200,
            transient_suffix: ".opdownload".to_string(),
        }
    }
}

impl WatchSettings {
    /// Final name of a claimed entry: the transient suffix stripped, if present.
    pub fn final_name<'a>(&self, claimed: &'a str) -> &'a str {
        if self.transient_suffix.is_empty() {
            return claimed;
        }
        match claimed.strip_suffix(self.transient_suffix.as_str()) {
            Some(base) if !base.is_empty() => base,
            _ => claimed,
        }
    }
}

/// Named states of a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    DetectingArrival {
        polls_left: u32,
    },
    MonitoringSize {
        claimed: String,
        final_name: String,
        last_size: Option<u64>,
        exists_left: u32,
        stable_left: u32,
    },
    Stabilized {
        final_name: String,
    },
    TimedOut {
        phase: TimeoutPhase,
        name: Option<String>,
    },
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WatchState::Stabilized { .. } | WatchState::TimedOut { .. })
    }
}

/// One watch over a shared download directory.
pub struct CompletionWatcher<P: Pacer> {
    dir: PathBuf,
    settings: WatchSettings,
    claims: ClaimedNames,
    reserved: ReservedNames,
    pacer: P,
    state: WatchState,
    claim: Option<Claim>,
    polls: u32,
}

impl<P: Pacer> CompletionWatcher<P> {
    pub fn new(dir: impl Into<PathBuf>, settings: WatchSettings, claims: ClaimedNames, pacer: P) -> Self {
        Self {
            dir: dir.into(),
            settings,
            claims,
            reserved: ReservedNames::new(),
            pacer,
            state: WatchState::Idle,
            claim: None,
            polls: 0,
        }
    }

    /// Share destination-name reservations with other writers of the destination.
    pub fn with_reserved_names(mut self, reserved: ReservedNames) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// Directory polls performed so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Advance the state machine by one transition. Every transition out of
    /// `DetectingArrival` or `MonitoringSize` costs exactly one poll.
    pub async fn step(&mut self) -> Result<&WatchState, WatchError> {
        let next = match &self.state {
            WatchState::Idle => WatchState::DetectingArrival {
                polls_left: self.settings.arrival_retries.max(1),
            },
            WatchState::DetectingArrival { polls_left } => {
                let polls_left = *polls_left;
                self.poll_arrival(polls_left).await?
            }
            WatchState::MonitoringSize {
                claimed,
                final_name,
                last_size,
                exists_left,
                stable_left,
            } => {
                let (claimed, final_name) = (claimed.clone(), final_name.clone());
                let (last_size, exists_left, stable_left) = (*last_size, *exists_left, *stable_left);
                self.poll_size(claimed, final_name, last_size, exists_left, stable_left)
                    .await?
            }
            terminal => terminal.clone(),
        };
        if let WatchState::TimedOut { .. } = next {
            // Free the name so a later watch is not blocked by it.
            self.claim = None;
        }
        self.state = next;
        Ok(&self.state)
    }

    async fn poll_arrival(&mut self, polls_left: u32) -> Result<WatchState, WatchError> {
        self.pacer.pause().await;
        self.polls += 1;

        let entries = self.list_entries().await?;
        let claim = self
            .claims
            .claim_first(entries.iter().map(String::as_str), &self.settings.transient_suffix);

        let Some(claim) = claim else {
            let polls_left = polls_left.saturating_sub(1);
            if polls_left == 0 {
                tracing::debug!(dir = %self.dir.display(), polls = self.polls, "no new file appeared");
                return Ok(WatchState::TimedOut {
                    phase: TimeoutPhase::Arrival,
                    name: None,
                });
            }
            return Ok(WatchState::DetectingArrival { polls_left });
        };

        let claimed = claim.name().to_string();
        let final_name = self.settings.final_name(&claimed).to_string();
        tracing::debug!(claimed = %claimed, final_name = %final_name, "claimed arriving file");
        self.claim = Some(claim);
        Ok(WatchState::MonitoringSize {
            claimed,
            final_name,
            last_size: None,
            exists_left: self.settings.exists_retries.max(1),
            stable_left: self.settings.size_stable_retries.max(1),
        })
    }

    async fn poll_size(
        &mut self,
        claimed: String,
        final_name: String,
        last_size: Option<u64>,
        mut exists_left: u32,
        mut stable_left: u32,
    ) -> Result<WatchState, WatchError> {
        self.pacer.pause().await;
        self.polls += 1;

        let transient_size = self.file_size(&claimed).await?;
        let final_size = if claimed == final_name {
            transient_size
        } else {
            self.file_size(&final_name).await?
        };

        let size = match transient_size {
            Some(size) => Some(size),
            None => {
                exists_left = exists_left.saturating_sub(1);
                final_size
            }
        };

        let unchanged = size.is_some() && size == last_size;
        if final_size.is_some() && unchanged {
            tracing::debug!(file = %final_name, size = ?size, polls = self.polls, "download stabilized");
            return Ok(WatchState::Stabilized { final_name });
        }

        if unchanged {
            stable_left = stable_left.saturating_sub(1);
        } else {
            stable_left = self.settings.size_stable_retries.max(1);
        }

        if stable_left == 0 || exists_left == 0 {
            tracing::debug!(
                file = %claimed,
                exists_left,
                stable_left,
                polls = self.polls,
                "download did not complete"
            );
            return Ok(WatchState::TimedOut {
                phase: TimeoutPhase::Completion,
                name: Some(claimed),
            });
        }

        Ok(WatchState::MonitoringSize {
            claimed,
            final_name,
            last_size: size,
            exists_left,
            stable_left,
        })
    }

    /// Drive the watch to a terminal state, then move the finished file into
    /// `destination`. Returns the relocated path.
    pub async fn run(mut self, destination: &Path) -> Result<PathBuf, WatchError> {
        while !self.state.is_terminal() {
            self.step().await?;
        }

        match &self.state {
            WatchState::Stabilized { final_name } => {
                // The claim is held across the move so no other watch can adopt
                // the finished file in between.
                let moved = relocate(&self.dir, final_name, destination, &self.reserved)
                    .await
                    .map_err(|source| WatchError::Io {
                        path: self.dir.join(final_name),
                        source,
                    });
                self.claim = None;
                moved
            }
            WatchState::TimedOut { phase, name } => Err(WatchError::DownloadTimeout {
                phase: *phase,
                name: name.clone(),
                polls: self.polls,
            }),
            _ => unreachable!("loop exits only on a terminal state"),
        }
    }

    async fn list_entries(&self) -> Result<Vec<String>, WatchError> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(source) => {
                return Err(WatchError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    // Directories never become downloads; files that vanish mid-listing are skipped.
                    match entry.file_type().await {
                        Ok(kind) if !kind.is_dir() => entries.push(entry.file_name().to_string_lossy().into_owned()),
                        _ => {}
                    }
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(WatchError::Io {
                        path: self.dir.clone(),
                        source,
                    })
                }
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn file_size(&self, name: &str) -> Result<Option<u64>, WatchError> {
        let path = self.dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(WatchError::Io { path, source }),
        }
    }
}
