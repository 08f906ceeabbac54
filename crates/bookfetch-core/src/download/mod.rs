//! Download backends: direct retrieval or an externally triggered agent.
//!
//! The orchestrator holds one [`DownloadBackend`] chosen from configuration and
//! never branches on what actually moves the bytes.

mod agent;
mod direct;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::catalog::MirrorLocation;
use crate::config::{BackendKind, BookfetchConfig};
use crate::watcher::WatchSettings;

pub use agent::CommandAgent;
pub use direct::CurlFetcher;

/// Synchronous retrieval of a location into a directory.
pub trait Fetcher: Send + Sync {
    /// Downloads `location` into `destination/<file_name>` (sanitized) and
    /// returns the final path. Blocking.
    fn fetch(&self, location: &MirrorLocation, destination: &Path, file_name: &str) -> Result<PathBuf>;
}

/// Starts a download it cannot observe; bytes later appear in the watched directory.
pub trait DownloadAgent: Send + Sync {
    fn initiate(&self, location: &MirrorLocation) -> Result<()>;
}

/// How a resolved mirror becomes a file.
#[derive(Clone)]
pub enum DownloadBackend {
    /// Bytes are fetched by us; the attempt is final when `fetch` returns.
    Direct(Arc<dyn Fetcher>),
    /// An agent is triggered and a completion watch over `watch_dir` finalizes.
    Triggered {
        agent: Arc<dyn DownloadAgent>,
        watch_dir: PathBuf,
        watch: WatchSettings,
    },
}

impl DownloadBackend {
    pub fn from_config(cfg: &BookfetchConfig) -> Result<Self> {
        match cfg.download_backend {
            BackendKind::Direct => Ok(DownloadBackend::Direct(Arc::new(CurlFetcher::default()))),
            BackendKind::Triggered => {
                let argv = cfg
                    .agent_command
                    .clone()
                    .context("download_backend = \"triggered\" requires agent_command")?;
                let agent = CommandAgent::new(argv)?;
                Ok(DownloadBackend::Triggered {
                    agent: Arc::new(agent),
                    watch_dir: cfg.watch_root()?,
                    watch: cfg.watch_settings(),
                })
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            DownloadBackend::Direct(_) => BackendKind::Direct,
            DownloadBackend::Triggered { .. } => BackendKind::Triggered,
        }
    }
}

impl std::fmt::Debug for DownloadBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadBackend::Direct(_) => f.write_str("Direct"),
            DownloadBackend::Triggered { watch_dir, .. } => f
                .debug_struct("Triggered")
                .field("watch_dir", watch_dir)
                .finish_non_exhaustive(),
        }
    }
}
