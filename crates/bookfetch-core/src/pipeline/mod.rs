//! Download orchestration over one progress document.
//!
//! For every item (in document order) the orchestrator makes sure candidates
//! are known, searching the catalog and persisting the filtered result first,
//! then submits one attempt per remaining candidate to a bounded task pool.
//! An attempt resolves the candidate, waits for an admission permit, hands the
//! mirror to the configured backend and, once a file exists, consumes the
//! candidate in the store. Failures stay local to their item or candidate.

mod attempt;
mod report;
mod search;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::{JoinError, JoinSet};

use crate::admission::AdmissionController;
use crate::catalog::Catalog;
use crate::config::BookfetchConfig;
use crate::download::DownloadBackend;
use crate::matcher::MatchOptions;
use crate::naming::ReservedNames;
use crate::progress::{ProgressStore, StoreError};
use crate::watcher::{ClaimedNames, WatchError};

pub use report::{Downloaded, FailedAttempt, RunReport};

type AttemptResult = (String, String, Result<PathBuf>);

/// Drives a document's outstanding candidates to completion.
///
/// Cheap to clone; clones share the store, the permit pool, the
/// claimed-names registry and the destination-name reservations.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    store: Arc<ProgressStore>,
    catalog: Arc<dyn Catalog>,
    backend: DownloadBackend,
    admission: Arc<AdmissionController>,
    claims: ClaimedNames,
    reserved: ReservedNames,
    destination: PathBuf,
    options: Arc<MatchOptions>,
    preferred_mirror: Option<String>,
    workers: usize,
}

impl DownloadOrchestrator {
    /// Files land in `destination`; defaults: 2 permits, 4 workers, default matching.
    pub fn new(
        store: Arc<ProgressStore>,
        catalog: Arc<dyn Catalog>,
        backend: DownloadBackend,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            catalog,
            backend,
            admission: Arc::new(AdmissionController::new(2)),
            claims: ClaimedNames::new(),
            reserved: ReservedNames::new(),
            destination: destination.into(),
            options: Arc::new(MatchOptions::default()),
            preferred_mirror: None,
            workers: 4,
        }
    }

    /// Orchestrator for `store` as configured: backend, limits and matching
    /// from `cfg`, files under `<output_dir>/<document key>`.
    pub fn from_config(cfg: &BookfetchConfig, store: Arc<ProgressStore>, catalog: Arc<dyn Catalog>) -> Result<Self> {
        let backend = DownloadBackend::from_config(cfg)?;
        let destination = cfg.output_root()?.join(store.snapshot().key);
        Ok(Self::new(store, catalog, backend, destination)
            .with_admission(Arc::new(AdmissionController::new(cfg.max_concurrent_downloads)))
            .with_match_options(cfg.match_options())
            .with_preferred_mirror(cfg.preferred_mirror.clone())
            .with_workers(cfg.workers))
    }

    pub fn with_admission(mut self, admission: Arc<AdmissionController>) -> Self {
        self.admission = admission;
        self
    }

    /// Share a claimed-names registry with other pipelines watching the same directory.
    pub fn with_claims(mut self, claims: ClaimedNames) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn with_preferred_mirror(mut self, hint: Option<String>) -> Self {
        self.preferred_mirror = hint;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Process every item of the document and wait for all attempts.
    pub async fn run(&self) -> Result<RunReport> {
        let order = self.store.snapshot().iteration_order();
        tracing::info!(
            document = %self.store.path().display(),
            items = order.len(),
            backend = ?self.backend.kind(),
            permits = self.admission.capacity(),
            workers = self.workers,
            "run started"
        );
        self.prepare_watch_dir().await?;

        let mut report = RunReport::default();
        let mut attempts = JoinSet::new();
        for key in order {
            self.submit_item(&key, &mut attempts, &mut report).await;
        }
        drain(&mut attempts, 0, &mut report).await;

        report.completed = self.store.snapshot().completed_keys();
        tracing::info!("run finished: {}", report);
        Ok(report)
    }

    /// Drive a single item: search if needed, then attempt every candidate.
    pub async fn process_item(&self, key: &str) -> Result<RunReport> {
        self.prepare_watch_dir().await?;
        let mut report = RunReport::default();
        let mut attempts = JoinSet::new();
        self.submit_item(key, &mut attempts, &mut report).await;
        drain(&mut attempts, 0, &mut report).await;

        if self.store.item(key).is_some_and(|item| item.complete) {
            report.completed.push(key.to_string());
        }
        Ok(report)
    }

    async fn submit_item(&self, key: &str, attempts: &mut JoinSet<AttemptResult>, report: &mut RunReport) {
        let mut prepared = RunReport::default();
        let candidates = match self.prepare(key, &mut prepared).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(item = %key, "item skipped: {:#}", e);
                BTreeMap::new()
            }
        };
        report.merge(prepared);

        for (candidate_key, candidate) in candidates {
            drain(attempts, self.workers, report).await;
            let this = self.clone();
            let item_key = key.to_string();
            attempts.spawn(async move {
                let outcome = this.attempt(&item_key, &candidate_key, candidate).await;
                (item_key, candidate_key, outcome)
            });
        }
    }

    async fn prepare_watch_dir(&self) -> Result<()> {
        if let DownloadBackend::Triggered { watch_dir, .. } = &self.backend {
            tokio::fs::create_dir_all(watch_dir)
                .await
                .with_context(|| format!("create watch dir: {}", watch_dir.display()))?;
        }
        Ok(())
    }

    /// Run a store operation on the blocking pool; it may fsync.
    async fn store_op<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ProgressStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let out = tokio::task::spawn_blocking(move || op(&store))
            .await
            .context("store task join")??;
        Ok(out)
    }
}

/// Wait for attempts until fewer than `limit` are running (`0`: until none are).
async fn drain(attempts: &mut JoinSet<AttemptResult>, limit: usize, report: &mut RunReport) {
    while !attempts.is_empty() && (limit == 0 || attempts.len() >= limit) {
        let Some(joined) = attempts.join_next().await else {
            break;
        };
        record(joined, report);
    }
}

fn record(joined: Result<AttemptResult, JoinError>, report: &mut RunReport) {
    match joined {
        Ok((item, candidate, Ok(path))) => {
            tracing::info!(item = %item, candidate = %candidate, file = %path.display(), "downloaded");
            report.downloaded.push(Downloaded { item, candidate, path });
        }
        Ok((item, candidate, Err(e))) => {
            let timed_out = e.downcast_ref::<WatchError>().is_some_and(WatchError::is_timeout);
            tracing::warn!(item = %item, candidate = %candidate, timed_out, "attempt failed: {:#}", e);
            report.failed.push(FailedAttempt {
                item,
                candidate,
                reason: format!("{:#}", e),
                timed_out,
            });
        }
        Err(e) => tracing::error!("attempt task failed: {}", e),
    }
}

#[cfg(test)]
mod tests;
