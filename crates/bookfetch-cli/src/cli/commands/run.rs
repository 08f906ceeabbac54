//! `bookfetch run` – process a persisted progress document.

use std::sync::Arc;

use anyhow::Result;
use bookfetch_core::config::BookfetchConfig;
use bookfetch_core::pipeline::{DownloadOrchestrator, RunReport};
use bookfetch_core::progress::ProgressStore;

use super::{open_catalog, resolve_document};

pub async fn run_document(cfg: &BookfetchConfig, document: &str) -> Result<()> {
    let path = resolve_document(cfg, document)?;
    let store = Arc::new(ProgressStore::open(&path)?);
    store.ensure_default_tier()?;
    let report = run_store(cfg, store).await?;
    print_report(&report);
    Ok(())
}

/// Run the pipeline configured by `cfg` over `store`.
pub(crate) async fn run_store(cfg: &BookfetchConfig, store: Arc<ProgressStore>) -> Result<RunReport> {
    let catalog = open_catalog(cfg)?;
    let orchestrator = DownloadOrchestrator::from_config(cfg, store, catalog)?;
    println!("Downloading into {}", orchestrator.destination().display());
    orchestrator.run().await
}

pub(crate) fn print_report(report: &RunReport) {
    for done in &report.downloaded {
        println!("  ok    {:<24} {}", done.item, done.path.display());
    }
    for failed in &report.failed {
        println!("  fail  {:<24} {}: {}", failed.item, failed.candidate, failed.reason);
    }
    for item in &report.search_failures {
        println!("  fail  {:<24} search unavailable", item);
    }
    println!("{}", report);
}
