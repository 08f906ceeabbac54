//! `bookfetch skip` – exclude an item from future runs.

use anyhow::Result;
use bookfetch_core::config::BookfetchConfig;
use bookfetch_core::progress::ProgressStore;

use super::resolve_document;

pub fn run_skip(cfg: &BookfetchConfig, document: &str, item: &str) -> Result<()> {
    let path = resolve_document(cfg, document)?;
    let store = ProgressStore::open(&path)?;
    store.set_skip(item, true)?;
    store.mark_all_complete(item, true)?;
    println!("Skipped {} in {}", item, path.display());
    Ok(())
}
