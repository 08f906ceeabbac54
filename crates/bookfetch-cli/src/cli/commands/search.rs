//! `bookfetch search` – download books named on the command line.

use std::sync::Arc;

use anyhow::Result;
use bookfetch_core::config::BookfetchConfig;
use bookfetch_core::progress::{document_path, ProgressDocument, ProgressStore};

use super::parse_book;
use super::run::{print_report, run_store};

pub async fn run_search(cfg: &BookfetchConfig, books: &[String]) -> Result<()> {
    let searches = books
        .iter()
        .map(|b| parse_book(b))
        .collect::<Result<Vec<_>>>()?;
    let doc = ProgressDocument::ad_hoc(searches.iter().map(|(t, a)| (t.as_str(), a.as_str())));
    let path = document_path(&cfg.output_root()?, &doc.key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(ProgressStore::create(&path, doc)?);
    println!("Saved search document {}", path.display());

    let report = run_store(cfg, store).await?;
    print_report(&report);
    Ok(())
}
