//! `bookfetch status` – show the items of a progress document.

use anyhow::Result;
use bookfetch_core::config::BookfetchConfig;
use bookfetch_core::progress::{load_document, Item};

use super::resolve_document;

pub fn run_status(cfg: &BookfetchConfig, document: &str) -> Result<()> {
    let path = resolve_document(cfg, document)?;
    let doc = load_document(&path)?;
    println!("{} ({})", doc.name, doc.key);
    if doc.items.is_empty() {
        println!("No items in document.");
        return Ok(());
    }
    println!("{:<32} {:<9} {:<5} {}", "ITEM", "STATE", "CAND", "TITLE");
    for key in doc.iteration_order() {
        let Some(item) = doc.items.get(&key) else {
            continue;
        };
        println!(
            "{:<32} {:<9} {:<5} {}",
            key,
            state_label(item),
            item.candidates.len(),
            item.title
        );
    }
    let complete = doc.completed_keys().len();
    println!("{} of {} complete", complete, doc.items.len());
    Ok(())
}

fn state_label(item: &Item) -> &'static str {
    if item.skip {
        "skipped"
    } else if item.complete {
        "complete"
    } else if item.candidates.is_empty() {
        "new"
    } else {
        "pending"
    }
}
