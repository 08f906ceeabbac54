//! Search phase: make sure an item has candidates before any attempt starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::{DownloadOrchestrator, RunReport};
use crate::matcher::{filter_candidates, MatchTarget};
use crate::progress::Candidate;

impl DownloadOrchestrator {
    /// Candidates to attempt for `key`.
    ///
    /// Settled items yield nothing. Cached candidates are returned as they are;
    /// otherwise the catalog is searched and the filtered result is persisted
    /// before returning. A search that finds nothing completes the item. A
    /// catalog failure leaves the item untouched and yields nothing.
    pub(super) async fn prepare(&self, key: &str, report: &mut RunReport) -> Result<BTreeMap<String, Candidate>> {
        let Some(item) = self.store.item(key) else {
            tracing::debug!(item = %key, "item vanished from document");
            return Ok(BTreeMap::new());
        };
        if item.is_settled() {
            report.settled += 1;
            return Ok(BTreeMap::new());
        }
        if !item.candidates.is_empty() {
            tracing::debug!(item = %key, cached = item.candidates.len(), "using cached candidates");
            return Ok(item.candidates);
        }

        let catalog = Arc::clone(&self.catalog);
        let title = item.title.clone();
        let searched = tokio::task::spawn_blocking(move || catalog.search(&title))
            .await
            .context("search task join")?;
        report.searched += 1;
        let found = match searched {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(item = %key, title = %item.title, "search failed: {}", e);
                report.search_failures.push(key.to_string());
                return Ok(BTreeMap::new());
            }
        };

        let target = MatchTarget {
            title: &item.title,
            author: &item.author,
        };
        let matched = filter_candidates(target, &found, &self.options);
        tracing::info!(
            item = %key,
            title = %item.title,
            results = found.len(),
            matched = matched.len(),
            "searched"
        );

        let item_key = key.to_string();
        let stored = matched.clone();
        self.store_op(move |store| {
            let empty = stored.is_empty();
            store.set_candidates(&item_key, stored)?;
            if empty {
                store.mark_all_complete(&item_key, true)?;
            }
            Ok(())
        })
        .await
        .with_context(|| format!("persist search result for {}", key))?;

        Ok(matched)
    }
}
