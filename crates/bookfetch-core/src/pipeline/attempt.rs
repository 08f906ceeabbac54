//! One candidate attempt: resolve, admit, download, consume.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::DownloadOrchestrator;
use crate::catalog::choose_mirror;
use crate::download::DownloadBackend;
use crate::progress::{Candidate, StoreError};
use crate::watcher::{CompletionWatcher, IntervalPacer};

impl DownloadOrchestrator {
    /// Download one candidate and remove it from the item on success.
    ///
    /// The admission permit is held from trigger to consumption and is
    /// returned on every path out of this function.
    pub(super) async fn attempt(&self, item_key: &str, candidate_key: &str, candidate: Candidate) -> Result<PathBuf> {
        let catalog = Arc::clone(&self.catalog);
        let lookup = candidate.clone();
        let mirrors = tokio::task::spawn_blocking(move || catalog.resolve_download(&lookup))
            .await
            .context("resolve task join")??;
        let location = choose_mirror(&mirrors, self.preferred_mirror.as_deref())
            .cloned()
            .with_context(|| format!("no mirror for candidate {}", candidate_key))?;

        let permit = self.admission.acquire().await;
        tracing::debug!(
            item = %item_key,
            candidate = %candidate_key,
            url = %location.url,
            in_flight = self.admission.in_use(),
            "download admitted"
        );

        let path = match &self.backend {
            DownloadBackend::Direct(fetcher) => {
                // Held until the fetch has renamed its part file into place.
                let reservation = self
                    .reserved
                    .reserve(&self.destination, &file_name_for(candidate_key, &candidate));
                let fetcher = Arc::clone(fetcher);
                let destination = self.destination.clone();
                let file_name = reservation.file_name().to_string();
                let path = tokio::task::spawn_blocking(move || fetcher.fetch(&location, &destination, &file_name))
                    .await
                    .context("fetch task join")??;
                drop(reservation);
                path
            }
            DownloadBackend::Triggered {
                agent,
                watch_dir,
                watch,
            } => {
                let agent = Arc::clone(agent);
                tokio::task::spawn_blocking(move || agent.initiate(&location))
                    .await
                    .context("trigger task join")??;
                let pacer = IntervalPacer::new(watch.poll_interval);
                CompletionWatcher::new(watch_dir.clone(), watch.clone(), self.claims.clone(), pacer)
                    .with_reserved_names(self.reserved.clone())
                    .run(&self.destination)
                    .await?
            }
        };

        self.consume(item_key, candidate_key).await?;
        permit.release();
        Ok(path)
    }

    async fn consume(&self, item_key: &str, candidate_key: &str) -> Result<()> {
        let (item, candidate) = (item_key.to_string(), candidate_key.to_string());
        match self
            .store_op(move |store| store.mark_candidate_consumed(&item, &candidate))
            .await
        {
            Ok(true) => {
                tracing::info!(item = %item_key, "item complete");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) if e.downcast_ref::<StoreError>().is_some_and(StoreError::is_benign) => {
                // A fresh search or skip already changed the item; the file is kept.
                tracing::info!(item = %item_key, candidate = %candidate_key, "{}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Download name: candidate title (or its key) plus its extension.
fn file_name_for(candidate_key: &str, candidate: &Candidate) -> String {
    let stem = if candidate.title.trim().is_empty() {
        candidate_key
    } else {
        candidate.title.as_str()
    };
    let extension = candidate.extension.trim().trim_start_matches('.');
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, extension: &str) -> Candidate {
        Candidate {
            title: title.into(),
            author: String::new(),
            publisher: String::new(),
            extension: extension.into(),
            locator: "loc".into(),
        }
    }

    #[test]
    fn file_name_uses_title_and_extension() {
        assert_eq!(file_name_for("abc", &candidate("The Book", "epub")), "The Book.epub");
        assert_eq!(file_name_for("abc", &candidate("The Book", ".PDF")), "The Book.PDF");
        assert_eq!(file_name_for("abc", &candidate("  ", "mobi")), "abc.mobi");
        assert_eq!(file_name_for("abc", &candidate("Plain", "")), "Plain");
    }
}
