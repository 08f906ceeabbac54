use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::catalog::{CatalogError, CatalogResolve, CatalogSearch, MirrorLocation};
use crate::download::{CurlFetcher, DownloadAgent, Fetcher};
use crate::naming::sanitize_filename;
use crate::progress::{Candidate, Item, ProgressDocument};
use crate::watcher::WatchSettings;

fn candidate(title: &str, extension: &str, locator: &str) -> Candidate {
    Candidate {
        title: title.into(),
        author: String::new(),
        publisher: String::new(),
        extension: extension.into(),
        locator: locator.into(),
    }
}

#[derive(Default)]
struct FakeCatalog {
    results: HashMap<String, BTreeMap<String, Candidate>>,
    unavailable: HashSet<String>,
    searches: AtomicUsize,
}

impl FakeCatalog {
    fn standard() -> Self {
        let mut results = HashMap::new();
        results.insert(
            "The Great Book".to_string(),
            BTreeMap::from([
                ("a".to_string(), candidate("The Great Book Vol 1", "epub", "loc-a")),
                ("b".to_string(), candidate("Unrelated", "pdf", "loc-b")),
                ("c".to_string(), candidate("Great Book", "txt", "loc-c")),
            ]),
        );
        results.insert(
            "Another Story".to_string(),
            BTreeMap::from([
                ("d".to_string(), candidate("Another Story", "pdf", "loc-d")),
                ("e".to_string(), candidate("Another Story Deluxe", "mobi", "loc-e")),
            ]),
        );
        Self {
            results,
            ..Default::default()
        }
    }

    fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl CatalogSearch for FakeCatalog {
    fn search(&self, title: &str) -> Result<BTreeMap<String, Candidate>, CatalogError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.contains(title) {
            return Err(CatalogError::unavailable("search", anyhow::anyhow!("offline")));
        }
        Ok(self.results.get(title).cloned().unwrap_or_default())
    }
}

impl CatalogResolve for FakeCatalog {
    fn resolve_download(&self, candidate: &Candidate) -> Result<Vec<MirrorLocation>, CatalogError> {
        Ok(vec![
            MirrorLocation::new(format!("https://slow.test/{}", candidate.locator)),
            MirrorLocation::new(format!("https://fast.test/{}", candidate.locator)),
        ])
    }
}

/// Returns the same results for every search; locators are mirror URLs already.
struct LocalCatalog {
    results: BTreeMap<String, Candidate>,
}

impl CatalogSearch for LocalCatalog {
    fn search(&self, _title: &str) -> Result<BTreeMap<String, Candidate>, CatalogError> {
        Ok(self.results.clone())
    }
}

impl CatalogResolve for LocalCatalog {
    fn resolve_download(&self, candidate: &Candidate) -> Result<Vec<MirrorLocation>, CatalogError> {
        Ok(vec![MirrorLocation::new(candidate.locator.clone())])
    }
}

/// Writes the mirror URL as file content; fails for locators containing "broken".
#[derive(Default)]
struct FakeFetcher {
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl FakeFetcher {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, location: &MirrorLocation, destination: &Path, file_name: &str) -> anyhow::Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);

        if location.url.contains("broken") {
            anyhow::bail!("HTTP 404 for {}", location.url);
        }
        std::fs::create_dir_all(destination)?;
        let path = destination.join(sanitize_filename(file_name));
        std::fs::write(&path, location.url.as_bytes())?;
        Ok(path)
    }
}

/// Drops a finished file named after the mirror URL into the watched directory.
struct DroppingAgent {
    dir: PathBuf,
}

impl DownloadAgent for DroppingAgent {
    fn initiate(&self, location: &MirrorLocation) -> anyhow::Result<()> {
        let name = location.url.rsplit('/').next().unwrap_or("file");
        std::fs::write(self.dir.join(format!("{}.epub", name)), location.url.as_bytes())?;
        Ok(())
    }
}

/// Never produces anything.
struct SilentAgent;

impl DownloadAgent for SilentAgent {
    fn initiate(&self, _location: &MirrorLocation) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    store: Arc<ProgressStore>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = ProgressDocument::new("Test Bundle", "test-bundle", "https://bundles.test/1");
        doc.insert_item("great", Item::new("The Great Book", "Jane Doe"));
        doc.insert_item("other", Item::new("Another Story", ""));
        doc.ensure_default_tier();
        let store = ProgressStore::create(dir.path().join("test-bundle.json"), doc).unwrap();
        Self {
            dir,
            store: Arc::new(store),
        }
    }

    fn destination(&self) -> PathBuf {
        self.dir.path().join("test-bundle")
    }

    fn direct(&self, catalog: &Arc<FakeCatalog>, fetcher: &Arc<FakeFetcher>) -> DownloadOrchestrator {
        DownloadOrchestrator::new(
            Arc::clone(&self.store),
            catalog.clone(),
            DownloadBackend::Direct(fetcher.clone()),
            self.destination(),
        )
    }

    fn triggered(&self, catalog: &Arc<FakeCatalog>, agent: Arc<dyn DownloadAgent>, arrival_retries: u32) -> DownloadOrchestrator {
        let backend = DownloadBackend::Triggered {
            agent,
            watch_dir: self.watch_dir(),
            watch: WatchSettings {
                poll_interval: Duration::from_millis(1),
                arrival_retries,
                exists_retries: 5,
                size_stable_retries: 5,
                ..WatchSettings::default()
            },
        };
        DownloadOrchestrator::new(Arc::clone(&self.store), catalog.clone(), backend, self.destination())
    }

    fn watch_dir(&self) -> PathBuf {
        self.dir.path().join(".incoming")
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn run_downloads_every_matching_candidate() {
    let fx = Fixture::new();
    let catalog = Arc::new(FakeCatalog::standard());
    let fetcher = Arc::new(FakeFetcher::default());

    let report = fx
        .direct(&catalog, &fetcher)
        .with_preferred_mirror(Some("fast.test".into()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.searched, 2);
    assert_eq!(report.downloaded_count(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(report.completed, vec!["great".to_string(), "other".to_string()]);
    assert_eq!(fetcher.calls(), 3);

    assert_eq!(
        file_names(&fx.destination()),
        vec!["another-story-deluxe.mobi", "another-story.pdf", "the-great-book-vol-1.epub"]
    );
    let body = std::fs::read_to_string(fx.destination().join("another-story.pdf")).unwrap();
    assert_eq!(body, "https://fast.test/loc-d");

    let doc = fx.store.snapshot();
    assert!(doc.items.values().all(|i| i.complete && i.candidates.is_empty()));
}

#[tokio::test]
async fn second_run_downloads_nothing_and_leaves_document_unchanged() {
    let fx = Fixture::new();
    let catalog = Arc::new(FakeCatalog::standard());
    let fetcher = Arc::new(FakeFetcher::default());
    fx.direct(&catalog, &fetcher).run().await.unwrap();
    let first = std::fs::read(fx.store.path()).unwrap();

    let reopened = Arc::new(ProgressStore::open(fx.store.path()).unwrap());
    let again = DownloadOrchestrator::new(
        reopened,
        catalog.clone(),
        DownloadBackend::Direct(fetcher.clone()),
        fx.destination(),
    );
    let report = again.run().await.unwrap();

    assert_eq!(report.downloaded_count(), 0);
    assert_eq!(report.searched, 0);
    assert_eq!(report.settled, 2);
    assert_eq!(catalog.searches(), 2);
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(std::fs::read(fx.store.path()).unwrap(), first);
}

#[tokio::test]
async fn empty_search_completes_the_item() {
    let fx = Fixture::new();
    let mut catalog = FakeCatalog::standard();
    catalog.results.remove("Another Story");
    let catalog = Arc::new(catalog);
    let fetcher = Arc::new(FakeFetcher::default());

    let report = fx.direct(&catalog, &fetcher).run().await.unwrap();

    assert_eq!(report.downloaded_count(), 1);
    let other = fx.store.item("other").unwrap();
    assert!(other.complete);
    assert!(other.candidates.is_empty());
}

#[tokio::test]
async fn unavailable_catalog_only_affects_its_item() {
    let fx = Fixture::new();
    let mut catalog = FakeCatalog::standard();
    catalog.unavailable.insert("The Great Book".into());
    let catalog = Arc::new(catalog);
    let fetcher = Arc::new(FakeFetcher::default());

    let report = fx.direct(&catalog, &fetcher).run().await.unwrap();

    assert_eq!(report.search_failures, vec!["great".to_string()]);
    assert_eq!(report.downloaded_count(), 2);
    assert_eq!(report.completed, vec!["other".to_string()]);
    let great = fx.store.item("great").unwrap();
    assert!(!great.complete);
    assert!(great.candidates.is_empty());
}

#[tokio::test]
async fn failed_fetch_keeps_candidate_and_returns_permit() {
    let fx = Fixture::new();
    let mut catalog = FakeCatalog::standard();
    catalog.results.get_mut("Another Story").unwrap().get_mut("d").unwrap().locator = "broken-d".into();
    let catalog = Arc::new(catalog);
    let fetcher = Arc::new(FakeFetcher::default());
    let orchestrator = fx.direct(&catalog, &fetcher);

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.downloaded_count(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].candidate, "d");
    assert!(!report.failed[0].timed_out);
    assert_eq!(orchestrator.admission().in_use(), 0);

    let other = fx.store.item("other").unwrap();
    assert!(!other.complete);
    assert_eq!(other.candidates.keys().collect::<Vec<_>>(), vec!["d"]);
}

#[tokio::test]
async fn skipped_and_cached_items_are_not_searched() {
    let fx = Fixture::new();
    fx.store.set_skip("other", true).unwrap();
    fx.store
        .set_candidates(
            "great",
            BTreeMap::from([("z".to_string(), candidate("Cached Copy", "pdf", "loc-z"))]),
        )
        .unwrap();
    let catalog = Arc::new(FakeCatalog::standard());
    let fetcher = Arc::new(FakeFetcher::default());

    let report = fx.direct(&catalog, &fetcher).run().await.unwrap();

    assert_eq!(catalog.searches(), 0);
    assert_eq!(report.settled, 1);
    assert_eq!(report.downloaded.len(), 1);
    assert_eq!(report.downloaded[0].candidate, "z");
    assert!(fx.store.item("great").unwrap().complete);
    assert!(!fx.store.item("other").unwrap().complete);
}

#[tokio::test]
async fn downloads_in_flight_never_exceed_permits() {
    let fx = Fixture::new();
    let mut catalog = FakeCatalog::standard();
    let many: BTreeMap<String, Candidate> = (0..6)
        .map(|i| (format!("k{}", i), candidate(&format!("The Great Book part {}", i), "epub", &format!("loc-{}", i))))
        .collect();
    catalog.results.insert("The Great Book".into(), many);
    let catalog = Arc::new(catalog);
    let fetcher = Arc::new(FakeFetcher {
        delay: Duration::from_millis(20),
        ..Default::default()
    });

    let report = fx
        .direct(&catalog, &fetcher)
        .with_admission(Arc::new(AdmissionController::new(2)))
        .with_workers(8)
        .run()
        .await
        .unwrap();

    assert_eq!(report.downloaded_count(), 8);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn process_item_touches_only_that_item() {
    let fx = Fixture::new();
    let catalog = Arc::new(FakeCatalog::standard());
    let fetcher = Arc::new(FakeFetcher::default());

    let report = fx.direct(&catalog, &fetcher).process_item("great").await.unwrap();

    assert_eq!(report.completed, vec!["great".to_string()]);
    assert_eq!(report.downloaded_count(), 1);
    assert_eq!(catalog.searches(), 1);
    assert!(!fx.store.item("other").unwrap().complete);
}

#[tokio::test]
async fn triggered_downloads_are_watched_and_relocated() {
    let fx = Fixture::new();
    let catalog = Arc::new(FakeCatalog::standard());
    let agent = Arc::new(DroppingAgent { dir: fx.watch_dir() });

    let report = fx.triggered(&catalog, agent, 50).run().await.unwrap();

    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.downloaded_count(), 3);
    assert_eq!(
        file_names(&fx.destination()),
        vec!["loc-a.epub", "loc-d.epub", "loc-e.epub"]
    );
    assert!(file_names(&fx.watch_dir()).is_empty());
    assert_eq!(fx.store.snapshot().completed_keys().len(), 2);
}

#[tokio::test]
async fn watcher_timeout_fails_attempt_and_returns_permit() {
    let fx = Fixture::new();
    let catalog = Arc::new(FakeCatalog::standard());
    let orchestrator = fx.triggered(&catalog, Arc::new(SilentAgent), 3);

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.downloaded_count(), 0);
    assert_eq!(report.failed.len(), 3);
    assert!(report.failed.iter().all(|f| f.timed_out));
    assert_eq!(orchestrator.admission().in_use(), 0);
    assert_eq!(orchestrator.admission().available(), 2);

    let great = fx.store.item("great").unwrap();
    assert!(!great.complete);
    assert_eq!(great.candidates.len(), 1);
}

/// Two uploads of "The Great Book" with different contents, served from file:// URLs.
fn same_title_uploads(fx: &Fixture) -> Arc<LocalCatalog> {
    let mut results = BTreeMap::new();
    for (key, body) in [("md5a", "first upload"), ("md5b", "second upload")] {
        let source = fx.dir.path().join(format!("{}.bin", key));
        std::fs::write(&source, body).unwrap();
        let url = url::Url::from_file_path(&source).unwrap();
        results.insert(key.to_string(), candidate("The Great Book", "epub", url.as_str()));
    }
    Arc::new(LocalCatalog { results })
}

#[tokio::test]
async fn same_title_candidates_land_in_distinct_files() {
    // Concurrent attempts, then strictly sequential ones.
    for (permits, workers) in [(2, 4), (1, 1)] {
        let fx = Fixture::new();
        let catalog = same_title_uploads(&fx);

        let report = DownloadOrchestrator::new(
            Arc::clone(&fx.store),
            catalog,
            DownloadBackend::Direct(Arc::new(CurlFetcher::default())),
            fx.destination(),
        )
        .with_admission(Arc::new(AdmissionController::new(permits)))
        .with_workers(workers)
        .process_item("great")
        .await
        .unwrap();

        assert!(report.failed.is_empty(), "permits={}: {:?}", permits, report.failed);
        assert_eq!(report.downloaded_count(), 2);
        assert_eq!(
            file_names(&fx.destination()),
            vec!["the-great-book-1.epub", "the-great-book.epub"]
        );
        let mut bodies: Vec<String> = report
            .downloaded
            .iter()
            .map(|d| std::fs::read_to_string(&d.path).unwrap())
            .collect();
        bodies.sort();
        assert_eq!(bodies, vec!["first upload", "second upload"]);
        assert!(fx.store.item("great").unwrap().complete);
    }
}

#[tokio::test]
async fn persist_failure_while_consuming_is_reported_per_attempt() {
    let fx = Fixture::new();
    fx.store
        .set_candidates(
            "great",
            BTreeMap::from([("a".to_string(), candidate("The Great Book Vol 1", "epub", "loc-a"))]),
        )
        .unwrap();
    fx.store
        .set_candidates(
            "other",
            BTreeMap::from([
                ("d".to_string(), candidate("Another Story", "pdf", "loc-d")),
                ("e".to_string(), candidate("Another Story Deluxe", "mobi", "loc-e")),
            ]),
        )
        .unwrap();
    // A directory in place of the temp file makes every flush fail.
    let blocker = fx.dir.path().join("test-bundle.json.tmp");
    std::fs::create_dir(&blocker).unwrap();
    let catalog = Arc::new(FakeCatalog::standard());
    let fetcher = Arc::new(FakeFetcher::default());
    let orchestrator = fx.direct(&catalog, &fetcher);

    let report = orchestrator.run().await.unwrap();

    assert_eq!(fetcher.calls(), 3);
    assert_eq!(report.downloaded_count(), 0);
    assert_eq!(report.failed.len(), 3);
    assert!(report
        .failed
        .iter()
        .all(|f| f.reason.contains("failed to persist progress document") && !f.timed_out));
    let mut failed_items: Vec<&str> = report.failed.iter().map(|f| f.item.as_str()).collect();
    failed_items.sort();
    assert_eq!(failed_items, vec!["great", "other", "other"]);
    assert_eq!(orchestrator.admission().in_use(), 0);

    // The in-memory document moved on; the file still holds the last good flush.
    assert!(fx.store.item("great").unwrap().complete);
    assert!(fx.store.item("other").unwrap().candidates.is_empty());
    let on_disk = crate::progress::load_document(fx.store.path()).unwrap();
    assert_eq!(on_disk.items["other"].candidates.len(), 2);

    std::fs::remove_dir(&blocker).unwrap();
    fx.store.save().unwrap();
    let reloaded = crate::progress::load_document(fx.store.path()).unwrap();
    assert!(reloaded.items.values().all(|i| i.complete && i.candidates.is_empty()));
}
