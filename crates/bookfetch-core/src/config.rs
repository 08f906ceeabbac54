use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::matcher::{EmptyTargetPolicy, MatchOptions};
use crate::watcher::WatchSettings;

/// Longest accepted delay between two polls of the watched directory.
pub const MAX_POLL_INTERVAL_SECS: f64 = 3600.0;

/// Completion watcher tuning (optional `[watch]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Delay between two polls of the watched directory, in seconds.
    pub poll_interval_secs: f64,
    /// Polls spent waiting for a new, unclaimed file to appear.
    pub arrival_retries: u32,
    /// Polls tolerated while the transient download file is missing.
    pub exists_retries: u32,
    /// Polls tolerated with an unchanged size before giving up; reset on growth.
    pub size_stable_retries: u32,
    /// Suffix the agent appends to files that are still being written.
    pub transient_suffix: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3.0,
            arrival_retries: 10,
            exists_retries: 10,
            size_stable_retries: 200,
            transient_suffix: ".opdownload".to_string(),
        }
    }
}

/// Candidate filter tuning (optional `[matcher]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Target-title words allowed to be missing from a candidate title.
    pub mismatch_budget: usize,
    /// File extensions worth downloading, lower-case without the dot.
    pub accepted_extensions: Vec<String>,
    /// What to do when the target title has no usable words.
    #[serde(default)]
    pub on_empty_target: EmptyTargetPolicy,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            mismatch_budget: 3,
            accepted_extensions: vec!["epub".into(), "mobi".into(), "pdf".into()],
            on_empty_target: EmptyTargetPolicy::AcceptAll,
        }
    }
}

/// How a resolved location turns into a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Fetch bytes ourselves (curl).
    #[default]
    Direct,
    /// Hand the location to an external agent and watch the download directory.
    Triggered,
}

/// Global configuration loaded from `~/.config/bookfetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookfetchConfig {
    /// Root for progress documents and downloaded files (None = `~/bookfetch`).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Directory the external agent downloads into (None = `<output_dir>/.incoming`).
    #[serde(default)]
    pub watch_dir: Option<PathBuf>,
    /// Maximum downloads in flight at once.
    pub max_concurrent_downloads: usize,
    /// Size of the task pool; may exceed `max_concurrent_downloads`.
    pub workers: usize,
    /// Download backend: "direct" (default) or "triggered".
    #[serde(default)]
    pub download_backend: BackendKind,
    /// Preferred mirror hint, matched as a substring of the mirror URL.
    #[serde(default)]
    pub preferred_mirror: Option<String>,
    /// Command line for the triggered backend; `{url}` is replaced by the location.
    #[serde(default)]
    pub agent_command: Option<Vec<String>>,
    /// Base URL of the JSON catalog service.
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
}

impl Default for BookfetchConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            watch_dir: None,
            max_concurrent_downloads: 2,
            workers: 4,
            download_backend: BackendKind::Direct,
            preferred_mirror: None,
            agent_command: None,
            catalog_url: None,
            watch: WatchConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl BookfetchConfig {
    /// Clamp counters to usable minimums so a zero in the file cannot stall the pipeline.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent_downloads = self.max_concurrent_downloads.max(1);
        self.workers = self.workers.max(1);
        self.watch.arrival_retries = self.watch.arrival_retries.max(1);
        self.watch.exists_retries = self.watch.exists_retries.max(1);
        self.watch.size_stable_retries = self.watch.size_stable_retries.max(1);
        self.watch.poll_interval_secs = poll_interval(self.watch.poll_interval_secs).as_secs_f64();
        self
    }

    /// Output root, falling back to `~/bookfetch`.
    pub fn output_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.output_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME").context("HOME is not set and no output_dir configured")?;
        Ok(PathBuf::from(home).join("bookfetch"))
    }

    /// Directory watched for agent-triggered downloads.
    pub fn watch_root(&self) -> Result<PathBuf> {
        match &self.watch_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.output_root()?.join(".incoming")),
        }
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            mismatch_budget: self.matcher.mismatch_budget,
            accepted_extensions: self
                .matcher
                .accepted_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            on_empty_target: self.matcher.on_empty_target,
        }
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            poll_interval: poll_interval(self.watch.poll_interval_secs),
            arrival_retries: self.watch.arrival_retries,
            exists_retries: self.watch.exists_retries,
            size_stable_retries: self.watch.size_stable_retries,
            transient_suffix: self.watch.transient_suffix.clone(),
        }
    }
}

/// Poll delay for a configured value: negative or non-finite values fall back
/// to the default, large ones are capped at [`MAX_POLL_INTERVAL_SECS`].
fn poll_interval(secs: f64) -> Duration {
    if !secs.is_finite() || secs < 0.0 {
        return Duration::from_secs_f64(WatchConfig::default().poll_interval_secs);
    }
    Duration::from_secs_f64(secs.min(MAX_POLL_INTERVAL_SECS))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bookfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BookfetchConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<BookfetchConfig> {
    if !path.exists() {
        let default_cfg = BookfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: BookfetchConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = BookfetchConfig::default();
        assert_eq!(cfg.max_concurrent_downloads, 2);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.download_backend, BackendKind::Direct);
        assert_eq!(cfg.watch.arrival_retries, 10);
        assert_eq!(cfg.watch.exists_retries, 10);
        assert_eq!(cfg.watch.size_stable_retries, 200);
        assert_eq!(cfg.matcher.mismatch_budget, 3);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = BookfetchConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: BookfetchConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent_downloads, cfg.max_concurrent_downloads);
        assert_eq!(parsed.workers, cfg.workers);
        assert_eq!(parsed.watch.transient_suffix, ".opdownload");
        assert_eq!(parsed.matcher.accepted_extensions, cfg.matcher.accepted_extensions);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            max_concurrent_downloads = 3
            workers = 8
            download_backend = "triggered"
            preferred_mirror = "library.lol"
            agent_command = ["firefox", "{url}"]

            [watch]
            poll_interval_secs = 0.5
            arrival_retries = 4
            exists_retries = 5
            size_stable_retries = 6
            transient_suffix = ".crdownload"

            [matcher]
            mismatch_budget = 1
            accepted_extensions = ["epub"]
            on_empty_target = "reject_all"
        "#;
        let cfg: BookfetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.max_concurrent_downloads, 3);
        assert_eq!(cfg.download_backend, BackendKind::Triggered);
        assert_eq!(cfg.preferred_mirror.as_deref(), Some("library.lol"));
        assert_eq!(cfg.agent_command.as_ref().unwrap().len(), 2);
        let watch = cfg.watch_settings();
        assert_eq!(watch.poll_interval, Duration::from_millis(500));
        assert_eq!(watch.arrival_retries, 4);
        assert_eq!(watch.transient_suffix, ".crdownload");
        let opts = cfg.match_options();
        assert_eq!(opts.mismatch_budget, 1);
        assert_eq!(opts.on_empty_target, EmptyTargetPolicy::RejectAll);
        assert!(opts.accepted_extensions.contains("epub"));
    }

    #[test]
    fn missing_sections_use_defaults() {
        let toml = r#"
            max_concurrent_downloads = 1
            workers = 2
        "#;
        let cfg: BookfetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.watch.size_stable_retries, 200);
        assert_eq!(cfg.matcher.on_empty_target, EmptyTargetPolicy::AcceptAll);
        assert!(cfg.output_dir.is_none());
    }

    #[test]
    fn normalized_clamps_zero_counters() {
        let mut cfg = BookfetchConfig::default();
        cfg.max_concurrent_downloads = 0;
        cfg.workers = 0;
        cfg.watch.arrival_retries = 0;
        let cfg = cfg.normalized();
        assert_eq!(cfg.max_concurrent_downloads, 1);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.watch.arrival_retries, 1);
    }

    #[test]
    fn poll_interval_is_capped_and_sanitized() {
        let mut cfg = BookfetchConfig::default();
        cfg.watch.poll_interval_secs = 1e300;
        assert_eq!(cfg.watch_settings().poll_interval, Duration::from_secs(3600));
        assert_eq!(cfg.clone().normalized().watch.poll_interval_secs, MAX_POLL_INTERVAL_SECS);

        cfg.watch.poll_interval_secs = f64::NAN;
        assert_eq!(cfg.watch_settings().poll_interval, Duration::from_secs(3));
        cfg.watch.poll_interval_secs = -1.0;
        assert_eq!(cfg.normalized().watch.poll_interval_secs, 3.0);
    }

    #[test]
    fn load_or_init_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.max_concurrent_downloads, 2);
        let again = load_or_init_at(&path).unwrap();
        assert_eq!(again.workers, cfg.workers);
    }

    #[test]
    fn watch_root_defaults_under_output_dir() {
        let mut cfg = BookfetchConfig::default();
        cfg.output_dir = Some(PathBuf::from("/srv/books"));
        assert_eq!(cfg.watch_root().unwrap(), PathBuf::from("/srv/books/.incoming"));
    }
}
