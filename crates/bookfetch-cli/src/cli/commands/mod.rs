//! CLI command handlers, one file per subcommand.

mod run;
mod search;
mod skip;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bookfetch_core::catalog::{Catalog, HttpJsonCatalog};
use bookfetch_core::config::BookfetchConfig;
use bookfetch_core::progress::document_path;

pub use run::run_document;
pub use search::run_search;
pub use skip::run_skip;
pub use status::run_status;

/// `arg` as a path when it names an existing file, otherwise as a document
/// key under the output directory.
pub(crate) fn resolve_document(cfg: &BookfetchConfig, arg: &str) -> Result<PathBuf> {
    let direct = Path::new(arg);
    if direct.is_file() {
        return Ok(direct.to_path_buf());
    }
    let keyed = document_path(&cfg.output_root()?, arg.trim_end_matches(".json"));
    if keyed.is_file() {
        return Ok(keyed);
    }
    anyhow::bail!("no progress document at {} or {}", direct.display(), keyed.display())
}

pub(crate) fn open_catalog(cfg: &BookfetchConfig) -> Result<Arc<dyn Catalog>> {
    let url = cfg
        .catalog_url
        .as_deref()
        .context("catalog_url is not set in the config file")?;
    Ok(Arc::new(HttpJsonCatalog::new(url)?))
}

/// Splits `"Title|Author"`; the author part is optional.
pub(crate) fn parse_book(raw: &str) -> Result<(String, String)> {
    let (title, author) = match raw.split_once('|') {
        Some((title, author)) => (title.trim(), author.trim()),
        None => (raw.trim(), ""),
    };
    if title.is_empty() {
        anyhow::bail!("book {:?} has no title", raw);
    }
    Ok((title.to_string(), author.to_string()))
}
