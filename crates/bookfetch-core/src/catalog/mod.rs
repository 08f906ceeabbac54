//! Remote content catalog: search by title and resolve a candidate into mirrors.
//!
//! The pipeline only depends on the two traits here and does not know how a
//! particular catalog is scraped or queried. Both are blocking; async callers
//! run them under `spawn_blocking`.

mod http;

use std::collections::BTreeMap;

use crate::progress::Candidate;

pub use http::HttpJsonCatalog;

/// One download location for a resolved candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLocation {
    pub url: String,
}

impl MirrorLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Search or resolve could not be answered. The item keeps whatever
/// candidates it already had.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable ({op}): {reason:#}")]
    Unavailable {
        op: &'static str,
        reason: anyhow::Error,
    },
}

impl CatalogError {
    pub fn unavailable(op: &'static str, reason: impl Into<anyhow::Error>) -> Self {
        CatalogError::Unavailable {
            op,
            reason: reason.into(),
        }
    }
}

/// Finds candidate records for a title. May return an empty map.
pub trait CatalogSearch: Send + Sync {
    fn search(&self, title: &str) -> Result<BTreeMap<String, Candidate>, CatalogError>;
}

/// Turns a stored candidate into its download mirrors.
pub trait CatalogResolve: Send + Sync {
    fn resolve_download(&self, candidate: &Candidate) -> Result<Vec<MirrorLocation>, CatalogError>;
}

/// Both catalog capabilities behind one object.
pub trait Catalog: CatalogSearch + CatalogResolve {}

impl<T: CatalogSearch + CatalogResolve> Catalog for T {}

/// First mirror whose URL contains `preferred`, otherwise the first mirror.
pub fn choose_mirror<'a>(mirrors: &'a [MirrorLocation], preferred: Option<&str>) -> Option<&'a MirrorLocation> {
    let hinted = preferred
        .filter(|hint| !hint.is_empty())
        .and_then(|hint| mirrors.iter().find(|m| m.url.contains(hint)));
    hinted.or_else(|| mirrors.first())
}
