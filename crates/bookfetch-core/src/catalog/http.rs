//! JSON-over-HTTP catalog client (libcurl).
//!
//! `GET <base>/search?title=<title>` answers `{ "<fingerprint>": Candidate, ... }`;
//! `GET <locator>` answers a JSON array of mirror URLs. Relative locators are
//! resolved against the base URL.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use super::{CatalogError, CatalogResolve, CatalogSearch, MirrorLocation};
use crate::progress::Candidate;

/// Upper bound on a catalog response body.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpJsonCatalog {
    base: Url,
}

impl HttpJsonCatalog {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid catalog URL: {}", base_url))?;
        Ok(Self { base })
    }

    fn search_url(&self, title: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("catalog URL cannot be a base: {}", self.base))?
            .pop_if_empty()
            .push("search");
        url.query_pairs_mut().append_pair("title", title);
        Ok(url)
    }

    fn locator_url(&self, locator: &str) -> Result<Url> {
        self.base
            .join(locator)
            .with_context(|| format!("invalid locator: {}", locator))
    }
}

impl CatalogSearch for HttpJsonCatalog {
    fn search(&self, title: &str) -> Result<BTreeMap<String, Candidate>, CatalogError> {
        let run = || -> Result<BTreeMap<String, Candidate>> {
            let url = self.search_url(title)?;
            let body = http_get(url.as_str())?;
            parse_search(&body)
        };
        let found = run().map_err(|e| CatalogError::unavailable("search", e))?;
        tracing::debug!(title, results = found.len(), "catalog search");
        Ok(found)
    }
}

impl CatalogResolve for HttpJsonCatalog {
    fn resolve_download(&self, candidate: &Candidate) -> Result<Vec<MirrorLocation>, CatalogError> {
        let run = || -> Result<Vec<MirrorLocation>> {
            let url = self.locator_url(&candidate.locator)?;
            let body = http_get(url.as_str())?;
            parse_mirrors(&body)
        };
        run().map_err(|e| CatalogError::unavailable("resolve", e))
    }
}

fn parse_search(body: &[u8]) -> Result<BTreeMap<String, Candidate>> {
    serde_json::from_slice(body).context("parse search response")
}

fn parse_mirrors(body: &[u8]) -> Result<Vec<MirrorLocation>> {
    let urls: Vec<String> = serde_json::from_slice(body).context("parse mirror list")?;
    Ok(urls
        .into_iter()
        .filter(|u| !u.trim().is_empty())
        .map(MirrorLocation::new)
        .collect())
}

/// GET `url` and return the body. Non-2xx responses are errors.
/// Runs in the current thread.
fn http_get(url: &str) -> Result<Vec<u8>> {
    let mut body = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(60))?;
    easy.useragent(concat!("bookfetch/", env!("CARGO_PKG_VERSION")))?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            if body.len() + data.len() > MAX_BODY_BYTES {
                return Ok(0); // abort transfer
            }
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform().context("GET request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("GET {} returned HTTP {}", url, code);
    }
    Ok(body)
}
