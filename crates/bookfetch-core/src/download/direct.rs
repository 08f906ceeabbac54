//! Direct retrieval with a single GET (libcurl).
//!
//! The body is streamed into `<name>.part` next to the final file and renamed
//! only after a successful response, so an interrupted transfer never leaves a
//! file that looks finished.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use super::Fetcher;
use crate::catalog::MirrorLocation;
use crate::naming::sanitize_filename;

/// Transfer limits for [`CurlFetcher`].
#[derive(Debug, Clone, Copy)]
pub struct CurlFetcher {
    pub connect_timeout: Duration,
    /// Abort when the rate stays below 1 KiB/s for this long.
    pub low_speed_time: Duration,
    pub timeout: Duration,
}

impl Default for CurlFetcher {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_time: Duration::from_secs(60),
            timeout: Duration::from_secs(3600),
        }
    }
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, location: &MirrorLocation, destination: &Path, file_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(destination)
            .with_context(|| format!("create destination: {}", destination.display()))?;
        let final_path = destination.join(sanitize_filename(file_name));
        let part_path = part_path(&final_path);

        match self.download_to(&location.url, &part_path) {
            Ok(written) => {
                std::fs::rename(&part_path, &final_path)
                    .with_context(|| format!("finalize {}", final_path.display()))?;
                tracing::info!(bytes = written, file = %final_path.display(), "fetched");
                Ok(final_path)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&part_path);
                Err(e)
            }
        }
    }
}

impl CurlFetcher {
    fn download_to(&self, url: &str, part_path: &Path) -> Result<u64> {
        let mut file =
            File::create(part_path).with_context(|| format!("create temp file: {}", part_path.display()))?;
        let mut written = 0u64;
        let mut write_err: Option<std::io::Error> = None;

        let mut easy = curl::easy::Easy::new();
        easy.url(url).context("invalid URL")?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(self.low_speed_time)?;
        easy.timeout(self.timeout)?;

        let performed = {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| match file.write_all(data) {
                Ok(()) => {
                    written += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    write_err = Some(e);
                    Ok(0) // abort transfer
                }
            })?;
            transfer.perform()
        };
        if let Some(e) = write_err {
            return Err(e).with_context(|| format!("write {}", part_path.display()));
        }
        performed.context("GET request failed")?;

        // file:// and other non-HTTP schemes report 0.
        let code = easy.response_code().context("no response code")?;
        if code != 0 && !(200..300).contains(&code) {
            anyhow::bail!("GET {} returned HTTP {}", url, code);
        }
        file.sync_all()?;
        Ok(written)
    }
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    final_path.with_file_name(name)
}
