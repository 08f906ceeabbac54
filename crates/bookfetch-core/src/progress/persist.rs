//! Persist a ProgressDocument as JSON with crash-consistent replacement.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::model::ProgressDocument;

/// Default location of a document inside an output root: `<root>/<key>.json`.
pub fn document_path(output_root: &Path, key: &str) -> PathBuf {
    output_root.join(format!("{}.json", key))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".tmp");
    PathBuf::from(o)
}

/// Write `doc` to `path`: serialize, write `<path>.tmp`, fsync, rename over
/// `path`, then fsync the parent directory so the rename itself is durable.
///
/// A crash leaves either the previous file or the new one, never a torn write.
pub fn save_document(doc: &ProgressDocument, path: &Path) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(doc)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_parent(path)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::File::open(parent)?.sync_all()
}

/// Directory handles cannot be synced here; the rename is as durable as the platform makes it.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Load and validate a document. Missing, unparseable or inconsistent files are errors.
pub fn load_document(path: &Path) -> Result<ProgressDocument> {
    let bytes = fs::read(path).with_context(|| format!("read progress document: {}", path.display()))?;
    let mut doc: ProgressDocument = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse progress document: {}", path.display()))?;
    doc.validate()
        .map_err(|msg| anyhow::anyhow!("invalid progress document {}: {}", path.display(), msg))?;
    doc.origin_from_cache = true;
    Ok(doc)
}
