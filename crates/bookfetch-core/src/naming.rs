//! Safe names for item keys and downloaded files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Maximum characters kept from a file stem.
pub const MAX_STEM_CHARS: usize = 100;

/// Name used when nothing usable survives sanitization.
const DEFAULT_STEM: &str = "download";

/// Lower-cases `text` and collapses every run of characters outside
/// `[a-z0-9]` (plus other alphanumerics) into a single `-`.
///
/// Leading and trailing separators are trimmed and the result is capped at
/// `max_chars` characters (never ending in a separator).
pub fn slugify(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out.trim_end_matches('-').to_string()
}

/// Sanitizes a downloaded file name before it is moved into its destination.
///
/// - the stem is slugified and capped at [`MAX_STEM_CHARS`]
/// - the extension (last `.` segment) is kept, lower-cased and stripped to alphanumerics
/// - an empty stem becomes `download`
pub fn sanitize_filename(name: &str) -> String {
    let trimmed = name.trim().trim_matches('.');
    let (stem, ext) = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (trimmed, None),
    };

    let mut stem = slugify(stem, MAX_STEM_CHARS);
    if stem.is_empty() {
        stem = DEFAULT_STEM.to_string();
    }

    let ext: String = ext
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if ext.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, ext)
    }
}

/// `name` (already sanitized) with `-<n>` appended to its stem.
///
/// The stem is shortened so the result still fits [`MAX_STEM_CHARS`] and
/// sanitizing it again leaves it unchanged.
pub fn numbered_name(name: &str, n: usize) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let suffix = format!("-{}", n);
    let room = MAX_STEM_CHARS.saturating_sub(suffix.len());
    let kept: String = stem.chars().take(room).collect();
    let mut stem = kept.trim_end_matches('-').to_string();
    if stem.is_empty() {
        stem = DEFAULT_STEM.to_string();
    }
    match ext {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", stem, suffix),
    }
}

/// Destination paths handed out to downloads that are still being written.
///
/// A path is free when no live [`Reservation`] holds it and nothing exists
/// there on disk; otherwise the stem gets `-1`, `-2`, ... until one is free.
/// Clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct ReservedNames {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ReservedNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a free path in `dir` for `file_name` (sanitized first).
    pub fn reserve(&self, dir: &Path, file_name: &str) -> Reservation {
        let base = sanitize_filename(file_name);
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        let mut n = 0;
        loop {
            let name = if n == 0 { base.clone() } else { numbered_name(&base, n) };
            let path = dir.join(&name);
            if !paths.contains(&path) && !path.exists() {
                paths.insert(path.clone());
                if n > 0 {
                    tracing::debug!(wanted = %base, file = %name, "destination name taken, numbered");
                }
                return Reservation {
                    name,
                    path,
                    registry: self.clone(),
                };
            }
            n += 1;
        }
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    fn release(&self, path: &Path) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }
}

/// A reserved destination path; hold it until the file is in place there.
#[derive(Debug)]
pub struct Reservation {
    name: String,
    path: PathBuf,
    registry: ReservedNames,
}

impl Reservation {
    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.registry.release(&self.path);
    }
}
