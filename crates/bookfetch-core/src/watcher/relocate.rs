//! Move a finished download out of the watched directory.

use std::io;
use std::path::{Path, PathBuf};

use crate::naming::ReservedNames;

/// Moves `dir/name` into `destination` under a sanitized name and returns the new path.
///
/// Uses a rename; when the two directories live on different filesystems the
/// file is copied and the original removed. The target name is reserved in
/// `reserved`, so a file already at the destination (or one being written
/// there) is kept and the moved file gets a numbered name.
pub async fn relocate(dir: &Path, name: &str, destination: &Path, reserved: &ReservedNames) -> io::Result<PathBuf> {
    let source = dir.join(name);
    tokio::fs::create_dir_all(destination).await?;
    let reservation = reserved.reserve(destination, name);
    let target = reservation.path().to_path_buf();

    match tokio::fs::rename(&source, &target).await {
        Ok(()) => {}
        Err(rename_err) => {
            tracing::debug!(
                from = %source.display(),
                to = %target.display(),
                "rename failed ({}), falling back to copy",
                rename_err
            );
            tokio::fs::copy(&source, &target).await?;
            tokio::fs::remove_file(&source).await?;
        }
    }
    Ok(target)
}
