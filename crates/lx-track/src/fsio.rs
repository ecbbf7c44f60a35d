//! Small filesystem helpers

use std::io::{self, Write};

use camino::Utf8Path;

/// Atomically replace `path` with `contents`.
///
/// Writes to a temporary file in the same directory, then renames it into
/// place, so a crashed build never leaves a truncated dependency list
/// behind.
pub(crate) fn atomic_write(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    std::fs::create_dir_all(parent)?;

    // same directory, so the rename stays on one filesystem
    let temp = tempfile::Builder::new().prefix(".lx-").tempfile_in(parent)?;

    let (mut file, temp_path) = temp.into_parts();
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    temp_path
        .persist(path)
        .map_err(|e| io::Error::other(format!("failed to persist temp file: {}", e)))?;

    Ok(())
}
