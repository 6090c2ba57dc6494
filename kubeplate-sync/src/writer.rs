//! Atomic writer.
//!
//! ## `atomic_write` protocol
//!
//! 1. Destination missing → create parent directories, write it directly.
//! 2. Otherwise create a temporary file `.<name>.XXXXXX` next to the destination
//!    (same directory, so the rename stays on one filesystem).
//! 3. Write the content, flush, fsync.
//! 4. Set mode `0644` (Unix).
//! 5. Rename over the destination.
//!
//! Any failure before step 5 drops the temporary file, which removes it; the
//! destination keeps its previous content.

use std::io::Write;
use std::path::Path;

use crate::error::{io_err, SyncError};

/// Write `content` to `path` without ever exposing a partially written file.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), SyncError> {
    atomic_write_with(path, content, |_| Ok(()))
}

/// [`atomic_write`] with a hook run after the temporary file is synced and
/// before it is renamed into place.
fn atomic_write_with(
    path: &Path,
    content: &str,
    before_rename: impl FnOnce(&Path) -> std::io::Result<()>,
) -> Result<(), SyncError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Step 1: first write goes straight to the destination.
    if !path.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        std::fs::write(path, content).map_err(|e| io_err(path, e))?;
        tracing::debug!(path = %path.display(), "created output file");
        return Ok(());
    }

    // Step 2: temporary sibling.
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .tempfile_in(dir)
        .map_err(|e| io_err(dir, e))?;

    // Step 3: content, durably.
    tmp.write_all(content.as_bytes())
        .and_then(|()| tmp.flush())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| io_err(tmp.path(), e))?;

    // Step 4: permissions.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))
            .map_err(|e| io_err(tmp.path(), e))?;
    }

    before_rename(tmp.path()).map_err(|e| io_err(tmp.path(), e))?;

    // Step 5: atomic rename. On failure the returned handle is dropped and
    // the temporary file with it.
    tmp.persist(path).map_err(|e| io_err(path, e.error))?;
    tracing::debug!(path = %path.display(), "replaced output file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
