//! Guards against writing a load or export target over the staging store.
//!
//! The staging database is the only durable record of resolved rows;
//! pointing `load --database` or `export --output` at it by mistake would
//! destroy the result of every lookup made so far.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Best-effort absolute form; falls back to the path as given when it
/// does not exist yet.
fn resolved(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Reject a target database that is the staging store itself.
///
/// SQLite sidecar files (`-wal`, `-shm`) of the staging store are rejected
/// as well.
pub fn validate_target_database(target: &Path, staging: &Path) -> Result<()> {
    let target_abs = resolved(target);
    let staging_abs = resolved(staging);

    if target_abs == staging_abs {
        bail!(
            "Safety check failed: target '{}' is the staging store '{}'",
            target.display(),
            staging.display()
        );
    }

    let staging_name = staging_abs.as_os_str().to_string_lossy().into_owned();
    let target_name = target_abs.as_os_str().to_string_lossy().into_owned();
    for suffix in ["-wal", "-shm", "-journal"] {
        if target_name == format!("{}{}", staging_name, suffix) {
            bail!(
                "Safety check failed: target '{}' is a sidecar file of the staging store",
                target.display()
            );
        }
    }

    Ok(())
}

/// Reject an export directory that is an existing regular file, or that
/// would place a CSV over the staging store.
pub fn validate_export_dir(dir: &Path, staging: &Path) -> Result<()> {
    if dir.is_file() {
        bail!(
            "Safety check failed: export target '{}' is a file, expected a directory",
            dir.display()
        );
    }
    if resolved(dir) == resolved(staging) {
        bail!(
            "Safety check failed: export target '{}' is the staging store",
            dir.display()
        );
    }
    Ok(())
}
