//! Deleting database files without losing them: either a timestamped rename
//! next to the original, or a two-step move through `<root>/.delete/` so a
//! crash mid-delete leaves only garbage that the next startup sweeps.
//! These are plain filesystem operations, never routed through a file's
//! owning task.

use std::path::{Path, PathBuf};

use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use snafu::ResultExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{self, Result};
use crate::file_system::{file_manager, os};
use crate::options::DeletePolicy;

pub const DELETE_DIR: &str = ".delete";

lazy_static! {
    static ref DELETED_FILE_NAME_PATTERN: Regex =
        Regex::new(r"\.\d{8}\.\d{6}\.deleted(\.|$)").unwrap();
}

pub fn is_deleted_filename(file_name: &str) -> bool {
    DELETED_FILE_NAME_PATTERN.is_match(file_name)
}

/// `dir/name.ext` becomes `dir/name.YYYYMMDD.HHMMSS.deleted.ext`.
pub fn make_deleted_file_path(path: &Path) -> PathBuf {
    let ts = Local::now().format("%Y%m%d.%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str());
    let ext = path.extension().and_then(|s| s.to_str());
    let file_name = match (stem, ext) {
        (Some(stem), Some(ext)) => format!("{}.{}.deleted.{}", stem, ts, ext),
        (Some(stem), None) => format!("{}.{}.deleted", stem, ts),
        _ => format!("file.{}.deleted", ts),
    };
    path.with_file_name(file_name)
}

/// Renames `path` to a timestamped `.deleted` sibling and bumps its mtime,
/// so leftovers can be aged out by their rename time rather than their last
/// write.
pub fn rename_to_deleted(path: &Path) -> Result<PathBuf> {
    let target = make_deleted_file_path(path);
    std::fs::rename(path, &target).context(error::DeleteFileSnafu { path })?;
    if let Err(e) = os::set_times_now(&target) {
        warn!("Failed to update mtime of '{}': {}", target.display(), e);
    }
    Ok(target)
}

pub fn delete_dir(root: &Path) -> PathBuf {
    root.join(DELETE_DIR)
}

/// Makes sure `<root>/.delete/` exists and clears entries staged by
/// previous runs.
pub fn init_delete_dir(root: &Path) -> Result<()> {
    let dir = delete_dir(root);
    std::fs::create_dir_all(&dir).context(error::CreateFileSnafu { path: &dir })?;
    for name in file_manager::list_file_names(&dir) {
        let stale = dir.join(&name);
        match std::fs::remove_file(&stale) {
            Ok(()) => debug!("Removed stale staged file '{}'", stale.display()),
            Err(e) => warn!(
                "Failed to remove stale staged file '{}': {}",
                stale.display(),
                e
            ),
        }
    }
    Ok(())
}

/// Removes `path` under `policy`. Staged deletes rename first, so the
/// target stops being visible at its old name even when the actual unlink
/// happens later on a background task.
pub async fn delete_file(root: &Path, path: &Path, policy: DeletePolicy) -> Result<()> {
    match policy {
        DeletePolicy::Rename => {
            rename_to_deleted(path)?;
            Ok(())
        }
        DeletePolicy::StagedSync | DeletePolicy::StagedAsync => {
            let staged = delete_dir(root).join(Uuid::new_v4().to_string());
            std::fs::rename(path, &staged).context(error::DeleteFileSnafu { path })?;
            if policy == DeletePolicy::StagedSync {
                std::fs::remove_file(&staged).context(error::DeleteFileSnafu { path: &staged })?;
            } else {
                tokio::spawn(async move {
                    if let Err(e) = tokio::fs::remove_file(&staged).await {
                        warn!("Failed to remove staged file '{}': {}", staged.display(), e);
                    }
                });
            }
            Ok(())
        }
    }
}
