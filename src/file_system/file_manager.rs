use std::fs;
use std::path::Path;

use snafu::ResultExt;

use crate::error::{self, Result};
use crate::file_system::AsyncFile;

/// Case `std::fs::try_exists` is unstable, so copied the same logic to here.
#[inline(always)]
pub fn try_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).is_ok()
}

/// Opens an existing file for read and write. Never creates.
pub async fn open_file(path: impl AsRef<Path>) -> Result<AsyncFile> {
    let path = path.as_ref();
    let mut opt = fs::OpenOptions::new();
    opt.read(true).write(true);
    AsyncFile::open(path, opt)
        .await
        .context(error::OpenFileSnafu { path })
}

/// Opens an existing file for read only. Never creates.
pub async fn open_file_readonly(path: impl AsRef<Path>) -> Result<AsyncFile> {
    let path = path.as_ref();
    let mut opt = fs::OpenOptions::new();
    opt.read(true);
    AsyncFile::open(path, opt)
        .await
        .context(error::OpenFileSnafu { path })
}

/// Opens a file for read and write, creating it and its parent directories
/// when missing.
pub async fn create_file(path: impl AsRef<Path>) -> Result<AsyncFile> {
    let path = path.as_ref();
    if let Some(p) = path.parent() {
        if !try_exists(p) {
            fs::create_dir_all(p).context(error::CreateFileSnafu { path: p })?;
        }
    }
    let mut opt = fs::OpenOptions::new();
    opt.read(true).write(true).create(true);
    AsyncFile::open(path, opt)
        .await
        .context(error::CreateFileSnafu { path })
}

pub fn list_file_names(dir: impl AsRef<Path>) -> Vec<String> {
    let mut list = Vec::new();

    for file_name in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| {
            let dir_entry = match e {
                Ok(dir_entry) if dir_entry.file_type().is_file() => dir_entry,
                _ => {
                    return None;
                }
            };
            dir_entry
                .file_name()
                .to_str()
                .map(|file_name| file_name.to_string())
        })
    {
        list.push(file_name);
    }

    list
}
