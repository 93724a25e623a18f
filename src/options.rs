use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the file is opened. Flags mirror the option list callers pass to
/// `ChunkFile::open`; all default to off.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOpt {
    /// Create the file (and its parent directories) if missing.
    pub create: bool,
    /// With `create`: an existing non-empty file is truncated to zero
    /// instead of failing with `AlreadyExists`.
    pub overwrite: bool,
    /// Never reopen for writing; append/truncate will fail at the OS level.
    pub read_only: bool,
    /// System file, excluded from open-descriptor accounting.
    pub sys: bool,
    /// Suppress the log line when the file does not exist.
    pub no_log_if_missing: bool,
}

impl OpenOpt {
    pub fn create() -> Self {
        Self {
            create: true,
            ..Self::default()
        }
    }

    pub fn create_overwrite() -> Self {
        Self {
            create: true,
            overwrite: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }
}

/// What `delete_file` does with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Rename to a `.YYYYMMDD.HHMMSS.deleted.<ext>` sibling so the file can
    /// be recovered by hand.
    Rename,
    /// Rename into `<root>/.delete/<uuid>` and remove before returning.
    StagedSync,
    /// Rename into `<root>/.delete/<uuid>` and remove on a background task.
    StagedAsync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// First idle check after open.
    pub idle_initial_wait: Duration,
    /// Re-check cadence while the file stays busy.
    pub idle_monitor_check: Duration,
    pub delete_policy: DeletePolicy,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            idle_initial_wait: Duration::from_secs(60),
            idle_monitor_check: Duration::from_secs(10),
            delete_policy: DeletePolicy::Rename,
        }
    }
}
