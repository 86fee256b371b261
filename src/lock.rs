//! File-based locking to prevent concurrent builds.
//!
//! Uses flock-style advisory locking so only one rulekit process writes a
//! given output directory at a time.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::RulekitError;

const LOCK_FILE: &str = ".rulekit.lock";

/// A guard that holds an exclusive lock on an output directory.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `output_dir`, creating the
    /// directory if needed. Fails immediately if another build holds it.
    ///
    /// Uses OpenOptions with create+read+write to avoid TOCTOU race
    /// between file creation and lock acquisition.
    pub fn acquire(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

        let path = output_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::Error::new(RulekitError::Locked(output_dir.display().to_string())).context(
                format!(
                    "If no other build is running, remove the lock file: {}",
                    path.display()
                ),
            )
        })?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Lock is automatically released when file is closed (on drop)
