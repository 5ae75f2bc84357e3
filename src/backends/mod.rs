//! Backend modules for performing individual backup tasks.
//!
//! Currently the following backends are implemented:
//!
//! - [ArchiveWriter]: Compressed tar archive of a website directory.
//! - [DatabaseDumper]: Compressed dump of a MySQL/MariaDB or PostgreSQL database.

pub mod database;
pub mod website;

pub use database::{DatabaseDumper, DumpError, DumpTools};
pub use website::{ArchiveError, ArchiveWriter};

use std::path::{Path, PathBuf};

use chrono::Local;

/// Format of the timestamp embedded in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Local time formatted with [TIMESTAMP_FORMAT].
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Something that can be backed up by a [Backup] backend.
pub trait Target {
    /// Human readable kind used in log messages.
    const KIND: &'static str;

    fn name(&self) -> &str;

    /// Disabled targets are skipped entirely.
    fn enabled(&self) -> bool;
}

/// A file produced by a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub size: u64,
}

impl Artifact {
    pub(crate) fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }

    /// Size in MiB, as reported in the run log.
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Generic backup backend.
pub trait Backup {
    type Target: Target;

    /// Error that may happen on backup.
    type Error: std::error::Error;

    /// File name of the backup of `target` taken at `timestamp`.
    fn file_name(&self, target: &Self::Target, timestamp: &str) -> String;

    /// Backups `target` into the new file `destination`.
    fn backup(&self, target: &Self::Target, destination: &Path)
        -> Result<Artifact, Self::Error>;
}
