use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Extensions of files created by the backends.
pub const RECOGNIZED_EXTENSIONS: [&str; 3] = ["gz", "sql", "tar"];

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Removes backups older than a fixed number of days.
///
/// Age is plain elapsed wall-clock time: a file qualifies once it is more
/// than `retention_days * 86400` seconds old. Only direct entries of the
/// backup directory with a [recognized extension](RECOGNIZED_EXTENSIONS)
/// are considered.
#[derive(Copy, Clone, Debug)]
pub struct RetentionSweeper {
    pub retention_days: u32,
}

/// Outcome of a [RetentionSweeper] run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Sum of the sizes of all removed files in bytes.
    pub freed_bytes: u64,
    /// Entries that couldn't be inspected or removed. They are left in place.
    pub failures: Vec<SweepFailure>,
}

/// A single entry the sweep had to skip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl CleanupReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    fn fail(&mut self, path: &Path, error: io::Error) {
        self.failures.push(SweepFailure {
            path: path.to_path_buf(),
            reason: error.to_string(),
        });
    }
}

impl RetentionSweeper {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * SECONDS_PER_DAY)
    }

    pub fn sweep(&self, backup_dir: &Path) -> io::Result<CleanupReport> {
        self.sweep_at(backup_dir, SystemTime::now())
    }

    /// Like [sweep](Self::sweep) with `now` as the current time.
    ///
    /// Only an unreadable `backup_dir` is an error. Entries that fail
    /// individually are recorded in [CleanupReport::failures] and the sweep
    /// goes on with the next one.
    pub fn sweep_at(&self, backup_dir: &Path, now: SystemTime) -> io::Result<CleanupReport> {
        self.sweep_with(backup_dir, now, |path| fs::remove_file(path))
    }

    pub(crate) fn sweep_with(
        &self,
        backup_dir: &Path,
        now: SystemTime,
        mut remove: impl FnMut(&Path) -> io::Result<()>,
    ) -> io::Result<CleanupReport> {
        let max_age = self.max_age();
        let mut report = CleanupReport::default();

        for entry in fs::read_dir(backup_dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.fail(backup_dir, e);
                    continue;
                }
            };
            let path = entry.path();
            if !is_recognized(&path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    report.fail(&path, e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    report.fail(&path, e);
                    continue;
                }
            };
            // files from the future are never expired
            let Ok(age) = now.duration_since(modified) else {
                continue;
            };

            if age > max_age {
                match remove(&path) {
                    Ok(()) => {
                        report.freed_bytes += metadata.len();
                        report.removed.push(path);
                    }
                    Err(e) => report.fail(&path, e),
                }
            }
        }

        Ok(report)
    }
}

fn is_recognized(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| RECOGNIZED_EXTENSIONS.contains(&ext))
}
