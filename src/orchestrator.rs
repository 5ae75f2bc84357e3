//! Sequencing of a complete backup run.

use std::fs;
use std::path::Path;

use crate::backends::{self, ArchiveWriter, Backup, DatabaseDumper, Target};
use crate::config::Configuration;
use crate::logging::RunLog;
use crate::run_log;
use crate::util::retention::{CleanupReport, RetentionSweeper};

const RULE: &str = "============================================================";

/// Totals of a backup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Targets backed up successfully.
    pub succeeded: usize,
    /// Targets whose backup failed. Skipped targets are not counted.
    pub failed: usize,
    /// Result of the retention sweep, [None] if the sweep failed.
    pub cleanup: Option<CleanupReport>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Backs up every enabled target of a [Configuration], then removes expired
/// backups.
///
/// Targets are processed one after another in configuration order. A failing
/// target is logged and counted but never stops the run.
#[derive(Debug)]
pub struct BackupOrchestrator {
    config: Configuration,
    archiver: ArchiveWriter,
    dumper: DatabaseDumper,
    log: RunLog,
}

impl BackupOrchestrator {
    pub fn new(config: Configuration, log: RunLog) -> Self {
        Self {
            config,
            archiver: ArchiveWriter::default(),
            dumper: DatabaseDumper::default(),
            log,
        }
    }

    pub fn with_archiver(mut self, archiver: ArchiveWriter) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_dumper(mut self, dumper: DatabaseDumper) -> Self {
        self.dumper = dumper;
        self
    }

    pub fn run(&self) -> RunSummary {
        let log = &self.log;
        let backup_dir = self.config.backup_dir.as_path();

        run_log!(log, Info, target: "orchestrator", "{RULE}");
        run_log!(log, Info, target: "orchestrator", "Starting backup process...");
        run_log!(log, Info, target: "orchestrator", "{RULE}");

        if let Err(e) = fs::create_dir_all(backup_dir) {
            run_log!(log, Error, target: "orchestrator", "Unable to create backup directory {}: {e}", backup_dir.display());
        }
        if self.config.notifications.enabled {
            run_log!(log, Warn, target: "orchestrator", "Notifications are enabled but not supported, nothing will be sent to {}", self.config.notifications.email);
        }

        let mut summary = RunSummary::default();
        self.backup_all(&self.archiver, &self.config.websites, &mut summary);
        self.backup_all(&self.dumper, &self.config.databases, &mut summary);

        summary.cleanup = self.cleanup(backup_dir);

        run_log!(log, Info, target: "orchestrator", "{RULE}");
        run_log!(
            log, Info, target: "orchestrator",
            "Backup process completed: {} successful, {} failed",
            summary.succeeded, summary.failed
        );
        run_log!(log, Info, target: "orchestrator", "{RULE}");
        log.flush();

        summary
    }

    fn backup_all<B: Backup>(&self, backend: &B, targets: &[B::Target], summary: &mut RunSummary) {
        let log = &self.log;
        let kind = <B::Target as Target>::KIND;
        let target_log = format!("backend::{kind}");

        for target in targets {
            let name = target.name();
            if !target.enabled() {
                run_log!(log, Info, target: &target_log, "Skipping disabled {kind}: {name}");
                continue;
            }

            let file_name = backend.file_name(target, &backends::timestamp());
            let destination = self.config.backup_dir.join(file_name);
            run_log!(log, Info, target: &target_log, "Backing up {kind}: {name}");
            run_log!(log, Debug, target: &target_log, "Writing {} to {}", name, destination.display());

            match backend.backup(target, &destination) {
                Ok(artifact) => {
                    run_log!(
                        log, Info, target: &target_log,
                        "✓ {kind} backup completed: {} ({:.2} MB)",
                        artifact.file_name(), artifact.size_mb()
                    );
                    summary.succeeded += 1;
                }
                Err(e) => {
                    run_log!(log, Error, target: &target_log, "✗ {kind} backup of {name} failed: {e}");
                    summary.failed += 1;
                }
            }
        }
    }

    fn cleanup(&self, backup_dir: &Path) -> Option<CleanupReport> {
        let log = &self.log;
        let sweeper = RetentionSweeper::new(self.config.retention_days);
        run_log!(log, Info, target: "retention", "Cleaning up backups older than {} days...", sweeper.retention_days);

        let report = match sweeper.sweep(backup_dir) {
            Ok(report) => report,
            Err(e) => {
                run_log!(log, Error, target: "retention", "Cleaning up old backups failed: {e}");
                return None;
            }
        };

        for removed in &report.removed {
            let name = removed.file_name().unwrap_or(removed.as_os_str());
            run_log!(log, Info, target: "retention", "  Removed old backup: {}", name.to_string_lossy());
        }
        for failure in &report.failures {
            run_log!(log, Warn, target: "retention", "  Could not remove {}: {}", failure.path.display(), failure.reason);
        }
        if report.removed.is_empty() {
            run_log!(log, Info, target: "retention", "  No old backups to remove");
        } else {
            let freed_mb = report.freed_bytes as f64 / (1024.0 * 1024.0);
            run_log!(
                log, Info, target: "retention",
                "✓ Cleaned up {} old backup(s), freed {freed_mb:.2} MB",
                report.removed_count()
            );
        }

        Some(report)
    }
}
