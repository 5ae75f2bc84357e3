//! Run log shared by all components of a backup run.
//!
//! No global logger is installed. A [RunLog] owns an [`env_logger::Logger`]
//! and is handed to whoever needs to narrate the run.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use env_logger::{Builder, Target};
use log::{LevelFilter, Log, Record};

pub use log::Level;

/// Directory inside the backup directory that holds the daily run logs.
pub const LOG_DIR: &str = "logs";

/// Emits a record through a [RunLog].
///
/// ```ignore
/// run_log!(log, Info, target: "backend::website", "Backing up {name}");
/// ```
#[macro_export]
macro_rules! run_log {
    ($log:expr, $lvl:ident, target: $target:expr, $($arg:tt)+) => {
        $log.emit($crate::logging::Level::$lvl, $target, format_args!($($arg)+))
    };
}

/// Explicit logger instance of a backup run.
pub struct RunLog {
    logger: Box<dyn Log>,
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog").finish_non_exhaustive()
    }
}

impl RunLog {
    /// Wraps an arbitrary [Log] implementation.
    pub fn new(logger: Box<dyn Log>) -> Self {
        Self { logger }
    }

    /// Logs to stderr only.
    ///
    /// Used before the backup directory is known, e.g. while loading the
    /// configuration.
    pub fn console(level: Option<LevelFilter>) -> Self {
        let logger = builder(level).target(Target::Stderr).build();
        Self::new(Box::new(logger))
    }

    /// Logs to stderr and appends to `backup_dir/logs/backup_{YYYYMMDD}.log`.
    pub fn daily(backup_dir: &Path, level: Option<LevelFilter>) -> io::Result<Self> {
        let log_file = daily_log_file(backup_dir);
        if let Some(log_dir) = log_file.parent() {
            fs::create_dir_all(log_dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;

        let tee = Tee {
            console: io::stderr(),
            file,
        };
        let logger = builder(level).target(Target::Pipe(Box::new(tee))).build();

        Ok(Self::new(Box::new(logger)))
    }

    /// Emits a single record; prefer the [`run_log!`](crate::run_log) macro.
    pub fn emit(&self, level: Level, target: &str, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .level(level)
            .target(target)
            .args(args)
            .build();

        if self.logger.enabled(record.metadata()) {
            self.logger.log(&record);
        }
    }

    pub fn flush(&self) {
        self.logger.flush();
    }
}

/// Path of today's log file inside `backup_dir`.
pub fn daily_log_file(backup_dir: &Path) -> PathBuf {
    let day = Local::now().format("%Y%m%d");
    backup_dir.join(LOG_DIR).join(format!("backup_{day}.log"))
}

fn builder(level: Option<LevelFilter>) -> Builder {
    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    if let Some(level) = level {
        builder.filter_level(level);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            record.level(),
            record.args()
        )
    });

    builder
}

/// Writes everything to the console and to the log file.
struct Tee {
    console: io::Stderr,
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // console output is best effort, the file is the record of the run
        let _ = self.console.write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use log::Metadata;

    use super::*;

    /// Collects formatted records for assertions.
    #[derive(Clone, Default)]
    pub struct Capture {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl Capture {
        pub fn run_log(&self) -> RunLog {
            RunLog::new(Box::new(self.clone()))
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl Log for Capture {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("{} {}", record.level(), record.args()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn macro_reaches_the_wrapped_logger() {
        let capture = Capture::default();
        let log = capture.run_log();

        let name = "shop";
        crate::run_log!(log, Warn, target: "test", "skipping {name}");

        assert_eq!(capture.lines(), vec!["WARN skipping shop".to_string()]);
    }

    #[test]
    fn daily_log_is_written_below_logs_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::daily(dir.path(), Some(LevelFilter::Info)).unwrap();

        crate::run_log!(log, Info, target: "test", "hello from the run");
        crate::run_log!(log, Debug, target: "test", "filtered out");
        log.flush();

        let content = fs::read_to_string(daily_log_file(dir.path())).unwrap();
        assert!(content.contains(" - INFO - hello from the run"));
        assert!(!content.contains("filtered out"));
    }
}
