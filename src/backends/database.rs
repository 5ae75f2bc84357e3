//! Implements compressed database dumps using [DatabaseDumper].

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::process::ExitStatus;

use derive_more::{Display, Error, From};

use super::{Artifact, Backup};
use crate::config::{DatabaseKind, DatabaseTarget, DEFAULT_POSTGRES_PORT};
use crate::util::pipeline::{Pipeline, PipelineError, Stage};

/// External programs used to create dumps.
#[derive(Debug, Clone)]
pub struct DumpTools {
    /// Dump utility for MySQL and MariaDB.
    pub mysqldump: OsString,
    /// Dump utility for PostgreSQL.
    pub pg_dump: OsString,
    /// Stream compressor reading stdin and writing stdout.
    pub compressor: OsString,
}

impl Default for DumpTools {
    fn default() -> Self {
        Self {
            mysqldump: "mysqldump".into(),
            pg_dump: "pg_dump".into(),
            compressor: "gzip".into(),
        }
    }
}

/// Dumps databases by piping a vendor dump utility through a compressor.
#[derive(Debug, Clone, Default)]
pub struct DatabaseDumper {
    tools: DumpTools,
}

#[derive(Debug, Display, Error, From)]
/// Errors on dumping a database.
pub enum DumpError {
    /// The engine of the target isn't supported. Nothing was attempted.
    #[display("Unsupported database type: {_0}")]
    UnsupportedType(#[error(ignore)] String),
    /// A required program isn't installed.
    #[display("{tool} not found. Please install {package}.")]
    ToolNotFound { tool: String, package: String },
    /// The dump or the compressor exited unsuccessfully.
    #[display("{tool} error ({status}): {stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[display("{_0}")]
    Pipeline(#[error(ignore)] PipelineError),
    #[display("Writing the dump failed: {_0}")]
    #[from]
    Io(io::Error),
}

impl DatabaseDumper {
    pub fn with_tools(tools: DumpTools) -> Self {
        Self { tools }
    }

    /// Dumps the database of `target` gzip compressed into `destination`.
    ///
    /// Whatever the outcome, no partial dump is left behind on error.
    pub fn dump(&self, target: &DatabaseTarget, destination: &Path) -> Result<Artifact, DumpError> {
        let (producer, client) = match &target.kind {
            DatabaseKind::MySql => (self.mysql_stage(target), "MySQL"),
            DatabaseKind::PostgreSql => (self.postgres_stage(target), "PostgreSQL"),
            DatabaseKind::Unsupported(other) => {
                return Err(DumpError::UnsupportedType(other.clone()));
            }
        };

        // an existing file belongs to someone else and is never removed
        let output = File::create_new(destination)?;

        let result = Pipeline::new(producer, Stage::new(&self.tools.compressor))
            .run(output)
            .map_err(|e| self.pipeline_error(e, client))
            .and_then(|()| Artifact::from_path(destination).map_err(DumpError::Io));

        if result.is_err() {
            let _ = fs::remove_file(destination);
        }

        result
    }

    /// `mysqldump` with a consistent, non-locking, row streaming dump.
    pub(crate) fn mysql_stage(&self, target: &DatabaseTarget) -> Stage {
        let mut stage = Stage::new(&self.tools.mysqldump);
        if let Some(host) = &target.host {
            stage = stage.arg(format!("--host={host}"));
        }
        if let Some(port) = target.port {
            stage = stage.arg(format!("--port={port}"));
        }
        if let Some(user) = &target.user {
            stage = stage.arg(format!("--user={user}"));
        }
        if let Some(password) = &target.password {
            stage = stage.arg(format!("--password={password}"));
        }

        stage
            .arg("--single-transaction")
            .arg("--quick")
            .arg("--lock-tables=false")
            .arg(&target.database)
    }

    /// `pg_dump` as plain SQL without ownership and ACLs.
    ///
    /// The password is handed over in `PGPASSWORD` to keep it out of the
    /// process list.
    pub(crate) fn postgres_stage(&self, target: &DatabaseTarget) -> Stage {
        let mut stage = Stage::new(&self.tools.pg_dump);
        if let Some(host) = &target.host {
            stage = stage.arg(format!("--host={host}"));
        }
        stage = stage.arg(format!(
            "--port={}",
            target.port.unwrap_or(DEFAULT_POSTGRES_PORT)
        ));
        if let Some(user) = &target.user {
            stage = stage.arg(format!("--username={user}"));
        }
        if let Some(password) = &target.password {
            stage = stage.env("PGPASSWORD", password);
        }

        stage
            .arg("--format=plain")
            .arg("--no-owner")
            .arg("--no-acl")
            .arg(&target.database)
    }

    fn pipeline_error(&self, error: PipelineError, client: &str) -> DumpError {
        match error {
            PipelineError::NotFound { program } => {
                let package = if program == self.tools.compressor.to_string_lossy() {
                    program.clone()
                } else {
                    format!("the {client} client tools")
                };
                DumpError::ToolNotFound {
                    tool: program,
                    package,
                }
            }
            PipelineError::Failed {
                program,
                status,
                stderr,
            } => DumpError::Failed {
                tool: program,
                status,
                stderr,
            },
            other => DumpError::Pipeline(other),
        }
    }
}

impl DumpError {
    /// The failure is caused by a missing program, not by the database.
    pub fn is_tool_not_found(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. })
    }
}

impl Backup for DatabaseDumper {
    type Target = DatabaseTarget;
    type Error = DumpError;

    fn file_name(&self, target: &DatabaseTarget, timestamp: &str) -> String {
        format!("{}_{}_{timestamp}.sql.gz", target.name, target.kind)
    }

    fn backup(&self, target: &DatabaseTarget, destination: &Path) -> Result<Artifact, DumpError> {
        self.dump(target, destination)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    fn target(kind: DatabaseKind) -> DatabaseTarget {
        DatabaseTarget {
            name: "shop".to_string(),
            kind,
            host: Some("db.local".to_string()),
            port: None,
            user: Some("backup".to_string()),
            password: Some("hunter2".to_string()),
            database: "shop_prod".to_string(),
            enabled: true,
        }
    }

    fn args(stage: &Stage) -> Vec<String> {
        stage
            .args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn mysql_dump_is_consistent_and_non_locking() {
        let mut db = target(DatabaseKind::MySql);
        db.port = Some(3307);
        let stage = DatabaseDumper::default().mysql_stage(&db);

        assert_eq!(stage.program(), OsStr::new("mysqldump"));
        assert_eq!(
            args(&stage),
            [
                "--host=db.local",
                "--port=3307",
                "--user=backup",
                "--password=hunter2",
                "--single-transaction",
                "--quick",
                "--lock-tables=false",
                "shop_prod",
            ]
        );
    }

    #[test]
    fn postgres_password_stays_off_the_command_line() {
        let stage = DatabaseDumper::default().postgres_stage(&target(DatabaseKind::PostgreSql));

        assert_eq!(stage.program(), OsStr::new("pg_dump"));
        let args = args(&stage);
        assert!(args.contains(&"--port=5432".to_string()), "{args:?}");
        assert!(args.contains(&"--no-owner".to_string()), "{args:?}");
        assert!(args.iter().all(|a| !a.contains("hunter2")), "{args:?}");
        assert_eq!(stage.get_env("PGPASSWORD"), Some(OsStr::new("hunter2")));
    }

    #[test]
    fn mysql_omits_flags_of_missing_fields() {
        let db = DatabaseTarget {
            host: None,
            port: None,
            user: None,
            password: None,
            ..target(DatabaseKind::MySql)
        };
        let stage = DatabaseDumper::default().mysql_stage(&db);

        assert_eq!(
            args(&stage),
            [
                "--single-transaction",
                "--quick",
                "--lock-tables=false",
                "shop_prod",
            ]
        );
    }

    #[test]
    fn postgres_explicit_port_wins() {
        let mut db = target(DatabaseKind::PostgreSql);
        db.port = Some(6543);
        let args = args(&DatabaseDumper::default().postgres_stage(&db));

        assert!(args.contains(&"--port=6543".to_string()), "{args:?}");
        assert!(!args.contains(&"--port=5432".to_string()), "{args:?}");
    }

    #[test]
    fn file_name_is_tagged_with_the_engine() {
        let dumper = DatabaseDumper::default();
        assert_eq!(
            dumper.file_name(&target(DatabaseKind::MySql), "20240102_030405"),
            "shop_mysql_20240102_030405.sql.gz"
        );
        assert_eq!(
            dumper.file_name(&target(DatabaseKind::PostgreSql), "20240102_030405"),
            "shop_postgresql_20240102_030405.sql.gz"
        );
    }

    #[test]
    fn unsupported_type_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("shop.sql.gz");

        let err = DatabaseDumper::default()
            .dump(&target(DatabaseKind::Unsupported("oracle".into())), &destination)
            .unwrap_err();

        assert!(matches!(&err, DumpError::UnsupportedType(t) if t == "oracle"), "{err}");
        assert!(!destination.exists());
    }

    #[cfg(unix)]
    #[test]
    fn missing_dump_tool_is_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("shop.sql.gz");
        let dumper = DatabaseDumper::with_tools(DumpTools {
            mysqldump: "/nonexistent/mysqldump".into(),
            ..DumpTools::default()
        });

        let err = dumper.dump(&target(DatabaseKind::MySql), &destination).unwrap_err();

        assert!(err.is_tool_not_found(), "{err}");
        assert!(err.to_string().contains("MySQL client tools"), "{err}");
        assert!(!destination.exists());
    }

    #[cfg(unix)]
    #[test]
    fn missing_compressor_names_the_compressor() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("shop.sql.gz");
        let dumper = DatabaseDumper::with_tools(DumpTools {
            mysqldump: "echo".into(),
            compressor: "/nonexistent/gzip".into(),
            ..DumpTools::default()
        });

        let err = dumper.dump(&target(DatabaseKind::MySql), &destination).unwrap_err();

        assert!(err.is_tool_not_found(), "{err}");
        assert_eq!(
            err.to_string(),
            "/nonexistent/gzip not found. Please install /nonexistent/gzip."
        );
        assert!(!err.to_string().contains("client tools"), "{err}");
        assert!(!destination.exists());
    }

    #[cfg(unix)]
    #[test]
    fn existing_destination_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("shop.sql.gz");
        fs::write(&destination, "earlier dump").unwrap();
        let dumper = DatabaseDumper::with_tools(DumpTools {
            mysqldump: "echo".into(),
            compressor: "cat".into(),
            ..DumpTools::default()
        });

        let err = dumper.dump(&target(DatabaseKind::MySql), &destination).unwrap_err();

        assert!(
            matches!(&err, DumpError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists),
            "{err}"
        );
        assert_eq!(fs::read_to_string(&destination).unwrap(), "earlier dump");
    }

    #[cfg(unix)]
    #[test]
    fn failing_dump_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("shop.sql.gz");
        let dumper = DatabaseDumper::with_tools(DumpTools {
            pg_dump: "false".into(),
            compressor: "cat".into(),
            ..DumpTools::default()
        });

        let err = dumper
            .dump(&target(DatabaseKind::PostgreSql), &destination)
            .unwrap_err();

        assert!(matches!(&err, DumpError::Failed { tool, .. } if tool == "false"), "{err}");
        assert!(!destination.exists());
    }

    #[cfg(unix)]
    #[test]
    fn successful_dump_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("shop.sql.gz");
        let dumper = DatabaseDumper::with_tools(DumpTools {
            mysqldump: "echo".into(),
            compressor: "cat".into(),
            ..DumpTools::default()
        });

        let artifact = dumper.dump(&target(DatabaseKind::MySql), &destination).unwrap();

        let content = fs::read_to_string(&destination).unwrap();
        assert!(content.contains("--single-transaction"), "{content}");
        assert!(content.trim_end().ends_with("shop_prod"), "{content}");
        assert_eq!(artifact.size, content.len() as u64);
    }
}
