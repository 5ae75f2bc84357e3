//! Loading and first-run creation of the backup configuration.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};
use serde::Serialize;

use crate::backends::Target;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "backup_config.json";

/// Port used for PostgreSQL targets without an explicit `port`.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Complete configuration of a backup run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Configuration {
    /// Directory receiving all backups and the run logs.
    pub backup_dir: PathBuf,

    /// Backups older than this many days are removed after each run.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Reserved. Archives and dumps are always gzip compressed.
    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default)]
    pub websites: Vec<WebsiteTarget>,

    #[serde(default)]
    pub databases: Vec<DatabaseTarget>,

    /// Reserved. Notifications are not delivered.
    #[serde(default)]
    pub notifications: Notifications,
}

fn default_retention_days() -> u32 {
    7
}

fn default_compression() -> String {
    "gz".to_string()
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("./backups"),
            retention_days: default_retention_days(),
            compression: default_compression(),
            websites: vec![WebsiteTarget {
                name: "example_site".to_string(),
                path: PathBuf::from("/var/www/html/example"),
                enabled: false,
            }],
            databases: vec![DatabaseTarget {
                name: "example_db".to_string(),
                kind: DatabaseKind::MySql,
                host: Some("localhost".to_string()),
                port: Some(3306),
                user: Some("backup_user".to_string()),
                password: Some("your_password".to_string()),
                database: "example_database".to_string(),
                enabled: false,
            }],
            notifications: Notifications {
                enabled: false,
                email: "admin@example.com".to_string(),
            },
        }
    }
}

/// A website directory to archive.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WebsiteTarget {
    /// Prefix of the archive file and name of the archive's root entry.
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub enabled: bool,
}

impl Target for WebsiteTarget {
    const KIND: &'static str = "website";

    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}

/// A database to dump.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatabaseTarget {
    /// Prefix of the dump file.
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: DatabaseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Name of the schema to dump.
    pub database: String,
    #[serde(default)]
    pub enabled: bool,
}

impl Target for DatabaseTarget {
    const KIND: &'static str = "database";

    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Database engine of a [DatabaseTarget].
///
/// Parsed case-insensitively. Unknown engines are kept as
/// [`Unsupported`](Self::Unsupported) so the target fails on its own
/// instead of rejecting the whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatabaseKind {
    /// MySQL and MariaDB.
    #[default]
    MySql,
    PostgreSql,
    Unsupported(String),
}

impl DatabaseKind {
    /// Tag used in dump file names.
    pub fn as_str(&self) -> &str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "postgresql",
            Self::Unsupported(other) => other,
        }
    }
}

impl From<String> for DatabaseKind {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "mysql" | "mariadb" => Self::MySql,
            "postgresql" | "postgres" => Self::PostgreSql,
            _ => Self::Unsupported(value),
        }
    }
}

impl From<DatabaseKind> for String {
    fn from(value: DatabaseKind) -> Self {
        match value {
            DatabaseKind::Unsupported(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Notifications {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Display, Error, From)]
/// Errors on loading the configuration. All of them are fatal.
pub enum ConfigError {
    /// The configuration file exists but isn't a valid configuration.
    #[display("Invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Writing the default configuration failed.
    #[display("Writing the default configuration to {} failed: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
    /// Reading the configuration file failed.
    #[display("Reading the configuration failed: {_0}")]
    #[from]
    Io(io::Error),
}

/// A configuration together with its origin.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Configuration,
    /// The file didn't exist and the default configuration was written.
    pub created: bool,
}

/// Reads the configuration document and creates it on first use.
pub struct ConfigStore;

impl ConfigStore {
    /// Loads the configuration at `path`.
    ///
    /// If there is no file at `path` the [default](Configuration::default)
    /// configuration, with every target disabled, is written there and
    /// returned.
    pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
        if !fs::exists(path)? {
            let config = Configuration::default();
            Self::write(path, &config).map_err(|source| ConfigError::Create {
                path: path.to_path_buf(),
                source,
            })?;

            return Ok(LoadedConfig {
                config,
                created: true,
            });
        }

        let content = fs::read(path)?;
        let config = serde_json::from_slice(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(LoadedConfig {
            config,
            created: false,
        })
    }

    /// Writes `config` to `path` with four space indentation.
    pub fn write(path: &Path, config: &Configuration) -> io::Result<()> {
        let mut content = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut content, formatter);
        config.serialize(&mut serializer).map_err(io::Error::other)?;
        content.push(b'\n');

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }
}
