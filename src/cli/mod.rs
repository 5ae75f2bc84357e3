use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::config::DEFAULT_CONFIG_PATH;

/// Automatic website & database backup tool.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, env = "SIMPLE_BACKUP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Create the default configuration file and exit.
    #[arg(long)]
    pub init: bool,

    /// Verbosity of the log output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["simple_backup"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("backup_config.json"));
        assert!(!cli.init);
        assert_eq!(cli.verbose, None);
    }

    #[test]
    fn flags() {
        let cli = Cli::try_parse_from([
            "simple_backup",
            "--config",
            "/etc/backup.json",
            "--init",
            "--verbose",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/backup.json"));
        assert!(cli.init);
        assert_eq!(cli.verbose, Some(LevelFilter::Debug));
    }
}
