use std::fs;
use std::process::ExitCode;

use clap::Parser;
use simple_backup_lib::cli::Cli;
use simple_backup_lib::config::ConfigStore;
use simple_backup_lib::logging::RunLog;
use simple_backup_lib::orchestrator::BackupOrchestrator;
use simple_backup_lib::run_log;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let console = RunLog::console(cli.verbose);

    let loaded = match ConfigStore::load(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            run_log!(console, Error, target: "config", "{e}");
            return ExitCode::FAILURE;
        }
    };

    if loaded.created {
        run_log!(console, Info, target: "config", "✓ Default configuration created: {}", cli.config.display());
        run_log!(console, Info, target: "config", "  Please edit this file with your backup settings.");
    }
    if cli.init {
        run_log!(console, Info, target: "config", "✓ Configuration initialized successfully!");
        run_log!(console, Info, target: "config", "  Edit {} to configure your backups.", cli.config.display());
        return ExitCode::SUCCESS;
    }

    let backup_dir = &loaded.config.backup_dir;
    if let Err(e) = fs::create_dir_all(backup_dir) {
        run_log!(console, Error, target: "config", "Creating backup directory {} failed: {e}", backup_dir.display());
        return ExitCode::FAILURE;
    }

    let log = match RunLog::daily(backup_dir, cli.verbose) {
        Ok(log) => log,
        Err(e) => {
            run_log!(console, Error, target: "config", "Opening the log file in {} failed: {e}", backup_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let summary = BackupOrchestrator::new(loaded.config, log).run();
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
