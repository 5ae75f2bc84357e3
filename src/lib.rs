//! Library to backup website directories and databases.
//!
//! A run reads the [`config::Configuration`], archives every enabled website
//! target, dumps every enabled database target and finally sweeps expired
//! backups from the backup directory. The sequencing lives in
//! [`orchestrator::BackupOrchestrator`], the individual backup tasks in the
//! [`backends`] module.

#![forbid(unsafe_code)]

pub mod logging;

pub mod backends;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod util;
