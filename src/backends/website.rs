//! Implements backup of website directories using [ArchiveWriter].

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{Artifact, Backup};
use crate::config::WebsiteTarget;

/// Writes a directory tree, or a single file, into a gzip compressed tar archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveWriter {
    compression: Compression,
}

#[derive(Debug, Display, Error, From)]
/// Errors on archiving a website directory.
pub enum ArchiveError {
    /// The path to archive doesn't exist.
    #[display("Website path does not exist: {}", _0.display())]
    SourceMissing(#[error(ignore)] PathBuf),
    /// Reading the tree or writing the archive failed.
    #[display("Writing the archive failed: {_0}")]
    #[from]
    Io(io::Error),
}

impl ArchiveWriter {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    /// Archives `source` into `destination`.
    ///
    /// The root entry of the archive is named `archive_root_name` instead of
    /// the source path. A directory is added recursively, anything else as a
    /// single entry. Symlinks below a directory are archived as links.
    ///
    /// On errors after `destination` was created the partial archive is left
    /// in place.
    pub fn archive(
        &self,
        source: &Path,
        archive_root_name: &str,
        destination: &Path,
    ) -> Result<Artifact, ArchiveError> {
        if !source.exists() {
            return Err(ArchiveError::SourceMissing(source.to_path_buf()));
        }

        let archive_file = File::create_new(destination)?;
        let encoder = GzEncoder::new(archive_file, self.compression);

        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        if source.is_dir() {
            builder.append_dir_all(archive_root_name, source)?;
        } else {
            builder.append_path_with_name(source, archive_root_name)?;
        }

        let encoder = builder.into_inner()?;
        encoder.finish()?;

        Ok(Artifact::from_path(destination)?)
    }
}

impl Backup for ArchiveWriter {
    type Target = WebsiteTarget;
    type Error = ArchiveError;

    fn file_name(&self, target: &WebsiteTarget, timestamp: &str) -> String {
        format!("{}_website_{timestamp}.tar.gz", target.name)
    }

    fn backup(&self, target: &WebsiteTarget, destination: &Path) -> Result<Artifact, ArchiveError> {
        self.archive(&target.path, &target.name, destination)
    }
}
