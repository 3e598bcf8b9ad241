//! Archive extraction strategies.
//!
//! [`CommandExtractor`] shells out to the configured extraction tool through a
//! [`CommandRunner`]. [`TarGzExtractor`] unpacks gzip-compressed tarballs in
//! process, rejecting entries that would escape the destination directory and
//! link entries.

use crate::command::{CommandExecutionError, CommandRunner, RunOptions};
use crate::config::{ARCHIVE_PLACEHOLDER, DEST_PLACEHOLDER, expand_template};
use camino::Utf8Path;
use std::path::{Component, Path};
use std::time::Duration;

/// Trait for extracting downloaded archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionError`] describing why extraction failed.
    fn extract(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<(), ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains a symlink or hard link entry.
    #[error("link entry not allowed: {path}")]
    LinkEntry {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no files.
    #[error("archive contains no files")]
    EmptyArchive,

    /// The external extraction command failed.
    #[error(transparent)]
    Command(#[from] CommandExecutionError),
}

/// Extracts archives by running a command template such as
/// `tar -xzf {archive} -C {dest}`.
pub struct CommandExtractor<'a> {
    runner: &'a dyn CommandRunner,
    template: &'a [String],
    timeout: Option<Duration>,
}

impl<'a> CommandExtractor<'a> {
    /// Create an extractor that expands `template` and runs it via `runner`.
    #[must_use]
    pub fn new(
        runner: &'a dyn CommandRunner,
        template: &'a [String],
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            template,
            timeout,
        }
    }
}

impl ArchiveExtractor for CommandExtractor<'_> {
    fn extract(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<(), ExtractionError> {
        let expanded = expand_template(
            self.template,
            &[
                (ARCHIVE_PLACEHOLDER, archive.as_str()),
                (DEST_PLACEHOLDER, dest.as_str()),
            ],
        );
        let Some((program, args)) = expanded.split_first() else {
            return Err(std::io::Error::other("extract command is empty").into());
        };
        let options = RunOptions::in_dir(dest).with_timeout(self.timeout);
        self.runner.run(program, args, &options)?;
        Ok(())
    }
}

/// In-process extractor for `.tgz` archives using `flate2` and `tar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<(), ExtractionError> {
        let file = std::fs::File::open(archive)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut tarball = tar::Archive::new(decoder);
        let mut extracted = 0_usize;

        for entry_result in tarball.entries()? {
            let mut entry = entry_result?;
            let entry_path = entry.path()?.into_owned();

            validate_entry_path(&entry_path)?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_symlink() || entry_type.is_hard_link() {
                return Err(ExtractionError::LinkEntry {
                    path: entry_path.display().to_string(),
                });
            }

            let dest_path = dest.as_std_path().join(&entry_path);
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            entry.unpack(&dest_path)?;
            extracted += 1;
        }

        if extracted == 0 {
            return Err(ExtractionError::EmptyArchive);
        }

        Ok(())
    }
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
