//! The output directory and atomic per-file staging.
//!
//! Both the direct copier and the transient fetcher write through
//! [`OutputDir::stage`], which copies into a temporary file beside the
//! destination and renames it into place. A reader of the output directory
//! therefore sees either the previous file or the complete new one.

use crate::error::{Result, StagerError};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Errors from staging a single asset.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The source asset does not exist.
    #[error("asset not found at {path}")]
    SourceMissing {
        /// Path that was looked up.
        path: Utf8PathBuf,
    },

    /// The source exists but is not a regular file, for example a symlink.
    #[error("asset at {path} is not a regular file")]
    NotRegularFile {
        /// Path that was looked up.
        path: Utf8PathBuf,
    },

    /// Copying into the output directory failed.
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        /// Source path.
        from: Utf8PathBuf,
        /// Destination path.
        to: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// The single directory all staged assets land in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDir {
    path: Utf8PathBuf,
}

impl OutputDir {
    /// Create a handle for the given directory. Nothing is touched on disk.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the output directory path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Ensure the output directory exists and is writable.
    ///
    /// # Errors
    ///
    /// Returns [`StagerError::OutputDirCreation`] if the directory cannot be
    /// created, or [`StagerError::OutputDirNotWritable`] if a probe file
    /// cannot be written inside it.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.path).map_err(|e| StagerError::OutputDirCreation {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        match tempfile::Builder::new()
            .prefix(".asset-stager-probe")
            .tempfile_in(&self.path)
        {
            Ok(probe) => {
                if let Err(e) = probe.close() {
                    log::debug!("failed to remove write probe in {}: {e}", self.path);
                }
                Ok(())
            }
            Err(e) => Err(StagerError::OutputDirNotWritable {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Destination path for an asset name.
    #[must_use]
    pub fn destination(&self, asset_name: &str) -> Utf8PathBuf {
        self.path.join(asset_name)
    }

    /// Copy `source` into the output directory as `asset_name`, replacing any
    /// existing file of that name. The staged file takes the source's
    /// permissions.
    ///
    /// Symlinks are never followed.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::SourceMissing`] if `source` does not exist,
    /// [`StageError::NotRegularFile`] if it is a symlink or other non-file,
    /// or [`StageError::Copy`] if the copy or the final rename fails.
    pub fn stage(
        &self,
        source: &Utf8Path,
        asset_name: &str,
    ) -> std::result::Result<Utf8PathBuf, StageError> {
        let dest = self.destination(asset_name);
        let copy_error = |source_err: io::Error| StageError::Copy {
            from: source.to_owned(),
            to: dest.clone(),
            source: source_err,
        };

        let metadata = match fs::symlink_metadata(source) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StageError::SourceMissing {
                    path: source.to_owned(),
                });
            }
            Err(e) => return Err(copy_error(e)),
        };
        if !metadata.file_type().is_file() {
            return Err(StageError::NotRegularFile {
                path: source.to_owned(),
            });
        }

        let mut reader = fs::File::open(source).map_err(copy_error)?;
        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&self.path)
            .map_err(copy_error)?;
        io::copy(&mut reader, staged.as_file_mut()).map_err(copy_error)?;
        staged
            .as_file()
            .set_permissions(metadata.permissions())
            .map_err(copy_error)?;
        staged.as_file().sync_all().map_err(copy_error)?;
        staged.persist(&dest).map_err(|e| copy_error(e.error))?;

        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        (temp, root)
    }

    #[test]
    fn prepare_creates_nested_directories() {
        let (_temp, root) = temp_root();
        let output = OutputDir::new(root.join("public").join("wasm"));

        output.prepare().expect("prepare should succeed");

        assert!(output.path().is_dir());
        let leftovers: Vec<_> = fs::read_dir(output.path()).expect("read dir").collect();
        assert!(leftovers.is_empty(), "probe file should be removed");
    }

    #[test]
    fn prepare_fails_when_path_is_a_file() {
        let (_temp, root) = temp_root();
        let occupied = root.join("occupied");
        fs::write(&occupied, b"file").expect("write file");

        let err = OutputDir::new(occupied.join("wasm"))
            .prepare()
            .expect_err("prepare should fail");
        assert!(matches!(err, StagerError::OutputDirCreation { .. }));
    }

    #[test]
    fn stage_overwrites_existing_file() {
        let (_temp, root) = temp_root();
        let output = OutputDir::new(root.join("out"));
        output.prepare().expect("prepare");
        fs::write(output.destination("core.bin"), b"old").expect("seed old file");

        let source = root.join("core.bin");
        fs::write(&source, b"new contents").expect("write source");

        let dest = output.stage(&source, "core.bin").expect("stage");
        assert_eq!(fs::read(dest).expect("read staged"), b"new contents");
    }

    #[test]
    fn stage_reports_missing_source() {
        let (_temp, root) = temp_root();
        let output = OutputDir::new(root.join("out"));
        output.prepare().expect("prepare");

        let err = output
            .stage(&root.join("absent.bin"), "absent.bin")
            .expect_err("missing source");
        assert!(matches!(err, StageError::SourceMissing { .. }));
        assert!(!output.destination("absent.bin").exists());
    }

    #[cfg(unix)]
    #[test]
    fn stage_keeps_source_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, root) = temp_root();
        let output = OutputDir::new(root.join("out"));
        output.prepare().expect("prepare");
        let source = root.join("grammar.wasm");
        fs::write(&source, b"wasm").expect("write source");
        fs::set_permissions(&source, fs::Permissions::from_mode(0o644)).expect("chmod source");

        let dest = output.stage(&source, "grammar.wasm").expect("stage");

        let mode = fs::metadata(dest).expect("stat staged").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn stage_refuses_symlinked_source() {
        let (_temp, root) = temp_root();
        let output = OutputDir::new(root.join("out"));
        output.prepare().expect("prepare");
        let secret = root.join("secret.txt");
        fs::write(&secret, b"host file").expect("write secret");
        let link = root.join("grammar.wasm");
        std::os::unix::fs::symlink(&secret, &link).expect("create symlink");

        let err = output
            .stage(&link, "grammar.wasm")
            .expect_err("symlink must not be staged");

        assert!(matches!(err, StageError::NotRegularFile { .. }));
        assert!(!output.destination("grammar.wasm").exists());
    }

    #[test]
    fn stage_leaves_no_temporary_files() {
        let (_temp, root) = temp_root();
        let output = OutputDir::new(root.join("out"));
        output.prepare().expect("prepare");
        let source = root.join("a.bin");
        fs::write(&source, b"a").expect("write source");

        output.stage(&source, "a.bin").expect("stage");

        let names: Vec<String> = fs::read_dir(output.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.bin".to_owned()]);
    }
}
