//! Scoped temporary workspace.
//!
//! [`with_workspace`] creates a uniquely named directory, hands it to a
//! closure, and removes the whole tree afterwards. Removal also happens if the
//! closure panics, because the directory is owned by a [`tempfile::TempDir`]
//! whose drop handler runs during unwinding. A failed removal is reported on
//! the returned [`ScopedRun`] and logged; it never replaces the closure's
//! result.

use crate::error::{Result, StagerError};
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::Cell;
use tempfile::TempDir;

/// A private scratch directory owned by one pipeline run.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    path: Utf8PathBuf,
    scratch_count: Cell<usize>,
}

impl Workspace {
    /// Root of the workspace.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Create a fresh, empty subdirectory labelled `label`.
    ///
    /// Directory names are numbered in creation order, so repeated labels
    /// never share a directory.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while creating the directory.
    pub fn scratch_dir(&self, label: &str) -> std::io::Result<Utf8PathBuf> {
        let index = self.scratch_count.get();
        self.scratch_count.set(index + 1);
        let dir = self.path.join(format!("{index:03}-{label}"));
        std::fs::create_dir(&dir)?;
        Ok(dir)
    }

    fn create(parent: Option<&Utf8Path>, prefix: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|source| StagerError::WorkspaceCreation { source })?;

        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).map_err(|e| {
            StagerError::WorkspaceCreation {
                source: std::io::Error::other(format!("workspace path is not UTF-8: {e}")),
            }
        })?;
        Ok(Self {
            dir,
            path,
            scratch_count: Cell::new(0),
        })
    }

    fn close(self) -> Option<String> {
        let path = self.path;
        match self.dir.close() {
            Ok(()) => None,
            Err(e) => {
                log::warn!("failed to remove temporary workspace {path}: {e}");
                Some(format!("failed to remove {path}: {e}"))
            }
        }
    }
}

/// The value produced inside a workspace, plus how cleanup went.
#[derive(Debug)]
pub struct ScopedRun<T> {
    /// What the closure returned.
    pub value: T,
    /// Where the workspace lived. It no longer exists unless
    /// `cleanup_error` is set.
    pub path: Utf8PathBuf,
    /// Description of a failed removal, if any.
    pub cleanup_error: Option<String>,
}

/// Run `f` inside a new workspace under the system temporary directory.
///
/// # Errors
///
/// Returns [`StagerError::WorkspaceCreation`] if the directory cannot be
/// created. `f` is not called in that case.
///
/// # Examples
///
/// ```
/// use asset_stager::workspace::with_workspace;
///
/// let run = with_workspace("doc-example-", |ws| ws.path().is_dir())?;
/// assert!(run.value);
/// assert!(!run.path.exists());
/// # Ok::<(), asset_stager::error::StagerError>(())
/// ```
pub fn with_workspace<T>(prefix: &str, f: impl FnOnce(&Workspace) -> T) -> Result<ScopedRun<T>> {
    with_workspace_in(None, prefix, f)
}

/// Run `f` inside a new workspace created under `parent`, or under the
/// system temporary directory when `parent` is `None`.
///
/// # Errors
///
/// Returns [`StagerError::WorkspaceCreation`] if the directory cannot be
/// created. `f` is not called in that case.
pub fn with_workspace_in<T>(
    parent: Option<&Utf8Path>,
    prefix: &str,
    f: impl FnOnce(&Workspace) -> T,
) -> Result<ScopedRun<T>> {
    let workspace = Workspace::create(parent, prefix)?;
    log::debug!("created temporary workspace {}", workspace.path());
    let value = f(&workspace);
    let path = workspace.path().to_owned();
    let cleanup_error = workspace.close();
    Ok(ScopedRun {
        value,
        path,
        cleanup_error,
    })
}
