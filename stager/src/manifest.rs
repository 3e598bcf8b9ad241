//! Removing transient packages from the dependency manifest.
//!
//! The manifest is parsed into an order-preserving JSON document, pruned in
//! memory, and written back only when something was removed. Rewrites use two
//! space indentation with a trailing newline and replace the file atomically.
//! Every key other than the pruned dependency entries survives untouched and
//! in its original position.

use crate::assets::PackageName;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;

/// Errors from reading or rewriting the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest could not be read.
    #[error("could not read {path}: {source}")]
    Unreadable {
        /// Manifest path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not a JSON object.
    #[error("{path} is not a valid manifest: {reason}")]
    Malformed {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The rewritten manifest could not be written.
    #[error("could not write {path}: {source}")]
    WriteFailed {
        /// Manifest path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// What reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconcileResult {
    /// No transient package was declared; the file was not touched.
    NoChange,
    /// The listed packages were removed and the file was rewritten.
    Rewritten(Vec<PackageName>),
}

/// A parsed manifest document.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    path: Utf8PathBuf,
    document: Map<String, Value>,
}

impl Manifest {
    /// Read and parse the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Unreadable`] if the file cannot be read, or
    /// [`ManifestError::Malformed`] if it is not a JSON object.
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Unreadable {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Parse manifest text. `path` is recorded for later writes and errors.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] if `text` is not a JSON object.
    pub fn parse(path: &Utf8Path, text: &str) -> Result<Self, ManifestError> {
        let malformed = |reason: String| ManifestError::Malformed {
            path: path.to_owned(),
            reason,
        };
        match serde_json::from_str::<Value>(text).map_err(|e| malformed(e.to_string()))? {
            Value::Object(document) => Ok(Self {
                path: path.to_owned(),
                document,
            }),
            _ => Err(malformed("top-level value is not an object".to_owned())),
        }
    }

    /// The transient packages declared in any of `sections`, in the order
    /// they are given, each listed once.
    #[must_use]
    pub fn declared(&self, transient: &[PackageName], sections: &[String]) -> Vec<PackageName> {
        let mut found: Vec<PackageName> = Vec::new();
        for name in transient {
            let declared = sections.iter().any(|section| {
                self.section(section)
                    .is_some_and(|deps| deps.contains_key(name.as_str()))
            });
            if declared && !found.contains(name) {
                found.push(name.clone());
            }
        }
        found
    }

    /// Remove every entry for `names` from `sections`.
    pub fn remove(&mut self, names: &[PackageName], sections: &[String]) {
        for section in sections {
            if let Some(Value::Object(deps)) = self.document.get_mut(section) {
                for name in names {
                    deps.shift_remove(name.as_str());
                }
            }
        }
    }

    /// Render the document the way it is written to disk.
    ///
    /// # Errors
    ///
    /// Returns a serialization error, which cannot occur for parsed
    /// documents.
    pub fn render(&self) -> serde_json::Result<String> {
        let mut text = serde_json::to_string_pretty(&self.document)?;
        text.push('\n');
        Ok(text)
    }

    /// Write the document back to its path, replacing the file atomically.
    ///
    /// An existing file's permissions carry over to the replacement.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::WriteFailed`] if the temporary file cannot
    /// be written or renamed into place.
    pub fn save(&self) -> Result<(), ManifestError> {
        let write_failed = |source: std::io::Error| ManifestError::WriteFailed {
            path: self.path.clone(),
            source,
        };
        let text = self.render().map_err(|e| write_failed(e.into()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        let mut staged = tempfile::Builder::new()
            .prefix(".manifest-")
            .tempfile_in(dir)
            .map_err(write_failed)?;
        staged.write_all(text.as_bytes()).map_err(write_failed)?;
        if let Ok(existing) = std::fs::metadata(&self.path) {
            staged
                .as_file()
                .set_permissions(existing.permissions())
                .map_err(write_failed)?;
        }
        staged.as_file().sync_all().map_err(write_failed)?;
        staged.persist(&self.path).map_err(|e| write_failed(e.error))?;
        Ok(())
    }

    fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.document.get(name).and_then(Value::as_object)
    }
}

/// Remove every declared transient package from the manifest at `path`.
///
/// Only the objects named in `sections` are inspected; a section that is
/// absent or not an object is ignored. The file is rewritten only when at
/// least one entry was removed, so running this twice yields
/// [`ReconcileResult::NoChange`] the second time.
///
/// # Errors
///
/// Returns a [`ManifestError`] if the manifest cannot be read, parsed, or
/// written.
///
/// # Examples
///
/// ```
/// use asset_stager::assets::PackageName;
/// use asset_stager::manifest::{ReconcileResult, reconcile};
/// use camino::Utf8PathBuf;
///
/// let dir = tempfile::tempdir()?;
/// let path = Utf8PathBuf::try_from(dir.path().join("package.json"))?;
/// std::fs::write(&path, r#"{"dependencies": {"a": "1", "grammar": "2"}}"#)?;
///
/// let sections = vec!["dependencies".to_owned()];
/// let names = vec![PackageName::from("grammar")];
/// let first = reconcile(&path, &names, &sections)?;
/// assert_eq!(first, ReconcileResult::Rewritten(names.clone()));
/// assert_eq!(reconcile(&path, &names, &sections)?, ReconcileResult::NoChange);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn reconcile(
    path: &Utf8Path,
    transient: &[PackageName],
    sections: &[String],
) -> Result<ReconcileResult, ManifestError> {
    let mut manifest = Manifest::load(path)?;
    let removed = manifest.declared(transient, sections);
    if removed.is_empty() {
        log::debug!("no transient packages declared in {path}");
        return Ok(ReconcileResult::NoChange);
    }
    manifest.remove(&removed, sections);
    manifest.save()?;
    log::debug!("removed {} transient packages from {path}", removed.len());
    Ok(ReconcileResult::Rewritten(removed))
}
