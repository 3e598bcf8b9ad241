//! Copying assets out of already-installed packages.
//!
//! Direct packages are real dependencies of the consuming project, so their
//! assets are looked up under the installed modules directory rather than
//! fetched. Each asset is copied independently and a missing one only affects
//! its own record.

use crate::assets::{AssetSpec, PackageName};
use crate::output::Progress;
use crate::stager::OutputDir;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

/// Result of copying one direct asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DirectOutcome {
    /// The asset was staged at `path`.
    Copied {
        /// Destination in the output directory.
        path: Utf8PathBuf,
    },
    /// The asset could not be found or copied.
    Missing {
        /// Why the copy did not happen.
        reason: String,
    },
}

/// Per-asset record for a direct copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectCopyRecord {
    /// Package the asset ships in.
    pub package: PackageName,
    /// Asset file name.
    pub asset: String,
    /// What happened.
    pub outcome: DirectOutcome,
}

impl DirectCopyRecord {
    /// Returns `true` when the asset was staged.
    #[must_use]
    pub fn is_copied(&self) -> bool {
        matches!(self.outcome, DirectOutcome::Copied { .. })
    }
}

/// Copies assets from installed packages into the output directory.
#[derive(Debug)]
pub struct DirectAssetCopier<'a> {
    modules_dir: &'a Utf8Path,
    output: &'a OutputDir,
}

impl<'a> DirectAssetCopier<'a> {
    /// Create a copier reading from `modules_dir` and writing to `output`.
    #[must_use]
    pub fn new(modules_dir: &'a Utf8Path, output: &'a OutputDir) -> Self {
        Self {
            modules_dir,
            output,
        }
    }

    /// Where `asset` is expected inside the installed `package`.
    #[must_use]
    pub fn source_path(&self, package: &PackageName, asset: &str) -> Utf8PathBuf {
        self.modules_dir.join(package.as_str()).join(asset)
    }

    /// Copy every asset of `spec`, in order, overwriting existing files.
    pub fn copy_direct(
        &self,
        spec: &AssetSpec,
        progress: &mut Progress<'_>,
    ) -> Vec<DirectCopyRecord> {
        spec.asset_names
            .iter()
            .map(|asset| self.copy_one(&spec.source_package, asset, progress))
            .collect()
    }

    fn copy_one(
        &self,
        package: &PackageName,
        asset: &str,
        progress: &mut Progress<'_>,
    ) -> DirectCopyRecord {
        let source = self.source_path(package, asset);
        log::debug!("copying direct asset {source}");
        let outcome = match self.output.stage(&source, asset) {
            Ok(path) => {
                progress.line(format!(
                    "Copied {asset} from {package} to {}",
                    self.output.path()
                ));
                DirectOutcome::Copied { path }
            }
            Err(e) => {
                progress.alert(format!("[ERROR] Could not copy {asset} from {package}: {e}"));
                DirectOutcome::Missing {
                    reason: e.to_string(),
                }
            }
        };
        DirectCopyRecord {
            package: package.clone(),
            asset: asset.to_owned(),
            outcome,
        }
    }
}
