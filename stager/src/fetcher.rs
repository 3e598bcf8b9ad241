//! Download, unpack, and stage one transient package.
//!
//! Each package runs through download, extraction, and copy inside its own
//! scratch directory of the run's workspace. Any failure stops that package
//! only and is folded into its [`OutcomeRecord`]; nothing escapes
//! [`TransientFetcher::fetch_and_stage`] as an error.

use crate::assets::{
    AssetSpec, PackageName, SourceAssetMap, TransientPackageSpec, is_bare_file_name,
};
use crate::command::{CommandExecutionError, CommandRunner, RunOptions, display_command};
use crate::config::{SPEC_PLACEHOLDER, expand_template};
use crate::extraction::{ArchiveExtractor, ExtractionError};
use crate::output::Progress;
use crate::stager::{OutputDir, StageError};
use crate::workspace::Workspace;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::time::Duration;

/// How one transient package fared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PackageOutcome {
    /// Every required asset was staged.
    Success,
    /// The archive could not be downloaded.
    DownloadFailed {
        /// Failure description.
        reason: String,
    },
    /// The archive could not be unpacked.
    ExtractFailed {
        /// Failure description.
        reason: String,
    },
    /// A required asset was absent from the archive or could not be copied.
    CopyFailed {
        /// Failure description.
        reason: String,
    },
    /// The package was not attempted.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
}

impl PackageOutcome {
    /// Returns `true` for the three failure variants.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed { .. } | Self::ExtractFailed { .. } | Self::CopyFailed { .. }
        )
    }

    /// The failure or skip reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::DownloadFailed { reason }
            | Self::ExtractFailed { reason }
            | Self::CopyFailed { reason }
            | Self::Skipped { reason } => Some(reason),
        }
    }
}

/// The recorded result of processing one transient package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    /// Package name.
    pub package: PackageName,
    /// The `name@version` reference that was requested.
    pub reference: String,
    /// What happened.
    pub outcome: PackageOutcome,
    /// Destination paths of staged assets; empty unless the package succeeded.
    pub staged: Vec<Utf8PathBuf>,
}

/// Settings shared by every package in a run.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings<'a> {
    /// Download command template containing `{spec}`.
    pub download_command: &'a [String],
    /// Directory name the archive unpacks its contents under.
    pub extracted_subdir: &'a str,
    /// Per-command timeout for the download.
    pub timeout: Option<Duration>,
}

/// Internal error type for one package.
///
/// Not exported; every variant is mapped to a [`PackageOutcome`].
#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("could not prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error(transparent)]
    Download(CommandExecutionError),

    #[error("download command template is empty")]
    EmptyDownloadCommand,

    #[error("download command `{command}` did not report an archive name")]
    NoArchiveName { command: String },

    #[error("download command reported {name:?}, which is not a bare archive file name")]
    UnsafeArchiveName { name: String },

    #[error(transparent)]
    Extract(#[from] ExtractionError),

    #[error("{assets} not found in {dir}")]
    MissingAssets { dir: Utf8PathBuf, assets: String },

    #[error("not a regular file in {dir}: {assets}")]
    IrregularAssets { dir: Utf8PathBuf, assets: String },

    #[error(transparent)]
    Stage(#[from] StageError),
}

impl FetchError {
    fn into_outcome(self) -> PackageOutcome {
        let reason = match &self {
            Self::Download(e) | Self::Extract(ExtractionError::Command(e)) => e.reason(),
            _ => self.to_string(),
        };
        match self {
            Self::Scratch(_)
            | Self::Download(_)
            | Self::EmptyDownloadCommand
            | Self::NoArchiveName { .. }
            | Self::UnsafeArchiveName { .. } => PackageOutcome::DownloadFailed { reason },
            Self::Extract(_) => PackageOutcome::ExtractFailed { reason },
            Self::MissingAssets { .. } | Self::IrregularAssets { .. } | Self::Stage(_) => {
                PackageOutcome::CopyFailed { reason }
            }
        }
    }
}

/// Fetches transient packages and stages their assets.
pub struct TransientFetcher<'a> {
    runner: &'a dyn CommandRunner,
    extractor: &'a dyn ArchiveExtractor,
    assets: &'a SourceAssetMap,
    output: &'a OutputDir,
    settings: FetchSettings<'a>,
}

impl<'a> TransientFetcher<'a> {
    /// Create a fetcher using the injected runner and extractor.
    #[must_use]
    pub fn new(
        runner: &'a dyn CommandRunner,
        extractor: &'a dyn ArchiveExtractor,
        assets: &'a SourceAssetMap,
        output: &'a OutputDir,
        settings: FetchSettings<'a>,
    ) -> Self {
        Self {
            runner,
            extractor,
            assets,
            output,
            settings,
        }
    }

    /// Download `spec`, unpack it, and stage its assets.
    ///
    /// A package without an entry in the asset map is recorded as
    /// [`PackageOutcome::Skipped`] and no command is run for it.
    pub fn fetch_and_stage(
        &self,
        spec: &TransientPackageSpec,
        workspace: &Workspace,
        progress: &mut Progress<'_>,
    ) -> OutcomeRecord {
        let reference = spec.reference();
        let record = |outcome, staged| OutcomeRecord {
            package: spec.name.clone(),
            reference: reference.clone(),
            outcome,
            staged,
        };

        let Some(asset_spec) = self.assets.spec_for(&spec.name) else {
            log::warn!("no assets configured for {}; skipping", spec.name);
            progress.alert(format!(
                "[WARN] No assets configured for {}, skipping.",
                spec.name
            ));
            let outcome = PackageOutcome::Skipped {
                reason: "no assets configured".to_owned(),
            };
            return record(outcome, Vec::new());
        };

        progress.blank();
        progress.line(format!("Processing {reference}..."));
        match self.try_fetch(&reference, &asset_spec, workspace, progress) {
            Ok(staged) => record(PackageOutcome::Success, staged),
            Err(e) => {
                let outcome = e.into_outcome();
                let reason = outcome.reason().unwrap_or_default();
                log::warn!("failed to process {reference}: {reason}");
                progress.alert(format!("[ERROR] Failed to process {reference}: {reason}"));
                record(outcome, Vec::new())
            }
        }
    }

    fn try_fetch(
        &self,
        reference: &str,
        asset_spec: &AssetSpec,
        workspace: &Workspace,
        progress: &mut Progress<'_>,
    ) -> Result<Vec<Utf8PathBuf>, FetchError> {
        let scratch = workspace
            .scratch_dir(&scratch_label(&asset_spec.source_package))
            .map_err(FetchError::Scratch)?;

        let archive = self.download(reference, &scratch, progress)?;

        let archive_name = archive.file_name().unwrap_or(archive.as_str());
        progress.line(format!("Extracting {archive_name}..."));
        self.extractor.extract(&archive, &scratch)?;

        let extracted = scratch.join(self.settings.extracted_subdir);
        check_extracted_assets(&extracted, &asset_spec.asset_names)?;

        let mut staged = Vec::with_capacity(asset_spec.asset_names.len());
        for asset in &asset_spec.asset_names {
            let dest = self.output.stage(&extracted.join(asset.as_str()), asset)?;
            progress.line(format!("Copied {asset} to {}", self.output.path()));
            staged.push(dest);
        }
        Ok(staged)
    }

    /// Run the download command inside `scratch` and return the archive path.
    fn download(
        &self,
        reference: &str,
        scratch: &Utf8Path,
        progress: &mut Progress<'_>,
    ) -> Result<Utf8PathBuf, FetchError> {
        let expanded = expand_template(
            self.settings.download_command,
            &[(SPEC_PLACEHOLDER, reference)],
        );
        let (program, args) = expanded
            .split_first()
            .ok_or(FetchError::EmptyDownloadCommand)?;
        let command = display_command(program, args);
        progress.line(format!("> {command}"));

        let options = RunOptions::in_dir(scratch).with_timeout(self.settings.timeout);
        let output = self
            .runner
            .run(program, args, &options)
            .map_err(FetchError::Download)?;
        if !output.stderr.is_empty() {
            progress.line(&output.stderr);
        }

        let archive_name = output
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(FetchError::NoArchiveName { command })?;
        if !is_bare_file_name(archive_name) {
            return Err(FetchError::UnsafeArchiveName {
                name: archive_name.to_owned(),
            });
        }
        Ok(scratch.join(archive_name))
    }
}

/// Require every asset to be a regular file directly inside `extracted`.
///
/// Symlinks are not followed, so an archive cannot point an asset at a file
/// outside the workspace.
fn check_extracted_assets(extracted: &Utf8Path, assets: &[String]) -> Result<(), FetchError> {
    let mut missing = Vec::new();
    let mut irregular = Vec::new();
    for asset in assets {
        match std::fs::symlink_metadata(extracted.join(asset.as_str())) {
            Ok(metadata) if metadata.file_type().is_file() => {}
            Ok(_) => irregular.push(asset.as_str()),
            Err(_) => missing.push(asset.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(FetchError::MissingAssets {
            dir: extracted.to_owned(),
            assets: missing.join(", "),
        });
    }
    if !irregular.is_empty() {
        return Err(FetchError::IrregularAssets {
            dir: extracted.to_owned(),
            assets: irregular.join(", "),
        });
    }
    Ok(())
}

/// Directory-safe label for a package's scratch directory.
fn scratch_label(package: &PackageName) -> String {
    package
        .as_str()
        .trim_start_matches('@')
        .replace(['/', '\\'], "-")
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
