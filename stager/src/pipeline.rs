//! Phase sequencing and outcome aggregation.
//!
//! A run prepares the output directory, copies direct assets, fetches every
//! transient package inside one scoped workspace, and finally reconciles the
//! manifest. Only output-directory preparation and workspace creation can
//! abort a run; everything else ends up in the [`RunSummary`].

use crate::assets::{PackageName, SourceAssetMap};
use crate::command::CommandRunner;
use crate::config::{ExtractorKind, StagerConfig};
use crate::direct::{DirectAssetCopier, DirectCopyRecord, DirectOutcome};
use crate::error::Result;
use crate::extraction::{ArchiveExtractor, CommandExtractor, TarGzExtractor};
use crate::fetcher::{FetchSettings, OutcomeRecord, PackageOutcome, TransientFetcher};
use crate::manifest::{Manifest, ReconcileResult, reconcile};
use crate::output::Progress;
use crate::stager::OutputDir;
use crate::workspace::with_workspace_in;
use camino::Utf8PathBuf;
use serde::Serialize;
use std::io::Write;

/// Per-run switches that are not part of the static configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Leave the manifest alone.
    pub skip_manifest: bool,
    /// Suppress ordinary progress lines.
    pub quiet: bool,
    /// Create the workspace here instead of the system temporary directory.
    pub workspace_parent: Option<Utf8PathBuf>,
}

/// What happened to the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManifestStatus {
    /// The listed packages were removed.
    Rewritten {
        /// Removed package names.
        removed: Vec<PackageName>,
    },
    /// No transient package was declared.
    NoChange,
    /// The manifest could not be read, parsed, or written.
    Failed {
        /// Failure description.
        reason: String,
    },
    /// Reconciliation was turned off for this run.
    Skipped,
}

/// Outcome tallies for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    /// Transient packages whose assets were all staged.
    pub succeeded: usize,
    /// Transient packages that were not attempted.
    pub skipped: usize,
    /// Transient packages that failed.
    pub failed: usize,
    /// Direct assets staged.
    pub direct_copied: usize,
    /// Direct assets that could not be staged.
    pub direct_missing: usize,
}

impl OutcomeCounts {
    fn tally(direct: &[DirectCopyRecord], packages: &[OutcomeRecord]) -> Self {
        let mut counts = Self::default();
        for record in direct {
            match record.outcome {
                DirectOutcome::Copied { .. } => counts.direct_copied += 1,
                DirectOutcome::Missing { .. } => counts.direct_missing += 1,
            }
        }
        for record in packages {
            match record.outcome {
                PackageOutcome::Success => counts.succeeded += 1,
                PackageOutcome::Skipped { .. } => counts.skipped += 1,
                PackageOutcome::DownloadFailed { .. }
                | PackageOutcome::ExtractFailed { .. }
                | PackageOutcome::CopyFailed { .. } => counts.failed += 1,
            }
        }
        counts
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Where assets were staged.
    pub output_dir: Utf8PathBuf,
    /// One record per direct asset.
    pub direct: Vec<DirectCopyRecord>,
    /// One record per transient package, in configuration order.
    pub packages: Vec<OutcomeRecord>,
    /// Manifest reconciliation result.
    pub manifest: ManifestStatus,
    /// Set when the workspace could not be removed.
    pub cleanup_warning: Option<String>,
    /// Tallies derived from the records.
    pub counts: OutcomeCounts,
}

impl RunSummary {
    /// Assemble a summary and compute its counts.
    #[must_use]
    pub fn new(
        output_dir: Utf8PathBuf,
        direct: Vec<DirectCopyRecord>,
        packages: Vec<OutcomeRecord>,
        manifest: ManifestStatus,
        cleanup_warning: Option<String>,
    ) -> Self {
        let counts = OutcomeCounts::tally(&direct, &packages);
        Self {
            output_dir,
            direct,
            packages,
            manifest,
            cleanup_warning,
            counts,
        }
    }

    /// Returns `true` when any transient package or direct asset failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0 || self.counts.direct_missing > 0
    }
}

/// Run the pipeline with the extractor selected by `config.extractor`.
///
/// # Errors
///
/// Returns a [`crate::error::StagerError`] when the output directory cannot
/// be prepared or the workspace cannot be created.
pub fn run_pipeline(
    config: &StagerConfig,
    options: &PipelineOptions,
    runner: &dyn CommandRunner,
    stderr: &mut dyn Write,
) -> Result<RunSummary> {
    match config.extractor {
        ExtractorKind::Command => {
            let extractor =
                CommandExtractor::new(runner, &config.extract_command, config.command_timeout());
            run_pipeline_with(config, options, runner, &extractor, stderr)
        }
        ExtractorKind::Builtin => run_pipeline_with(config, options, runner, &TarGzExtractor, stderr),
    }
}

/// Testable inner function with an injected extractor.
///
/// # Errors
///
/// Returns a [`crate::error::StagerError`] when the output directory cannot
/// be prepared or the workspace cannot be created.
pub fn run_pipeline_with(
    config: &StagerConfig,
    options: &PipelineOptions,
    runner: &dyn CommandRunner,
    extractor: &dyn ArchiveExtractor,
    stderr: &mut dyn Write,
) -> Result<RunSummary> {
    let mut progress = Progress::new(stderr, options.quiet);
    let output = OutputDir::new(config.output_dir.clone());
    progress.line(format!("Ensuring output directory exists at: {}", output.path()));
    output.prepare()?;

    let assets = config.asset_map();
    let direct = copy_direct_assets(config, &assets, &output, &mut progress);

    let fetcher = TransientFetcher::new(
        runner,
        extractor,
        &assets,
        &output,
        FetchSettings {
            download_command: &config.download_command,
            extracted_subdir: &config.extracted_subdir,
            timeout: config.command_timeout(),
        },
    );
    let run = with_workspace_in(
        options.workspace_parent.as_deref(),
        &config.workspace_prefix,
        |workspace| {
            progress.line(format!("Created temporary directory: {}", workspace.path()));
            progress.blank();
            progress.line("Fetching and extracting assets from transient packages...");
            let records: Vec<OutcomeRecord> = config
                .transient
                .iter()
                .map(|spec| fetcher.fetch_and_stage(spec, workspace, &mut progress))
                .collect();
            progress.blank();
            progress.line(format!("Cleaning up temporary directory: {}", workspace.path()));
            records
        },
    )?;
    if let Some(warning) = &run.cleanup_error {
        progress.alert(format!("[WARN] {warning}"));
    }

    let manifest = reconcile_manifest(config, options, &mut progress);

    progress.blank();
    progress.line("Asset preparation complete.");
    Ok(RunSummary::new(
        config.output_dir.clone(),
        direct,
        run.value,
        manifest,
        run.cleanup_error,
    ))
}

fn copy_direct_assets(
    config: &StagerConfig,
    assets: &SourceAssetMap,
    output: &OutputDir,
    progress: &mut Progress<'_>,
) -> Vec<DirectCopyRecord> {
    progress.blank();
    progress.line("Copying assets from direct dependencies...");
    let copier = DirectAssetCopier::new(&config.modules_dir, output);
    let mut records = Vec::new();
    for package in &config.direct {
        match assets.spec_for(package) {
            Some(spec) => records.extend(copier.copy_direct(&spec, progress)),
            None => {
                log::warn!("no assets configured for direct package {package}; skipping");
                progress.alert(format!(
                    "[WARN] No assets configured for {package}, skipping."
                ));
            }
        }
    }
    records
}

fn reconcile_manifest(
    config: &StagerConfig,
    options: &PipelineOptions,
    progress: &mut Progress<'_>,
) -> ManifestStatus {
    if options.skip_manifest {
        log::debug!("manifest reconciliation skipped");
        return ManifestStatus::Skipped;
    }

    progress.blank();
    progress.line(format!(
        "Checking for transient dependencies to remove from {}...",
        config.manifest
    ));
    match reconcile(
        &config.manifest,
        &config.transient_names(),
        &config.manifest_sections,
    ) {
        Ok(ReconcileResult::Rewritten(removed)) => {
            progress.line(format!(
                "Removed transient dependencies: {}",
                join_names(&removed)
            ));
            progress.line(format!("{} has been rewritten.", config.manifest));
            ManifestStatus::Rewritten { removed }
        }
        Ok(ReconcileResult::NoChange) => {
            progress.line(format!(
                "No transient dependencies found in {}. Nothing to do.",
                config.manifest
            ));
            ManifestStatus::NoChange
        }
        Err(e) => {
            log::warn!("manifest reconciliation failed: {e}");
            progress.alert(format!("[ERROR] Could not update {}: {e}", config.manifest));
            ManifestStatus::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// A direct asset that would be copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCopy {
    /// Installed package providing the asset.
    pub package: PackageName,
    /// Asset file name.
    pub asset: String,
    /// Where the asset is expected.
    pub source: Utf8PathBuf,
}

/// A transient package that would be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFetch {
    /// Package name.
    pub package: PackageName,
    /// Reference handed to the download command.
    pub reference: String,
    /// Assets that would be staged.
    pub assets: Vec<String>,
}

/// What a run would do, computed without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    /// Where assets would be staged.
    pub output_dir: Utf8PathBuf,
    /// Manifest that would be reconciled.
    pub manifest_path: Utf8PathBuf,
    /// Direct copies, in configuration order.
    pub direct: Vec<PlannedCopy>,
    /// Transient fetches, in configuration order.
    pub fetches: Vec<PlannedFetch>,
    /// Transient packages that would be skipped for lack of assets.
    pub skipped: Vec<PackageName>,
    /// Expected manifest outcome; `Rewritten` lists what would be removed.
    pub manifest: ManifestStatus,
}

/// Describe what [`run_pipeline`] would do without touching the filesystem
/// or running any command. The manifest is read but never written.
#[must_use]
pub fn plan(config: &StagerConfig, options: &PipelineOptions) -> RunPlan {
    let assets = config.asset_map();

    let mut direct = Vec::new();
    for spec in config.direct.iter().filter_map(|package| assets.spec_for(package)) {
        let package_dir = config.modules_dir.join(spec.source_package.as_str());
        for asset in spec.asset_names {
            direct.push(PlannedCopy {
                package: spec.source_package.clone(),
                source: package_dir.join(&asset),
                asset,
            });
        }
    }

    let mut fetches = Vec::new();
    let mut skipped = Vec::new();
    for spec in &config.transient {
        match assets.spec_for(&spec.name) {
            Some(asset_spec) => fetches.push(PlannedFetch {
                package: spec.name.clone(),
                reference: spec.reference(),
                assets: asset_spec.asset_names,
            }),
            None => skipped.push(spec.name.clone()),
        }
    }

    let manifest = if options.skip_manifest {
        ManifestStatus::Skipped
    } else {
        match Manifest::load(&config.manifest) {
            Ok(manifest) => {
                let removed =
                    manifest.declared(&config.transient_names(), &config.manifest_sections);
                if removed.is_empty() {
                    ManifestStatus::NoChange
                } else {
                    ManifestStatus::Rewritten { removed }
                }
            }
            Err(e) => ManifestStatus::Failed {
                reason: e.to_string(),
            },
        }
    };

    RunPlan {
        output_dir: config.output_dir.clone(),
        manifest_path: config.manifest.clone(),
        direct,
        fetches,
        skipped,
        manifest,
    }
}

fn join_names(names: &[PackageName]) -> String {
    names
        .iter()
        .map(PackageName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
