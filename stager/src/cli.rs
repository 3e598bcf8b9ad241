//! CLI argument definitions for the asset stager.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::config::{ExtractorKind, StagerConfig};
use crate::pipeline::PipelineOptions;
use camino::Utf8PathBuf;
use clap::Parser;

/// Stage binary assets from installed and transient packages.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "asset-stager")]
#[command(version, about)]
#[command(long_about = concat!(
    "Stage binary assets from installed and transient packages.\n\n",
    "Assets shipped by direct dependencies are copied from the installed ",
    "modules directory. Transient packages are downloaded into a temporary ",
    "workspace, unpacked, and their assets copied out. Finally the transient ",
    "packages are removed from the dependency manifest so they are never ",
    "installed again.\n\n",
    "A failure in one package never stops the others; the summary lists every ",
    "outcome.",
))]
#[command(after_help = concat!(
    "CONFIGURATION:\n",
    "  Settings are read from --config FILE, else asset-stager.toml in the\n",
    "  working directory, else the built-in tree-sitter grammar tables.\n\n",
    "EXAMPLES:\n",
    "  Stage the default grammars into public/wasm:\n",
    "    $ asset-stager\n\n",
    "  Preview without touching anything:\n",
    "    $ asset-stager --dry-run\n\n",
    "  Fail the build if any grammar could not be staged:\n",
    "    $ asset-stager --strict --json",
))]
pub struct Cli {
    /// Configuration file [default: asset-stager.toml if present].
    #[arg(long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Directory staged assets are written to.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<Utf8PathBuf>,

    /// Dependency manifest to prune.
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<Utf8PathBuf>,

    /// Directory holding installed packages.
    #[arg(long, value_name = "DIR")]
    pub modules_dir: Option<Utf8PathBuf>,

    /// Per-command timeout in seconds (0 disables).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// How downloaded archives are unpacked.
    #[arg(long, value_enum, value_name = "KIND")]
    pub extractor: Option<ExtractorKind>,

    /// Leave the dependency manifest untouched.
    #[arg(long)]
    pub skip_manifest: bool,

    /// Show what would be done and exit without side effects.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// Exit with status 2 when any package or direct asset failed.
    #[arg(long)]
    pub strict: bool,

    /// Suppress progress output (errors still shown).
    #[arg(short, long)]
    pub quiet: bool,
}

impl Default for Cli {
    /// Creates a `Cli` with no overrides and every flag disabled.
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_stager::cli::Cli;
    ///
    /// let cli = Cli::default();
    /// assert!(cli.config.is_none());
    /// assert!(!cli.dry_run);
    /// ```
    fn default() -> Self {
        Self {
            config: None,
            output_dir: None,
            manifest: None,
            modules_dir: None,
            timeout: None,
            extractor: None,
            skip_manifest: false,
            dry_run: false,
            json: false,
            strict: false,
            quiet: false,
        }
    }
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_stager::cli::Cli;
    /// use asset_stager::config::StagerConfig;
    /// use camino::Utf8PathBuf;
    ///
    /// let cli = Cli {
    ///     output_dir: Some(Utf8PathBuf::from("static/wasm")),
    ///     timeout: Some(0),
    ///     ..Cli::default()
    /// };
    /// let config = cli.apply_overrides(StagerConfig::default());
    /// assert_eq!(config.output_dir.as_str(), "static/wasm");
    /// assert_eq!(config.command_timeout(), None);
    /// ```
    #[must_use]
    pub fn apply_overrides(&self, mut config: StagerConfig) -> StagerConfig {
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(manifest) = &self.manifest {
            config.manifest.clone_from(manifest);
        }
        if let Some(dir) = &self.modules_dir {
            config.modules_dir.clone_from(dir);
        }
        if let Some(secs) = self.timeout {
            config.command_timeout_secs = secs;
        }
        if let Some(kind) = self.extractor {
            config.extractor = kind;
        }
        config
    }

    /// Per-run pipeline switches derived from the flags.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            skip_manifest: self.skip_manifest,
            quiet: self.quiet,
            workspace_parent: None,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
