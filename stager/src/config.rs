//! Static configuration loaded once per run.
//!
//! Configuration comes from an `asset-stager.toml` file when one is present
//! and falls back to the built-in tree-sitter grammar tables otherwise. Every
//! field is optional in the file; omitted fields keep their defaults, so a
//! project that only wants a different output directory can say just that:
//!
//! ```toml
//! output_dir = "static/wasm"
//! ```
//!
//! The loaded value is immutable for the rest of the run.

use crate::assets::{PackageName, SourceAssetMap, TransientPackageSpec, is_bare_file_name};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "asset-stager.toml";

/// Placeholder for the `name@version` reference in the download template.
pub const SPEC_PLACEHOLDER: &str = "{spec}";
/// Placeholder for the archive path in the extract template.
pub const ARCHIVE_PLACEHOLDER: &str = "{archive}";
/// Placeholder for the extraction directory in the extract template.
pub const DEST_PLACEHOLDER: &str = "{dest}";

/// Errors arising from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read configuration {path}: {source}")]
    Unreadable {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("invalid configuration {path}: {reason}")]
    Invalid {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A package maps to no assets.
    #[error("package {package} lists no assets")]
    EmptyAssetList {
        /// The offending package.
        package: PackageName,
    },

    /// An asset name would escape the output directory.
    #[error("asset name {asset:?} for package {package} must be a bare file name")]
    InvalidAssetName {
        /// The package listing the asset.
        package: PackageName,
        /// The offending asset name.
        asset: String,
    },

    /// A command template is empty or lacks a required placeholder.
    #[error("{which} command must be non-empty and contain {placeholder}")]
    InvalidCommandTemplate {
        /// Which template is wrong.
        which: &'static str,
        /// The missing placeholder.
        placeholder: &'static str,
    },

    /// Two packages claim the same asset name.
    #[error("asset {asset} is listed by both {first} and {second}")]
    DuplicateAsset {
        /// The shared asset name.
        asset: String,
        /// The package that listed it first.
        first: PackageName,
        /// The package that listed it again.
        second: PackageName,
    },

    /// The extracted subdirectory name is not a bare directory name.
    #[error("extracted_subdir {0:?} must be a bare directory name")]
    InvalidExtractedSubdir(String),
}

/// How downloaded archives are unpacked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Run the configured extract command.
    #[default]
    Command,
    /// Unpack gzip-compressed tarballs in process.
    Builtin,
}

/// Complete stager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagerConfig {
    /// Directory staged assets are written to.
    pub output_dir: Utf8PathBuf,
    /// Dependency manifest to prune.
    pub manifest: Utf8PathBuf,
    /// Directory holding installed packages for direct copies.
    pub modules_dir: Utf8PathBuf,
    /// Subdirectory an unpacked archive places its contents under.
    pub extracted_subdir: String,
    /// Prefix for the temporary workspace directory name.
    pub workspace_prefix: String,
    /// Per-command timeout in seconds; zero disables the timeout.
    pub command_timeout_secs: u64,
    /// Archive extraction strategy.
    pub extractor: ExtractorKind,
    /// Top-level manifest objects that declare dependencies.
    pub manifest_sections: Vec<String>,
    /// Download command template; must contain `{spec}`.
    pub download_command: Vec<String>,
    /// Extract command template; must contain `{archive}`.
    pub extract_command: Vec<String>,
    /// Installed packages whose assets are copied without fetching.
    pub direct: Vec<PackageName>,
    /// Transient packages, fetched in this order.
    pub transient: Vec<TransientPackageSpec>,
    /// Assets required from each source package.
    pub assets: BTreeMap<PackageName, Vec<String>>,
}

impl Default for StagerConfig {
    fn default() -> Self {
        Self {
            output_dir: Utf8PathBuf::from("public/wasm"),
            manifest: Utf8PathBuf::from("package.json"),
            modules_dir: Utf8PathBuf::from("node_modules"),
            extracted_subdir: "package".to_owned(),
            workspace_prefix: "asset-stager-".to_owned(),
            command_timeout_secs: 300,
            extractor: ExtractorKind::Command,
            manifest_sections: vec!["dependencies".to_owned()],
            download_command: strings(&["npm", "pack", SPEC_PLACEHOLDER, "--silent"]),
            extract_command: strings(&[
                "tar",
                "-xzf",
                ARCHIVE_PLACEHOLDER,
                "-C",
                DEST_PLACEHOLDER,
            ]),
            direct: vec![PackageName::from("web-tree-sitter")],
            transient: default_transient_packages(),
            assets: default_asset_table(),
        }
    }
}

impl StagerConfig {
    /// Parse configuration from TOML text.
    ///
    /// `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on parse failure, or a validation
    /// error from [`Self::validate`].
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_stager::config::StagerConfig;
    /// use camino::Utf8Path;
    ///
    /// let config = StagerConfig::from_toml_str(
    ///     "output_dir = \"static/wasm\"",
    ///     Utf8Path::new("asset-stager.toml"),
    /// )?;
    /// assert_eq!(config.output_dir.as_str(), "static/wasm");
    /// assert_eq!(config.manifest.as_str(), "package.json");
    /// # Ok::<(), asset_stager::config::ConfigError>(())
    /// ```
    pub fn from_toml_str(text: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Invalid {
            path: origin.to_owned(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] if the file cannot be read, or any
    /// error from [`Self::from_toml_str`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Resolve configuration for a run.
    ///
    /// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] in
    /// `cwd` is used when present; otherwise the built-in defaults apply.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::load`].
    pub fn resolve(explicit: Option<&Utf8Path>, cwd: &Utf8Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = cwd.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            log::debug!("loading configuration from {candidate}");
            Self::load(&candidate)
        } else {
            log::debug!("no {DEFAULT_CONFIG_FILE} found; using built-in defaults");
            Ok(Self::default())
        }
    }

    /// Check the invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut owners: BTreeMap<&str, &PackageName> = BTreeMap::new();
        for (package, assets) in &self.assets {
            if assets.is_empty() {
                return Err(ConfigError::EmptyAssetList {
                    package: package.clone(),
                });
            }
            if let Some(asset) = assets.iter().find(|a| !is_bare_file_name(a)) {
                return Err(ConfigError::InvalidAssetName {
                    package: package.clone(),
                    asset: asset.clone(),
                });
            }
            for asset in assets {
                if let Some(first) = owners.insert(asset, package) {
                    return Err(ConfigError::DuplicateAsset {
                        asset: asset.clone(),
                        first: first.clone(),
                        second: package.clone(),
                    });
                }
            }
        }
        check_template(&self.download_command, "download", SPEC_PLACEHOLDER)?;
        if self.extractor == ExtractorKind::Command {
            check_template(&self.extract_command, "extract", ARCHIVE_PLACEHOLDER)?;
        }
        if !is_bare_file_name(&self.extracted_subdir) {
            return Err(ConfigError::InvalidExtractedSubdir(
                self.extracted_subdir.clone(),
            ));
        }
        Ok(())
    }

    /// The source-to-asset table.
    #[must_use]
    pub fn asset_map(&self) -> SourceAssetMap {
        SourceAssetMap::from_entries(
            self.assets
                .iter()
                .map(|(package, assets)| (package.clone(), assets.clone())),
        )
    }

    /// Names of all configured transient packages, in configuration order.
    #[must_use]
    pub fn transient_names(&self) -> Vec<PackageName> {
        self.transient.iter().map(|spec| spec.name.clone()).collect()
    }

    /// The per-command timeout, if enabled.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    /// Resolve every relative path against `base`.
    #[must_use]
    pub fn anchored_at(mut self, base: &Utf8Path) -> Self {
        self.output_dir = base.join(&self.output_dir);
        self.manifest = base.join(&self.manifest);
        self.modules_dir = base.join(&self.modules_dir);
        self
    }
}

/// Substitute `(placeholder, value)` pairs into every template argument.
///
/// # Examples
///
/// ```
/// use asset_stager::config::expand_template;
///
/// let template = vec!["npm".to_owned(), "pack".to_owned(), "{spec}".to_owned()];
/// let expanded = expand_template(&template, &[("{spec}", "pkg@1.0.0")]);
/// assert_eq!(expanded, vec!["npm", "pack", "pkg@1.0.0"]);
/// ```
#[must_use]
pub fn expand_template(template: &[String], substitutions: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            substitutions
                .iter()
                .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
        })
        .collect()
}

fn check_template(
    template: &[String],
    which: &'static str,
    placeholder: &'static str,
) -> Result<(), ConfigError> {
    let has_program = template.first().is_some_and(|program| !program.is_empty());
    let has_placeholder = template.iter().any(|arg| arg.contains(placeholder));
    if has_program && has_placeholder {
        Ok(())
    } else {
        Err(ConfigError::InvalidCommandTemplate { which, placeholder })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn default_transient_packages() -> Vec<TransientPackageSpec> {
    [
        ("tree-sitter-c", "^0.24.1"),
        ("tree-sitter-c-sharp", "^0.23.1"),
        ("tree-sitter-cpp", "^0.23.4"),
        ("tree-sitter-css", "^0.23.2"),
        ("tree-sitter-go", "^0.23.4"),
        ("tree-sitter-java", "^0.23.5"),
        ("tree-sitter-php", "^0.23.12"),
        ("tree-sitter-python", "^0.23.6"),
        ("tree-sitter-ruby", "^0.23.1"),
        ("tree-sitter-rust", "^0.24.0"),
        ("tree-sitter-solidity", "^1.2.11"),
        ("tree-sitter-typescript", "^0.23.2"),
    ]
    .into_iter()
    .map(|(name, version)| TransientPackageSpec::new(name, version))
    .collect()
}

// tree-sitter-swift and tree-sitter-vue publish no wasm build.
const DEFAULT_ASSETS: &[(&str, &[&str])] = &[
    ("web-tree-sitter", &["tree-sitter.wasm"]),
    ("tree-sitter-c", &["tree-sitter-c.wasm"]),
    ("tree-sitter-c-sharp", &["tree-sitter-c_sharp.wasm"]),
    ("tree-sitter-cpp", &["tree-sitter-cpp.wasm"]),
    ("tree-sitter-css", &["tree-sitter-css.wasm"]),
    ("tree-sitter-go", &["tree-sitter-go.wasm"]),
    ("tree-sitter-java", &["tree-sitter-java.wasm"]),
    ("tree-sitter-php", &["tree-sitter-php.wasm"]),
    ("tree-sitter-python", &["tree-sitter-python.wasm"]),
    ("tree-sitter-ruby", &["tree-sitter-ruby.wasm"]),
    ("tree-sitter-rust", &["tree-sitter-rust.wasm"]),
    ("tree-sitter-solidity", &["tree-sitter-solidity.wasm"]),
    (
        "tree-sitter-typescript",
        &["tree-sitter-typescript.wasm", "tree-sitter-tsx.wasm"],
    ),
];

fn default_asset_table() -> BTreeMap<PackageName, Vec<String>> {
    DEFAULT_ASSETS
        .iter()
        .map(|(package, assets)| (PackageName::from(*package), strings(assets)))
        .collect()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
