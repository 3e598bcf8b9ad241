//! Package names, asset specs, and the source-to-asset table.
//!
//! The [`SourceAssetMap`] answers one question for the rest of the pipeline:
//! which asset files does a given package provide? A package that is absent
//! from the map is never fetched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A semantic package name.
///
/// Names are compared exactly; no normalisation is applied.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the package name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The assets required from one source package, in copy order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSpec {
    /// Package the assets ship in.
    pub source_package: PackageName,
    /// Asset filenames. Never empty once the owning config is validated.
    pub asset_names: Vec<String>,
}

/// A transient package pinned to a single version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransientPackageSpec {
    /// Package name as understood by the download tool.
    pub name: PackageName,
    /// Version constraint passed through verbatim.
    #[serde(rename = "version")]
    pub version_constraint: String,
}

impl TransientPackageSpec {
    /// Create a transient package spec.
    #[must_use]
    pub fn new(name: impl Into<PackageName>, version_constraint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_constraint: version_constraint.into(),
        }
    }

    /// The `name@version` reference handed to the download tool.
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_stager::assets::TransientPackageSpec;
    ///
    /// let spec = TransientPackageSpec::new("tree-sitter-go", "^0.23.4");
    /// assert_eq!(spec.reference(), "tree-sitter-go@^0.23.4");
    /// ```
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}@{}", self.name, self.version_constraint)
    }
}

/// Static table from source package to the assets required from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceAssetMap {
    entries: BTreeMap<PackageName, Vec<String>>,
}

impl SourceAssetMap {
    /// Build a map from `(package, assets)` pairs.
    ///
    /// Later pairs for the same package replace earlier ones.
    #[must_use]
    pub fn from_entries<I, P, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, Vec<A>)>,
        P: Into<PackageName>,
        A: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(package, assets)| {
                (
                    package.into(),
                    assets.into_iter().map(Into::into).collect(),
                )
            })
            .collect();
        Self { entries }
    }

    /// Look up the asset spec for a package.
    ///
    /// # Examples
    ///
    /// ```
    /// use asset_stager::assets::{PackageName, SourceAssetMap};
    ///
    /// let map = SourceAssetMap::from_entries([("pkg", vec!["pkg.wasm"])]);
    /// let spec = map.spec_for(&PackageName::from("pkg")).expect("mapped");
    /// assert_eq!(spec.asset_names, vec!["pkg.wasm".to_owned()]);
    /// assert!(map.spec_for(&PackageName::from("other")).is_none());
    /// ```
    #[must_use]
    pub fn spec_for(&self, package: &PackageName) -> Option<AssetSpec> {
        self.entries.get(package).map(|assets| AssetSpec {
            source_package: package.clone(),
            asset_names: assets.clone(),
        })
    }

    /// Iterate over all `(package, assets)` entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageName, &[String])> {
        self.entries
            .iter()
            .map(|(package, assets)| (package, assets.as_slice()))
    }

    /// Number of mapped packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no package is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Returns `true` when `name` is a bare filename that stays inside the
/// directory it is joined to.
#[must_use]
pub fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
