//! Unit tests for configuration loading and validation.

use super::*;
use rstest::rstest;

fn origin() -> &'static Utf8Path {
    Utf8Path::new("asset-stager.toml")
}

#[test]
fn defaults_validate() {
    StagerConfig::default()
        .validate()
        .expect("built-in defaults should be valid");
}

#[test]
fn every_default_transient_package_has_assets() {
    let config = StagerConfig::default();
    let map = config.asset_map();
    for spec in &config.transient {
        assert!(
            map.spec_for(&spec.name).is_some(),
            "{} should be mapped",
            spec.name
        );
    }
}

#[test]
fn direct_package_is_not_transient() {
    let config = StagerConfig::default();
    let transient = config.transient_names();
    for direct in &config.direct {
        assert!(!transient.contains(direct));
    }
}

#[test]
fn full_file_round_trips_through_toml() {
    let text = r#"
output_dir = "out"
manifest = "manifest.json"
modules_dir = "deps"
extracted_subdir = "pkg"
command_timeout_secs = 0
extractor = "builtin"
manifest_sections = ["dependencies", "devDependencies"]
direct = ["core"]

[[transient]]
name = "pkgA"
version = "1.0.0"

[[transient]]
name = "pkgB"
version = "^2"

[assets]
core = ["core.bin"]
pkgA = ["pkgA.bin"]
"#;
    let config = StagerConfig::from_toml_str(text, origin()).expect("valid config");

    assert_eq!(config.output_dir.as_str(), "out");
    assert_eq!(config.extractor, ExtractorKind::Builtin);
    assert_eq!(config.command_timeout(), None);
    assert_eq!(
        config.transient_names(),
        vec![PackageName::from("pkgA"), PackageName::from("pkgB")]
    );
    assert_eq!(config.transient[1].version_constraint, "^2");
    assert_eq!(config.manifest_sections.len(), 2);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = StagerConfig::from_toml_str("outptu_dir = \"x\"", origin())
        .expect_err("typo should be rejected");
    assert!(matches!(err, ConfigError::Invalid { .. }));
}

#[rstest]
#[case::empty_assets("[assets]\npkg = []", "lists no assets")]
#[case::nested_asset("[assets]\npkg = [\"dist/pkg.wasm\"]", "bare file name")]
#[case::parent_asset("[assets]\npkg = [\"..\"]", "bare file name")]
#[case::no_spec("download_command = [\"npm\", \"pack\"]", "{spec}")]
#[case::empty_download("download_command = []", "{spec}")]
#[case::no_archive("extract_command = [\"tar\", \"-xzf\"]", "{archive}")]
#[case::shared_asset("[assets]\na = [\"x.bin\"]\nb = [\"x.bin\"]", "listed by both")]
#[case::nested_subdir("extracted_subdir = \"a/b\"", "bare directory name")]
fn validation_failures(#[case] text: &str, #[case] expected: &str) {
    let err = StagerConfig::from_toml_str(text, origin()).expect_err("should fail validation");
    assert!(err.to_string().contains(expected), "{err}");
}

#[test]
fn builtin_extractor_ignores_extract_template() {
    let text = "extractor = \"builtin\"\nextract_command = []";
    StagerConfig::from_toml_str(text, origin()).expect("builtin needs no extract command");
}

#[test]
fn resolve_prefers_file_in_working_directory() {
    let temp = tempfile::tempdir().expect("temp dir");
    let cwd = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
    std::fs::write(cwd.join(DEFAULT_CONFIG_FILE), "output_dir = \"elsewhere\"")
        .expect("write config");

    let config = StagerConfig::resolve(None, &cwd).expect("resolve");
    assert_eq!(config.output_dir.as_str(), "elsewhere");
}

#[test]
fn resolve_falls_back_to_defaults() {
    let temp = tempfile::tempdir().expect("temp dir");
    let cwd = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");

    let config = StagerConfig::resolve(None, &cwd).expect("resolve");
    assert_eq!(config, StagerConfig::default());
}

#[test]
fn resolve_requires_explicit_file_to_exist() {
    let temp = tempfile::tempdir().expect("temp dir");
    let cwd = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");

    let err = StagerConfig::resolve(Some(&cwd.join("missing.toml")), &cwd)
        .expect_err("missing explicit config");
    assert!(matches!(err, ConfigError::Unreadable { .. }));
}

#[test]
fn anchored_at_joins_relative_paths_only() {
    let config = StagerConfig {
        output_dir: Utf8PathBuf::from("/abs/out"),
        ..StagerConfig::default()
    }
    .anchored_at(Utf8Path::new("/project"));

    assert_eq!(config.output_dir.as_str(), "/abs/out");
    assert_eq!(config.manifest.as_str(), "/project/package.json");
    assert_eq!(config.modules_dir.as_str(), "/project/node_modules");
}

#[test]
fn expand_template_replaces_every_placeholder() {
    let template = strings(&["tar", "-xzf", "{archive}", "-C", "{dest}"]);
    let expanded = expand_template(
        &template,
        &[("{archive}", "/tmp/w/a.tgz"), ("{dest}", "/tmp/w")],
    );
    assert_eq!(expanded, strings(&["tar", "-xzf", "/tmp/w/a.tgz", "-C", "/tmp/w"]));
}
