//! Tests for CLI parsing and override behaviour.

use super::*;
use rstest::rstest;

#[test]
fn cli_parses_defaults() {
    let cli = Cli::parse_from(["asset-stager"]);
    assert_eq!(cli, Cli::default());
}

#[test]
fn cli_parses_paths() {
    let cli = Cli::parse_from([
        "asset-stager",
        "-o",
        "static/wasm",
        "-m",
        "web/package.json",
        "--modules-dir",
        "web/node_modules",
        "--config",
        "stager.toml",
    ]);
    assert_eq!(cli.output_dir, Some(Utf8PathBuf::from("static/wasm")));
    assert_eq!(cli.manifest, Some(Utf8PathBuf::from("web/package.json")));
    assert_eq!(cli.modules_dir, Some(Utf8PathBuf::from("web/node_modules")));
    assert_eq!(cli.config, Some(Utf8PathBuf::from("stager.toml")));
}

#[rstest]
#[case::skip_manifest(&["asset-stager", "--skip-manifest"], |cli: &Cli| cli.skip_manifest)]
#[case::dry_run(&["asset-stager", "--dry-run"], |cli: &Cli| cli.dry_run)]
#[case::json(&["asset-stager", "--json"], |cli: &Cli| cli.json)]
#[case::strict(&["asset-stager", "--strict"], |cli: &Cli| cli.strict)]
#[case::quiet_short(&["asset-stager", "-q"], |cli: &Cli| cli.quiet)]
#[case::quiet_long(&["asset-stager", "--quiet"], |cli: &Cli| cli.quiet)]
fn cli_parses_boolean_flags(#[case] args: &[&str], #[case] check: fn(&Cli) -> bool) {
    let cli = Cli::parse_from(args);
    assert!(check(&cli));
}

#[rstest]
#[case::command("command", ExtractorKind::Command)]
#[case::builtin("builtin", ExtractorKind::Builtin)]
fn cli_parses_extractor(#[case] value: &str, #[case] expected: ExtractorKind) {
    let cli = Cli::parse_from(["asset-stager", "--extractor", value]);
    assert_eq!(cli.extractor, Some(expected));
}

#[test]
fn cli_rejects_unknown_extractor() {
    let result = Cli::try_parse_from(["asset-stager", "--extractor", "zip"]);
    assert!(result.is_err());
}

#[test]
fn cli_rejects_non_numeric_timeout() {
    let result = Cli::try_parse_from(["asset-stager", "--timeout", "soon"]);
    assert!(result.is_err());
}

#[test]
fn overrides_replace_only_given_values() {
    let cli = Cli::parse_from(["asset-stager", "--timeout", "15", "--extractor", "builtin"]);
    let base = StagerConfig::default();

    let config = cli.apply_overrides(base.clone());

    assert_eq!(config.command_timeout_secs, 15);
    assert_eq!(config.extractor, ExtractorKind::Builtin);
    assert_eq!(config.output_dir, base.output_dir);
    assert_eq!(config.manifest, base.manifest);
    assert_eq!(config.transient, base.transient);
}

#[test]
fn pipeline_options_follow_flags() {
    let cli = Cli::parse_from(["asset-stager", "--skip-manifest", "-q"]);
    let options = cli.pipeline_options();
    assert!(options.skip_manifest);
    assert!(options.quiet);
    assert!(options.workspace_parent.is_none());
}
