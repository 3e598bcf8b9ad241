//! Asset stager CLI entrypoint.
//!
//! This binary copies assets from installed packages, fetches and stages the
//! assets of transient packages, and prunes those packages from the
//! dependency manifest. Progress goes to stderr; the summary goes to stdout.

use asset_stager::cli::Cli;
use asset_stager::command::SystemCommandRunner;
use asset_stager::config::StagerConfig;
use asset_stager::error::{Result, StagerError};
use asset_stager::output::{plan_json, plan_text, summary_json, summary_text, write_stderr_line};
use asset_stager::pipeline::{RunSummary, plan, run_pipeline};
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::Write;

/// Exit status when `--strict` is set and something failed.
const STRICT_FAILURE_EXIT: i32 = 2;

fn main() {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, cli.strict, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Whether the run left failures behind. `None` for dry runs.
type RunOutcome = Option<bool>;

fn run(cli: &Cli, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<RunOutcome> {
    let cwd = current_dir()?;
    let config = load_config(cli, &cwd)?;
    let options = cli.pipeline_options();

    if cli.dry_run {
        let plan = plan(&config, &options);
        let rendered = if cli.json {
            plan_json(&plan).map_err(|e| StagerError::WriteFailed { source: e.into() })?
        } else {
            plan_text(&plan)
        };
        write_stdout(stdout, &rendered)?;
        return Ok(None);
    }

    let summary = run_pipeline(&config, &options, &SystemCommandRunner, stderr)?;
    report_summary(cli, &summary, stdout)?;
    Ok(Some(summary.has_failures()))
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|e| StagerError::WorkingDirectory {
        reason: e.to_string(),
    })?;
    Utf8PathBuf::try_from(cwd).map_err(|e| StagerError::WorkingDirectory {
        reason: format!("current directory is not valid UTF-8: {e}"),
    })
}

/// Resolves configuration, applies flag overrides, and anchors relative
/// paths at the working directory.
fn load_config(cli: &Cli, cwd: &camino::Utf8Path) -> Result<StagerConfig> {
    let explicit = cli.config.as_ref().map(|path| cwd.join(path));
    let config = StagerConfig::resolve(explicit.as_deref(), cwd)?;
    let config = cli.apply_overrides(config);
    config.validate()?;
    Ok(config.anchored_at(cwd))
}

fn report_summary(cli: &Cli, summary: &RunSummary, stdout: &mut dyn Write) -> Result<()> {
    let rendered = if cli.json {
        summary_json(summary).map_err(|e| StagerError::WriteFailed { source: e.into() })?
    } else {
        summary_text(summary)
    };
    write_stdout(stdout, &rendered)
}

fn write_stdout(stdout: &mut dyn Write, text: &str) -> Result<()> {
    writeln!(stdout, "{text}").map_err(|source| StagerError::WriteFailed { source })
}

fn exit_code_for_run_result(
    result: Result<RunOutcome>,
    strict: bool,
    stderr: &mut dyn Write,
) -> i32 {
    match result {
        Ok(Some(true)) if strict => STRICT_FAILURE_EXIT,
        Ok(_) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("[FATAL] {err}"));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_stager::config::ConfigError;
    use rstest::rstest;

    #[rstest]
    #[case::clean_run(Some(false), false, 0)]
    #[case::clean_strict_run(Some(false), true, 0)]
    #[case::failures_tolerated(Some(true), false, 0)]
    #[case::failures_strict(Some(true), true, 2)]
    #[case::dry_run_strict(None, true, 0)]
    fn exit_code_for_successful_runs(
        #[case] outcome: RunOutcome,
        #[case] strict: bool,
        #[case] expected: i32,
    ) {
        let mut stderr = Vec::new();
        assert_eq!(
            exit_code_for_run_result(Ok(outcome), strict, &mut stderr),
            expected
        );
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_fatal_error_prints_and_returns_one() {
        let err = StagerError::OutputDirCreation {
            path: Utf8PathBuf::from("public/wasm"),
            reason: "read-only file system".to_owned(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), false, &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("[FATAL] could not create output directory public/wasm"));
    }

    #[test]
    fn load_config_anchors_paths_and_applies_overrides() {
        let temp = tempfile::tempdir().expect("temp dir");
        let cwd = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        std::fs::write(cwd.join("asset-stager.toml"), "output_dir = \"from-file\"")
            .expect("write config");
        let cli = Cli {
            manifest: Some(Utf8PathBuf::from("web/package.json")),
            ..Cli::default()
        };

        let config = load_config(&cli, &cwd).expect("load config");

        assert_eq!(config.output_dir, cwd.join("from-file"));
        assert_eq!(config.manifest, cwd.join("web/package.json"));
    }

    #[test]
    fn load_config_resolves_explicit_path_against_cwd() {
        let temp = tempfile::tempdir().expect("temp dir");
        let cwd = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        std::fs::write(cwd.join("custom.toml"), "modules_dir = \"deps\"").expect("write config");
        let cli = Cli {
            config: Some(Utf8PathBuf::from("custom.toml")),
            ..Cli::default()
        };

        let config = load_config(&cli, &cwd).expect("load config");
        assert_eq!(config.modules_dir, cwd.join("deps"));
    }

    #[test]
    fn load_config_rejects_invalid_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let cwd = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        std::fs::write(cwd.join("asset-stager.toml"), "[assets]\npkg = []").expect("write config");

        let err = load_config(&Cli::default(), &cwd).expect_err("invalid config");
        assert!(matches!(
            err,
            StagerError::Config(ConfigError::EmptyAssetList { .. })
        ));
    }
}
