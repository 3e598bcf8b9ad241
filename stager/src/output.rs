//! Progress narration and run summaries.
//!
//! Progress lines go to an injected writer (stderr in the binary) so tests can
//! capture them. The final summary is rendered either as human-readable text
//! or as JSON for scripting.

use crate::direct::DirectOutcome;
use crate::fetcher::PackageOutcome;
use crate::pipeline::{ManifestStatus, RunPlan, RunSummary};
use std::fmt::Display;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Progress sink that honours `--quiet`.
///
/// [`Progress::line`] is suppressed in quiet mode; [`Progress::alert`] is
/// always written, so warnings and per-package errors stay visible.
pub struct Progress<'a> {
    sink: &'a mut dyn Write,
    quiet: bool,
}

impl<'a> Progress<'a> {
    /// Wrap `sink`, suppressing ordinary lines when `quiet` is set.
    #[must_use]
    pub fn new(sink: &'a mut dyn Write, quiet: bool) -> Self {
        Self { sink, quiet }
    }

    /// Write an ordinary progress line.
    pub fn line(&mut self, message: impl Display) {
        if !self.quiet {
            write_stderr_line(&mut *self.sink, message);
        }
    }

    /// Write a warning or error line, even in quiet mode.
    pub fn alert(&mut self, message: impl Display) {
        write_stderr_line(&mut *self.sink, message);
    }

    /// Write a blank separator line unless quiet.
    pub fn blank(&mut self) {
        self.line("");
    }
}

/// Format the human-readable summary printed at the end of a run.
///
/// # Examples
///
/// ```
/// use asset_stager::output::summary_text;
/// use asset_stager::pipeline::{ManifestStatus, RunSummary};
/// use camino::Utf8PathBuf;
///
/// let summary = RunSummary::new(
///     Utf8PathBuf::from("public/wasm"),
///     Vec::new(),
///     Vec::new(),
///     ManifestStatus::NoChange,
///     None,
/// );
/// let text = summary_text(&summary);
/// assert!(text.contains("0 succeeded, 0 skipped, 0 failed"));
/// assert!(text.contains("Manifest: unchanged"));
/// ```
#[must_use]
pub fn summary_text(summary: &RunSummary) -> String {
    let counts = &summary.counts;
    let mut lines = vec![
        format!("Assets staged in {}", summary.output_dir),
        format!(
            "Transient packages: {} succeeded, {} skipped, {} failed",
            counts.succeeded, counts.skipped, counts.failed
        ),
        format!(
            "Direct assets: {} copied, {} missing",
            counts.direct_copied, counts.direct_missing
        ),
    ];

    for record in &summary.direct {
        let status = match &record.outcome {
            DirectOutcome::Copied { .. } => "copied".to_owned(),
            DirectOutcome::Missing { reason } => format!("missing ({reason})"),
        };
        lines.push(format!("  {}/{}: {status}", record.package, record.asset));
    }

    for record in &summary.packages {
        lines.push(format!(
            "  {}: {}",
            record.reference,
            outcome_text(&record.outcome)
        ));
    }

    lines.push(format!("Manifest: {}", manifest_text(&summary.manifest)));
    if let Some(warning) = &summary.cleanup_warning {
        lines.push(format!("Warning: {warning}"));
    }
    lines.join("\n")
}

/// Serialize a summary as pretty-printed JSON.
///
/// # Errors
///
/// Returns a serialization error, which cannot occur for well-formed
/// summaries.
pub fn summary_json(summary: &RunSummary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summary)
}

/// Format a dry-run plan for display.
#[must_use]
pub fn plan_text(plan: &RunPlan) -> String {
    let mut lines = vec![
        "Dry run - no files will be modified".to_owned(),
        String::new(),
        format!("Output directory: {}", plan.output_dir),
        format!("Manifest: {}", plan.manifest_path),
    ];

    lines.push(String::new());
    lines.push("Direct assets:".to_owned());
    for copy in &plan.direct {
        lines.push(format!("  - {} from {}", copy.asset, copy.source));
    }

    lines.push(String::new());
    lines.push("Transient packages:".to_owned());
    for fetch in &plan.fetches {
        lines.push(format!("  - {} -> {}", fetch.reference, fetch.assets.join(", ")));
    }
    for package in &plan.skipped {
        lines.push(format!("  - {package} (skipped: no assets configured)"));
    }

    lines.push(String::new());
    lines.push(format!("Manifest changes: {}", planned_manifest_text(&plan.manifest)));
    lines.join("\n")
}

/// Serialize a dry-run plan as pretty-printed JSON.
///
/// # Errors
///
/// Returns a serialization error, which cannot occur for well-formed plans.
pub fn plan_json(plan: &RunPlan) -> serde_json::Result<String> {
    serde_json::to_string_pretty(plan)
}

fn outcome_text(outcome: &PackageOutcome) -> String {
    match outcome {
        PackageOutcome::Success => "success".to_owned(),
        PackageOutcome::Skipped { reason } => format!("skipped ({reason})"),
        PackageOutcome::DownloadFailed { reason } => format!("download failed ({reason})"),
        PackageOutcome::ExtractFailed { reason } => format!("extraction failed ({reason})"),
        PackageOutcome::CopyFailed { reason } => format!("copy failed ({reason})"),
    }
}

fn manifest_text(status: &ManifestStatus) -> String {
    match status {
        ManifestStatus::Rewritten { removed } => format!("removed {}", join_names(removed)),
        ManifestStatus::NoChange => "unchanged".to_owned(),
        ManifestStatus::Failed { reason } => format!("not updated ({reason})"),
        ManifestStatus::Skipped => "skipped".to_owned(),
    }
}

fn planned_manifest_text(status: &ManifestStatus) -> String {
    match status {
        ManifestStatus::Rewritten { removed } => format!("would remove {}", join_names(removed)),
        ManifestStatus::NoChange => "none".to_owned(),
        ManifestStatus::Failed { reason } => format!("unknown ({reason})"),
        ManifestStatus::Skipped => "skipped".to_owned(),
    }
}

fn join_names(names: &[impl Display]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PackageName;
    use crate::direct::DirectCopyRecord;
    use crate::fetcher::OutcomeRecord;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};

    #[fixture]
    fn mixed_summary() -> RunSummary {
        RunSummary::new(
            Utf8PathBuf::from("public/wasm"),
            vec![DirectCopyRecord {
                package: PackageName::from("core"),
                asset: "core.bin".to_owned(),
                outcome: DirectOutcome::Copied {
                    path: Utf8PathBuf::from("public/wasm/core.bin"),
                },
            }],
            vec![
                OutcomeRecord {
                    package: PackageName::from("pkgA"),
                    reference: "pkgA@1.0.0".to_owned(),
                    outcome: PackageOutcome::Success,
                    staged: vec![Utf8PathBuf::from("public/wasm/pkgA.bin")],
                },
                OutcomeRecord {
                    package: PackageName::from("pkgB"),
                    reference: "pkgB@2.0.0".to_owned(),
                    outcome: PackageOutcome::DownloadFailed {
                        reason: "404".to_owned(),
                    },
                    staged: Vec::new(),
                },
            ],
            ManifestStatus::Rewritten {
                removed: vec![PackageName::from("pkgA"), PackageName::from("pkgB")],
            },
            Some("failed to remove /tmp/x".to_owned()),
        )
    }

    #[rstest]
    fn summary_text_lists_every_record(mixed_summary: RunSummary) {
        let text = summary_text(&mixed_summary);
        assert!(text.contains("1 succeeded, 0 skipped, 1 failed"));
        assert!(text.contains("core/core.bin: copied"));
        assert!(text.contains("pkgB@2.0.0: download failed (404)"));
        assert!(text.contains("Manifest: removed pkgA, pkgB"));
        assert!(text.contains("Warning: failed to remove /tmp/x"));
    }

    #[rstest]
    fn summary_json_is_tagged(mixed_summary: RunSummary) {
        let json = summary_json(&mixed_summary).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");

        assert_eq!(value["packages"][0]["outcome"]["status"], "success");
        assert_eq!(value["packages"][1]["outcome"]["status"], "download_failed");
        assert_eq!(value["packages"][1]["outcome"]["reason"], "404");
        assert_eq!(value["manifest"]["status"], "rewritten");
        assert_eq!(value["counts"]["failed"], 1);
        assert_eq!(value["direct"][0]["outcome"]["status"], "copied");
    }

    #[test]
    fn quiet_progress_still_writes_alerts() {
        let mut sink = Vec::new();
        {
            let mut progress = Progress::new(&mut sink, true);
            progress.line("Copied a.bin");
            progress.alert("[ERROR] Failed to process pkg@1");
        }
        let text = String::from_utf8(sink).expect("UTF-8");
        assert_eq!(text, "[ERROR] Failed to process pkg@1\n");
    }

    #[test]
    fn progress_writes_lines_when_not_quiet() {
        let mut sink = Vec::new();
        {
            let mut progress = Progress::new(&mut sink, false);
            progress.line("one");
            progress.blank();
            progress.line("two");
        }
        assert_eq!(String::from_utf8(sink).expect("UTF-8"), "one\n\ntwo\n");
    }
}
