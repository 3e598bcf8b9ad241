//! Shared test utilities for the stager crate.
//!
//! [`ScriptedRunner`] records every command invocation and answers it through
//! a caller-supplied closure. [`FakeRegistry`] provides such a closure that
//! behaves like `npm pack` and `tar -xzf`: it writes real gzip tarballs into
//! the requested directory and unpacks them, so the whole pipeline can run
//! without network access.

use crate::command::{
    CommandExecutionError, CommandFailure, CommandOutput, CommandRunner, RunOptions,
    display_command,
};
use crate::extraction::{ArchiveExtractor, TarGzExtractor};
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// One recorded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Program name.
    pub program: String,
    /// Arguments after expansion.
    pub args: Vec<String>,
    /// Working directory, if one was requested.
    pub cwd: Option<Utf8PathBuf>,
}

impl RecordedCall {
    /// The command line as the pipeline would display it.
    #[must_use]
    pub fn command_line(&self) -> String {
        display_command(&self.program, &self.args)
    }

    /// Returns `true` when the program or any argument contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.program.contains(needle) || self.args.iter().any(|arg| arg.contains(needle))
    }
}

/// A [`CommandRunner`] that records invocations and answers them via `script`.
pub struct ScriptedRunner<F> {
    calls: RefCell<Vec<RecordedCall>>,
    script: F,
}

impl<F> ScriptedRunner<F>
where
    F: Fn(&RecordedCall) -> Result<CommandOutput, CommandExecutionError>,
{
    /// Create a runner answering every call with `script`.
    #[must_use]
    pub fn new(script: F) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            script,
        }
    }

    /// All invocations so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    /// Number of invocations whose command line mentions `needle`.
    #[must_use]
    pub fn invocations_mentioning(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.mentions(needle))
            .count()
    }
}

impl<F> CommandRunner for ScriptedRunner<F>
where
    F: Fn(&RecordedCall) -> Result<CommandOutput, CommandExecutionError>,
{
    fn run(
        &self,
        program: &str,
        args: &[String],
        options: &RunOptions,
    ) -> Result<CommandOutput, CommandExecutionError> {
        let call = RecordedCall {
            program: program.to_owned(),
            args: args.to_vec(),
            cwd: options.cwd.clone(),
        };
        self.calls.borrow_mut().push(call.clone());
        (self.script)(&call)
    }
}

/// Write a gzip-compressed tarball containing `entries` to `path`.
///
/// # Errors
///
/// Returns any I/O error raised while writing the archive.
pub fn write_tgz(path: &Utf8Path, entries: &[(&str, &[u8])]) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents)?;
    }
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// The tarball filename `npm pack` would print for a `name@version`
/// reference.
///
/// # Examples
///
/// ```
/// use asset_stager::test_utils::tarball_name;
///
/// assert_eq!(tarball_name("pkgA@1.0.0"), "pkgA-1.0.0.tgz");
/// assert_eq!(tarball_name("tree-sitter-c@^0.24.1"), "tree-sitter-c-0.24.1.tgz");
/// assert_eq!(tarball_name("@scope/pkg@~2.0.0"), "scope-pkg-2.0.0.tgz");
/// ```
#[must_use]
pub fn tarball_name(reference: &str) -> String {
    let (name, version) = reference.rsplit_once('@').unwrap_or((reference, "0.0.0"));
    let name = name.trim_start_matches('@').replace('/', "-");
    let version = version.trim_start_matches(['^', '~', '=']);
    format!("{name}-{version}.tgz")
}

/// An in-memory package registry answering `npm pack` and `tar -xzf`.
#[derive(Debug, Clone, Default)]
pub struct FakeRegistry {
    packages: BTreeMap<String, Vec<(String, Vec<u8>)>>,
    failing_downloads: BTreeSet<String>,
    failing_extractions: BTreeSet<String>,
    subdir: Option<String>,
}

impl FakeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `reference` with the given files under its package directory.
    #[must_use]
    pub fn with_package(mut self, reference: &str, files: &[(&str, &[u8])]) -> Self {
        let files = files
            .iter()
            .map(|(name, contents)| ((*name).to_owned(), contents.to_vec()))
            .collect();
        self.packages.insert(reference.to_owned(), files);
        self
    }

    /// Make downloads of `reference` exit unsuccessfully.
    #[must_use]
    pub fn failing_download(mut self, reference: &str) -> Self {
        self.failing_downloads.insert(reference.to_owned());
        self
    }

    /// Make extraction of the archive for `reference` exit unsuccessfully.
    #[must_use]
    pub fn failing_extraction(mut self, reference: &str) -> Self {
        self.failing_extractions.insert(tarball_name(reference));
        self
    }

    /// Use a top-level archive directory other than `package`.
    #[must_use]
    pub fn with_subdir(mut self, subdir: &str) -> Self {
        self.subdir = Some(subdir.to_owned());
        self
    }

    /// Answer one recorded call the way the real tools would.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandExecutionError`] for unknown packages, configured
    /// failures, and unrecognised commands.
    pub fn respond(&self, call: &RecordedCall) -> Result<CommandOutput, CommandExecutionError> {
        let command = call.command_line();
        match (call.program.as_str(), call.args.as_slice()) {
            ("npm", [sub, reference, ..]) if sub == "pack" => {
                self.pack(&command, reference, call.cwd.as_deref())
            }
            ("tar", [_, archive, _, dest]) => self.unpack(&command, archive, dest),
            _ => Err(CommandExecutionError::without_output(
                command,
                CommandFailure::Spawn("unrecognised command".to_owned()),
            )),
        }
    }

    /// Wrap this registry in a [`ScriptedRunner`].
    #[must_use]
    pub fn into_runner(
        self,
    ) -> ScriptedRunner<impl Fn(&RecordedCall) -> Result<CommandOutput, CommandExecutionError>>
    {
        ScriptedRunner::new(move |call: &RecordedCall| self.respond(call))
    }

    fn pack(
        &self,
        command: &str,
        reference: &str,
        cwd: Option<&Utf8Path>,
    ) -> Result<CommandOutput, CommandExecutionError> {
        let files = self
            .packages
            .get(reference)
            .filter(|_| !self.failing_downloads.contains(reference));
        let (Some(files), Some(cwd)) = (files, cwd) else {
            return Err(failed(command, &format!("npm ERR! 404 Not Found - {reference}")));
        };

        let subdir = self.subdir.as_deref().unwrap_or("package");
        let paths: Vec<(String, &[u8])> = files
            .iter()
            .map(|(name, contents)| (format!("{subdir}/{name}"), contents.as_slice()))
            .collect();
        let entries: Vec<(&str, &[u8])> = paths
            .iter()
            .map(|(path, contents)| (path.as_str(), *contents))
            .collect();

        let filename = tarball_name(reference);
        write_tgz(&cwd.join(&filename), &entries)
            .map_err(|e| failed(command, &e.to_string()))?;
        Ok(CommandOutput::new(
            &format!("{filename}\n"),
            "npm notice package contents",
        ))
    }

    fn unpack(
        &self,
        command: &str,
        archive: &str,
        dest: &str,
    ) -> Result<CommandOutput, CommandExecutionError> {
        let archive = Utf8Path::new(archive);
        let is_failing = archive
            .file_name()
            .is_some_and(|name| self.failing_extractions.contains(name));
        if is_failing {
            return Err(failed(command, "tar: Unexpected EOF in archive"));
        }
        TarGzExtractor
            .extract(archive, Utf8Path::new(dest))
            .map_err(|e| failed(command, &e.to_string()))?;
        Ok(CommandOutput::default())
    }
}

fn failed(command: &str, stderr: &str) -> CommandExecutionError {
    CommandExecutionError {
        command: command.to_owned(),
        failure: CommandFailure::ExitStatus(Some(1)),
        stdout: String::new(),
        stderr: format!("{stderr}\n"),
    }
}
