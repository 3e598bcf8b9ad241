//! Error types for the asset stager.
//!
//! Only the failures that abort a run live here. Per-package, per-asset, and
//! manifest failures are recorded as outcomes by their own modules and never
//! become a [`StagerError`].

use crate::config::ConfigError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that abort a staging run.
#[derive(Debug, Error)]
pub enum StagerError {
    /// The configuration file could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The output directory could not be created.
    #[error("could not create output directory {path}: {reason}")]
    OutputDirCreation {
        /// Path of the output directory.
        path: Utf8PathBuf,
        /// Description of the underlying I/O error.
        reason: String,
    },

    /// The output directory exists but is not writable.
    #[error("output directory {path} is not writable: {reason}")]
    OutputDirNotWritable {
        /// Path to the non-writable directory.
        path: Utf8PathBuf,
        /// Description of the underlying I/O error.
        reason: String,
    },

    /// The temporary workspace could not be created.
    #[error("could not create temporary workspace: {source}")]
    WorkspaceCreation {
        /// The underlying error that caused creation to fail.
        #[source]
        source: std::io::Error,
    },

    /// The current working directory could not be resolved.
    #[error("working directory unavailable: {reason}")]
    WorkingDirectory {
        /// Description of why the directory could not be used.
        reason: String,
    },

    /// Failed to write the run summary.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using [`StagerError`].
pub type Result<T> = std::result::Result<T, StagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dir_creation_includes_path_and_reason() {
        let err = StagerError::OutputDirCreation {
            path: Utf8PathBuf::from("public/wasm"),
            reason: "permission denied".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("public/wasm"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn workspace_creation_preserves_source() {
        let err = StagerError::WorkspaceCreation {
            source: std::io::Error::other("no space left on device"),
        };
        assert!(err.to_string().contains("no space left"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn config_errors_are_transparent() {
        let err = StagerError::from(ConfigError::EmptyAssetList {
            package: "tree-sitter-c".into(),
        });
        assert!(err.to_string().contains("tree-sitter-c"));
    }
}
