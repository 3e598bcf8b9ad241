//! Asset stager library.
//!
//! This crate gathers binary assets from an already-installed package and from
//! a list of transient packages that are downloaded only for their assets,
//! stages them under one output directory, and then prunes the transient
//! packages from the project's dependency manifest.
//!
//! # Modules
//!
//! - [`assets`] - Package names, asset specs, and the source-to-asset table
//! - [`cli`] - Command-line argument definitions
//! - [`command`] - External command execution with captured output
//! - [`config`] - Static configuration loaded once per run
//! - [`direct`] - Copying assets out of installed packages
//! - [`error`] - Fatal error types
//! - [`extraction`] - Archive extraction strategies
//! - [`fetcher`] - Download, unpack, and stage one transient package
//! - [`manifest`] - Removing transient packages from the manifest
//! - [`output`] - Progress lines and summary rendering
//! - [`pipeline`] - Phase sequencing and outcome aggregation
//! - [`stager`] - The output directory and atomic per-file staging
//! - [`workspace`] - Scoped temporary workspace

pub mod assets;
pub mod cli;
pub mod command;
pub mod config;
pub mod direct;
pub mod error;
pub mod extraction;
pub mod fetcher;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod stager;
pub mod workspace;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
