//! timebox - build code snippets once and run them against a time budget
//!
//! The command-line surface over [`timebox_core`]: argument parsing, the
//! interactive input loop, result rendering and tracing setup.

// CLI output goes to stdout/stderr by design
#![allow(clippy::print_stdout, clippy::print_stderr)]
#![expect(
    clippy::missing_errors_doc,
    reason = "CLI errors are rendered, not documented per function"
)]

/// CLI argument parsing, errors and exit codes.
pub mod cli;
/// Subcommand implementations.
pub mod commands;
/// Input blocks delimited by Ctrl-].
pub mod input;
/// Interactive consumer loop.
pub mod repl;
/// Text and JSON rendering.
pub mod report;
/// Tracing and logging configuration.
pub mod tracing;

pub use cli::{Cli, CliError};
