//! Command-line arguments, CLI errors and exit codes

use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use timebox_core::HarnessConfig;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// The snippet ran but missed its budget or failed
pub const EXIT_MISSED: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Build, execution or cache error exit code
pub const EXIT_RUN: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(timebox::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Build or run error (exit code 3)
    #[error("Run error: {message}")]
    #[diagnostic(code(timebox::cli::run))]
    Run {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Fatal supervision or I/O error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(timebox::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new run error with help text
    #[must_use]
    pub fn run_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Run {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }
}

impl From<timebox_core::Error> for CliError {
    fn from(err: timebox_core::Error) -> Self {
        use timebox_core::Error;
        match err {
            Error::Configuration { message } => Self::config(message),
            Error::InvalidFingerprint { .. } => Self::config(err.to_string()),
            Error::Build { message, .. } => {
                Self::run_with_help(message, "Fix the compile errors above and submit again")
            }
            Error::Spawn { .. } => Self::run_with_help(
                err.to_string(),
                "The cached artifact may be corrupt; run `timebox evict` and retry",
            ),
            Error::Io { .. } => Self::Other {
                message: err.to_string(),
                help: Some("Check file permissions and ensure the cache directory is writable".into()),
            },
            Error::ProcessControl { .. } | Error::Task { .. } => Self::other(err.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Run { .. } | CliError::Other { .. } => EXIT_RUN,
    }
}

/// JSON envelope for errors
#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    status: &'static str,
    code: &'static str,
    message: &'a str,
}

/// Render an error as JSON on stdout or as a miette report on stderr
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let message = err.to_string();
        let envelope = ErrorEnvelope {
            status: "error",
            code: match err {
                CliError::Config { .. } => "config",
                CliError::Run { .. } => "run",
                CliError::Other { .. } => "other",
            },
            message: &message,
        };
        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Build a snippet once, then run it against a time budget
#[derive(Parser, Debug)]
#[command(name = "timebox")]
#[command(about = "Build code snippets once and run them against a time budget")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute; interactive mode when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (TOML)
    #[arg(long, short = 'c', global = true, env = "TIMEBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache store directory
    #[arg(long, global = true, env = "TIMEBOX_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache store ceiling in bytes
    #[arg(long, global = true, env = "TIMEBOX_MAX_STORE_BYTES")]
    pub max_store_bytes: Option<u64>,

    /// Idle time in milliseconds before pending results are printed
    #[arg(long, global = true)]
    pub idle_poll_millis: Option<u64>,

    /// Logging verbosity level
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// Log line format
    #[arg(long, global = true, default_value = "compact", value_enum)]
    pub log_format: TracingFormat,

    /// Print results and errors as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Read snippets interactively (the default)
    #[command(about = "Read snippets from stdin, each ended by Ctrl-] and Enter")]
    Repl,
    /// Build and run one snippet file, then exit
    #[command(about = "Build and run a single snippet file against a budget")]
    Exec {
        /// Snippet source file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Expected run time in milliseconds
        #[arg(long = "expect", short = 't', value_name = "MILLIS")]
        expected_millis: f64,
    },
    /// Run the eviction policy once
    #[command(about = "Shrink the cache store under its ceiling")]
    Evict,
    /// Print the effective configuration
    #[command(about = "Print the effective configuration as TOML")]
    Config,
}

impl Cli {
    /// Effective configuration: file (or defaults), then flag overrides
    pub fn harness_config(&self) -> Result<HarnessConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => match HarnessConfig::from_file(path) {
                Ok(config) => config,
                Err(e @ timebox_core::Error::Io { .. }) => {
                    return Err(CliError::Config {
                        message: e.to_string(),
                        help: Some("Pass an existing TOML file with --config or TIMEBOX_CONFIG".into()),
                    });
                }
                Err(e) => return Err(e.into()),
            },
            None => HarnessConfig::default(),
        };
        if let Some(dir) = &self.cache_dir {
            config.cache_root = Some(dir.clone());
        }
        if let Some(bytes) = self.max_store_bytes {
            config.max_store_bytes = bytes;
        }
        if let Some(millis) = self.idle_poll_millis {
            config.idle_poll_millis = millis;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
