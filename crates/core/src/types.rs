//! Records produced by builds and executions

use crate::fingerprint::Fingerprint;
use crate::store::EntryPaths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a single supervised run
///
/// Produced exactly once per execution request and delivered through the
/// result mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Artifact that was executed
    pub name: PathBuf,
    /// Fingerprint of the snippet the artifact was built from
    pub fingerprint: Fingerprint,
    /// Standard output captured from the process
    pub stdout: String,
    /// Standard error captured from the process
    pub stderr: String,
    /// Whether the process finished before the deadline
    pub ok_time: bool,
    /// Whether the process finished with a success status
    pub ok_result: bool,
    /// Exit code when the process exited on its own
    pub exit_code: Option<i32>,
    /// Wall-clock milliseconds from launch to exit or termination
    pub actual_millis: f64,
    /// The budget the run was held to
    pub expected_millis: f64,
}

impl ExecutionResult {
    /// The process exited before the deadline
    #[must_use]
    pub fn finished(
        paths: &EntryPaths,
        exit_code: Option<i32>,
        success: bool,
        stdout: String,
        stderr: String,
        actual_millis: f64,
        expected_millis: f64,
    ) -> Self {
        Self {
            name: paths.artifact.clone(),
            fingerprint: paths.fingerprint.clone(),
            stdout,
            stderr,
            ok_time: true,
            ok_result: success,
            exit_code,
            actual_millis,
            expected_millis,
        }
    }

    /// The deadline fired and the process was terminated
    #[must_use]
    pub fn timed_out(
        paths: &EntryPaths,
        stdout: String,
        stderr: String,
        actual_millis: f64,
        expected_millis: f64,
    ) -> Self {
        Self {
            name: paths.artifact.clone(),
            fingerprint: paths.fingerprint.clone(),
            stdout,
            stderr,
            ok_time: false,
            ok_result: false,
            exit_code: None,
            actual_millis,
            expected_millis,
        }
    }
}

/// What the builder did for a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Resolved entry paths; `paths.artifact` exists
    pub paths: EntryPaths,
    /// True when the artifact was already cached and nothing was compiled
    pub cache_hit: bool,
}

/// Returned to the caller as soon as an execution has been launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Fingerprint of the submitted snippet
    pub fingerprint: Fingerprint,
    /// Artifact being executed
    pub artifact: PathBuf,
    /// Whether the build was skipped
    pub cache_hit: bool,
    /// OS process id of the launched artifact, when known
    pub pid: Option<u32>,
}
