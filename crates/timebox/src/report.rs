//! Rendering of results, submissions and eviction runs

use serde::Serialize;
use std::fmt::Write as _;
use timebox_core::{EvictionReport, ExecutionResult, Submission};

/// One-word classification of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Finished successfully within budget
    Ok,
    /// Finished within budget with a failure status
    Failed,
    /// Killed at the deadline
    TimedOut,
}

impl Verdict {
    /// Classify a result
    #[must_use]
    pub const fn of(result: &ExecutionResult) -> Self {
        match (result.ok_time, result.ok_result) {
            (false, _) => Self::TimedOut,
            (true, false) => Self::Failed,
            (true, true) => Self::Ok,
        }
    }
}

/// A result line in JSON mode
#[derive(Debug, Serialize)]
struct ResultLine<'a> {
    event: &'static str,
    verdict: Verdict,
    #[serde(flatten)]
    result: &'a ExecutionResult,
}

/// Human-readable block for one result
#[must_use]
pub fn render_result(result: &ExecutionResult) -> String {
    let name = result.name.display();
    let mut out = String::new();
    let _ = writeln!(out, "Stdout for {name}");
    let _ = writeln!(out, "{}", result.stdout.trim_end());
    let _ = writeln!(out, "Results for {name}");
    match Verdict::of(result) {
        Verdict::Failed => {
            let code = result
                .exit_code
                .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
            let _ = writeln!(out, "Error occurred while executing the snippet (exit {code})");
            let _ = writeln!(out, "{}", result.stderr.trim_end());
        }
        Verdict::TimedOut => {
            let _ = writeln!(
                out,
                "{:.1} ms. Fail. It's slower than you expected: {:.1} ms",
                result.actual_millis, result.expected_millis
            );
        }
        Verdict::Ok => {
            let _ = writeln!(
                out,
                "{:.1} ms. Ok. It's faster than you expected: {:.1} ms",
                result.actual_millis, result.expected_millis
            );
        }
    }
    out
}

/// Render everything drained from the mailbox in one go
///
/// Text mode always says something so an idle wake-up is visible; JSON mode
/// emits one line per result and nothing when there are none.
#[must_use]
pub fn render_batch(results: &[ExecutionResult], json: bool) -> String {
    if json {
        return results
            .iter()
            .filter_map(|result| {
                serde_json::to_string(&ResultLine {
                    event: "result",
                    verdict: Verdict::of(result),
                    result,
                })
                .ok()
            })
            .map(|line| line + "\n")
            .collect();
    }
    if results.is_empty() {
        return "We have no new results\n".to_string();
    }
    let mut out = String::from("We have new results\n");
    for result in results {
        out.push_str(&render_result(result));
    }
    out
}

/// Acknowledge a launched submission
#[must_use]
pub fn render_submission(submission: &Submission, json: bool) -> String {
    if json {
        let line = serde_json::json!({
            "event": "submitted",
            "fingerprint": submission.fingerprint,
            "artifact": submission.artifact,
            "cache_hit": submission.cache_hit,
            "pid": submission.pid,
        });
        return format!("{line}\n");
    }
    let how = if submission.cache_hit {
        "cached"
    } else {
        "built"
    };
    format!(
        "Running {} ({how}, fingerprint {})\n",
        submission.artifact.display(),
        submission.fingerprint.short()
    )
}

/// Summarize an eviction run
#[must_use]
pub fn render_eviction(report: &EvictionReport, json: bool) -> String {
    if json {
        let line = serde_json::json!({ "event": "eviction", "report": report });
        return format!("{line}\n");
    }
    format!(
        "Cache store: {} -> {} bytes ({}, {} removed)\n",
        report.size_before, report.size_after, report.stage, report.removed
    )
}
