//! Interactive consumer loop
//!
//! Each turn prints whatever results arrived, then waits for the next input
//! block for at most the idle timeout. Executions keep running in the
//! background while the loop waits. A supervisor fault ends the session.

use crate::cli::CliError;
use crate::input::{parse_expected_millis, resolve_snippet};
use crate::report::{render_batch, render_submission};
use miette::Diagnostic;
use std::io::Write;
use timebox_core::{Harness, Snippet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const CODE_PROMPT: &str = "Please input a snippet or /absolute/path/to/a/file. \
     To end input press Ctrl-] and then Enter";
const MILLIS_PROMPT: &str =
    "Please input the maximum expected run time in milliseconds, ended by Ctrl-] and Enter";

/// Run the eviction policy on the blocking pool and log the outcome
pub fn spawn_eviction(harness: &Harness) -> JoinHandle<()> {
    let policy = harness.eviction_policy().clone();
    let store = harness.store().clone();
    tokio::task::spawn_blocking(move || match policy.run(&store) {
        Ok(report) => info!(
            stage = %report.stage,
            size_before = report.size_before,
            size_after = report.size_after,
            removed = report.removed,
            "Eviction finished"
        ),
        Err(e) => warn!("Eviction failed: {e}"),
    })
}

/// Timer for periodic eviction, first firing one period from now
///
/// A period too long to be represented as a deadline disables the timer.
fn eviction_timer(period: Option<Duration>) -> Option<Interval> {
    let period = period?;
    let Some(start) = Instant::now().checked_add(period) else {
        warn!(
            secs = period.as_secs(),
            "Eviction interval out of range; periodic eviction disabled"
        );
        return None;
    };
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// State of one interactive session
pub struct Session<W> {
    harness: Harness,
    out: W,
    json: bool,
    eviction: Option<JoinHandle<()>>,
}

impl<W: Write> Session<W> {
    /// Create a session writing to `out`
    pub const fn new(harness: Harness, out: W, json: bool) -> Self {
        Self {
            harness,
            out,
            json,
            eviction: None,
        }
    }

    /// Consume the session, returning its writer
    pub fn into_output(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) -> Result<(), CliError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| CliError::other(format!("cannot write output: {e}")))
    }

    fn prompt(&mut self, text: &str) -> Result<(), CliError> {
        if self.json {
            return Ok(());
        }
        self.emit(&format!("{text}\n"))
    }

    /// Report an error that does not end the session
    fn emit_error(&mut self, err: &CliError) -> Result<(), CliError> {
        if self.json {
            let line = serde_json::json!({ "event": "error", "message": err.to_string() });
            return self.emit(&format!("{line}\n"));
        }
        let mut text = format!("Error: {err}\n");
        if let Some(help) = err.help() {
            text.push_str(&format!("  help: {help}\n"));
        }
        self.emit(&text)
    }

    fn flush_results(&mut self) -> Result<(), CliError> {
        let results = self.harness.drain_results();
        self.emit(&render_batch(&results, self.json))
    }

    /// Start an eviction run unless one is still going
    pub fn trigger_eviction(&mut self) {
        if self.eviction.as_ref().is_some_and(|run| !run.is_finished()) {
            debug!("Previous eviction still running; skipping");
            return;
        }
        self.eviction = Some(spawn_eviction(&self.harness));
    }

    async fn submit(&mut self, snippet: &Snippet, millis_block: &str) -> Result<(), CliError> {
        let millis = match parse_expected_millis(millis_block) {
            Ok(millis) => millis,
            Err(e) => return self.emit_error(&e),
        };
        match self.harness.submit(snippet, millis).await {
            Ok(submission) => self.emit(&render_submission(&submission, self.json)),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => self.emit_error(&e.into()),
        }
    }

    /// Drive the loop until the input ends, then wait for every execution
    /// still in flight and print its result
    pub async fn run(&mut self, inputs: &mut mpsc::Receiver<String>) -> Result<(), CliError> {
        let idle = self.harness.config().idle_poll();
        let mut eviction = eviction_timer(self.harness.config().eviction_interval());

        loop {
            self.harness.reap()?;
            self.flush_results()?;
            self.prompt(CODE_PROMPT)?;

            tokio::select! {
                block = inputs.recv() => {
                    let Some(block) = block else {
                        debug!("Input closed");
                        break;
                    };
                    if block.is_empty() {
                        continue;
                    }
                    let snippet = match resolve_snippet(&block) {
                        Ok(snippet) => snippet,
                        Err(e) => {
                            self.emit_error(&e)?;
                            continue;
                        }
                    };
                    self.prompt(MILLIS_PROMPT)?;
                    let Some(millis_block) = inputs.recv().await else {
                        debug!("Input closed before the expected time was given");
                        break;
                    };
                    self.submit(&snippet, &millis_block).await?;
                }
                () = tokio::time::sleep(idle) => {
                    debug!(in_flight = self.harness.in_flight(), "Idle timeout");
                }
                () = next_tick(&mut eviction) => {
                    self.trigger_eviction();
                }
            }
        }

        if self.harness.in_flight() > 0 {
            info!(
                in_flight = self.harness.in_flight(),
                "Waiting for running snippets"
            );
        }
        self.harness.wait_idle().await?;
        let results = self.harness.drain_results();
        if !results.is_empty() {
            self.emit(&render_batch(&results, self.json))?;
        }
        if let Some(run) = self.eviction.take() {
            let _ = run.await;
        }
        Ok(())
    }
}
