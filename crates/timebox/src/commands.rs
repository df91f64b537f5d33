//! Subcommand execution

use crate::cli::{Cli, CliError, Commands, EXIT_MISSED, EXIT_OK};
use crate::input::spawn_reader;
use crate::repl::{Session, spawn_eviction};
use crate::report::{render_batch, render_eviction, render_submission};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use timebox_core::{CommandToolchain, Harness, HarnessConfig, Snippet};
use tracing::{Instrument, info, warn};

const WELCOME: &str = "Welcome to timebox: build a snippet once, then run it against a time budget";

fn open_harness(config: HarnessConfig) -> Result<Harness, CliError> {
    let toolchain = Arc::new(CommandToolchain::new(config.toolchain.clone()));
    Ok(Harness::new(config, toolchain)?)
}

fn write_stdout(text: &str) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| CliError::other(format!("cannot write output: {e}")))
}

/// Execute the parsed command line, returning the process exit code
pub async fn execute(cli: &Cli) -> Result<i32, CliError> {
    let command = cli.command.clone().unwrap_or(Commands::Repl);
    let span = crate::command_span!(format!("{command:?}"));
    async move {
        let config = cli.harness_config()?;
        match command {
            Commands::Repl => repl(config, cli.json).await,
            Commands::Exec {
                file,
                expected_millis,
            } => exec(config, &file, expected_millis, cli.json).await,
            Commands::Evict => evict(config, cli.json).await,
            Commands::Config => show_config(&config, cli.json),
        }
    }
    .instrument(span)
    .await
}

async fn repl(config: HarnessConfig, json: bool) -> Result<i32, CliError> {
    let harness = open_harness(config)?;
    if !json {
        write_stdout(&format!("{WELCOME}\n"))?;
    }

    let mut session = Session::new(harness, io::stdout(), json);
    session.trigger_eviction();
    let mut inputs = spawn_reader(tokio::io::stdin());
    session.run(&mut inputs).await?;
    Ok(EXIT_OK)
}

async fn exec(
    config: HarnessConfig,
    file: &Path,
    expected_millis: f64,
    json: bool,
) -> Result<i32, CliError> {
    let source = std::fs::read_to_string(file)
        .map_err(|e| CliError::config(format!("cannot read {}: {e}", file.display())))?;
    let mut harness = open_harness(config)?;
    // Finish before building so the new artifact is not a purge candidate
    if let Err(e) = spawn_eviction(&harness).await {
        warn!("Eviction task failed: {e}");
    }

    let submission = harness
        .submit(&Snippet::new(source), expected_millis)
        .await?;
    write_stdout(&render_submission(&submission, json))?;

    harness.wait_idle().await?;
    let results = harness.drain_results();
    write_stdout(&render_batch(&results, json))?;

    let all_ok = results.iter().all(|r| r.ok_time && r.ok_result);
    info!(all_ok, "Snippet finished");
    Ok(if all_ok { EXIT_OK } else { EXIT_MISSED })
}

async fn evict(config: HarnessConfig, json: bool) -> Result<i32, CliError> {
    let harness = open_harness(config)?;
    let policy = harness.eviction_policy().clone();
    let store = harness.store().clone();
    let report = tokio::task::spawn_blocking(move || policy.run(&store))
        .await
        .map_err(|e| CliError::other(format!("eviction task failed: {e}")))??;
    write_stdout(&render_eviction(&report, json))?;
    Ok(EXIT_OK)
}

fn show_config(config: &HarnessConfig, json: bool) -> Result<i32, CliError> {
    let text = if json {
        serde_json::to_string_pretty(config)
            .map_err(|e| CliError::other(format!("cannot serialize configuration: {e}")))?
    } else {
        toml::to_string_pretty(config)
            .map_err(|e| CliError::other(format!("cannot serialize configuration: {e}")))?
    };
    write_stdout(&format!("{}\n", text.trim_end()))?;
    Ok(EXIT_OK)
}
