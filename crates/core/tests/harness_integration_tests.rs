//! Integration tests for the harness
//!
//! Snippets are shell scripts. The toolchain syntax-checks them with `sh -n`
//! and installs them as executable artifacts, which exercises the real
//! command toolchain, the store layout and process supervision end to end.

#![cfg(unix)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use timebox_core::{
    CommandToolchain, Error, EvictionPolicy, Harness, HarnessConfig, Snippet, Stage,
    ToolchainConfig,
};

const INSTALL_SCRIPT: &str =
    r#"sh -n "$1" && { printf '#!/bin/sh\n'; cat "$1"; } > "$2" && chmod +x "$2""#;

fn shell_toolchain() -> ToolchainConfig {
    ToolchainConfig {
        program: "sh".into(),
        args: vec![
            "-c".into(),
            INSTALL_SCRIPT.into(),
            "install".into(),
            "{source}".into(),
            "{artifact}".into(),
        ],
        source_extension: "sh".into(),
    }
}

fn harness(tmp: &TempDir) -> Harness {
    let config = HarnessConfig {
        cache_root: Some(tmp.path().join("store")),
        toolchain: shell_toolchain(),
        ..HarnessConfig::default()
    };
    let toolchain = Arc::new(CommandToolchain::new(config.toolchain.clone()));
    Harness::new(config, toolchain).unwrap()
}

#[tokio::test]
async fn test_print_ok_within_budget() {
    let tmp = TempDir::new().unwrap();
    let mut harness = harness(&tmp);

    let submission = harness
        .submit(&Snippet::new("echo OK"), 5_000.0)
        .await
        .unwrap();
    harness.wait_idle().await.unwrap();

    let results = harness.drain_results();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.stdout, "OK\n");
    assert!(result.stderr.is_empty());
    assert!(result.ok_time);
    assert!(result.ok_result);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.fingerprint, submission.fingerprint);
    assert!(result.actual_millis < result.expected_millis);
}

#[tokio::test]
async fn test_resubmission_reuses_artifact() {
    let tmp = TempDir::new().unwrap();
    let mut harness = harness(&tmp);
    let snippet = Snippet::new("echo again");

    let first = harness.submit(&snippet, 5_000.0).await.unwrap();
    let second = harness.submit(&snippet, 5_000.0).await.unwrap();
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.artifact, second.artifact);

    harness.wait_idle().await.unwrap();
    let results = harness.drain_results();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.stdout == "again\n"));
}

#[tokio::test]
async fn test_nonzero_exit_reports_stderr() {
    let tmp = TempDir::new().unwrap();
    let mut harness = harness(&tmp);

    harness
        .submit(&Snippet::new("echo boom >&2\nexit 3"), 5_000.0)
        .await
        .unwrap();
    harness.wait_idle().await.unwrap();

    let results = harness.drain_results();
    assert_eq!(results.len(), 1);
    assert!(results[0].ok_time);
    assert!(!results[0].ok_result);
    assert_eq!(results[0].exit_code, Some(3));
    assert_eq!(results[0].stderr, "boom\n");
}

#[tokio::test]
async fn test_overrun_is_killed_near_deadline() {
    let tmp = TempDir::new().unwrap();
    let mut harness = harness(&tmp);

    let started = Instant::now();
    harness
        .submit(&Snippet::new("echo started\nsleep 30"), 300.0)
        .await
        .unwrap();
    harness.wait_idle().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    let results = harness.drain_results();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(!result.ok_time);
    assert!(!result.ok_result);
    assert!(result.exit_code.is_none());
    assert!(result.actual_millis >= 300.0);
    assert_eq!(result.stdout, "started\n");
}

#[tokio::test]
async fn test_build_failure_is_returned_not_posted() {
    let tmp = TempDir::new().unwrap();
    let mut harness = harness(&tmp);

    let err = harness
        .submit(&Snippet::new("if then fi ("), 1_000.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Build { .. }));

    harness.wait_idle().await.unwrap();
    assert!(harness.drain_results().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_each_deliver_once() {
    let tmp = TempDir::new().unwrap();
    let mut harness = harness(&tmp);

    let count = 12;
    for n in 0..count {
        // Alternate finishers and overruns
        let body = if n % 3 == 0 {
            format!("echo {n}\nsleep 30")
        } else {
            format!("sleep 0.0{n}\necho {n}")
        };
        harness.submit(&Snippet::new(body), 400.0).await.unwrap();
    }
    assert!(harness.in_flight() <= count);

    harness.wait_idle().await.unwrap();
    harness.reap().unwrap();
    let results = harness.drain_results();
    assert_eq!(results.len(), count);

    let outputs: HashSet<_> = results.iter().map(|r| r.stdout.clone()).collect();
    assert_eq!(outputs.len(), count);
    let timed_out = results.iter().filter(|r| !r.ok_time).count();
    assert_eq!(timed_out, 4);
    assert!(harness.drain_results().is_empty());
}

#[tokio::test]
async fn test_eviction_brings_store_under_ceiling() {
    let tmp = TempDir::new().unwrap();
    let mut harness = harness(&tmp);

    for n in 0..6 {
        harness
            .submit(&Snippet::new(format!("echo {n}")), 5_000.0)
            .await
            .unwrap();
    }
    harness.wait_idle().await.unwrap();

    let store = harness.store().clone();
    let size = store.size().unwrap();
    assert!(size > 0);

    // A ceiling just below the current size forces at least one removal
    let policy = EvictionPolicy::new(size - 1, chrono::Duration::days(2), 20);
    let report = policy.run(&store).unwrap();
    assert_ne!(report.stage, Stage::WithinLimit);
    assert!(report.size_after < size - 1);

    // Evicted snippets are rebuilt on demand
    let again = harness
        .submit(&Snippet::new("echo 0"), 5_000.0)
        .await
        .unwrap();
    harness.wait_idle().await.unwrap();
    assert!(harness.drain_results().iter().all(|r| r.ok_result));
    assert!(again.artifact.exists());
}

#[tokio::test]
async fn test_harness_eviction_uses_configured_ceiling() {
    let tmp = TempDir::new().unwrap();
    let config = HarnessConfig {
        cache_root: Some(tmp.path().join("store")),
        toolchain: shell_toolchain(),
        max_store_bytes: 1,
        ..HarnessConfig::default()
    };
    let toolchain = Arc::new(CommandToolchain::new(config.toolchain.clone()));
    let mut harness = Harness::new(config, toolchain).unwrap();

    harness
        .submit(&Snippet::new("echo tiny"), 5_000.0)
        .await
        .unwrap();
    harness.wait_idle().await.unwrap();

    let report = harness.evict().unwrap();
    assert!(report.size_after < 1);
    assert!(harness.store().root().exists());
}
