//! Execution supervisor
//!
//! Runs a built artifact as its own process and races its completion against
//! a deadline. On timeout the whole process group is killed and the result is
//! reported with `ok_time = false`. A kill that the OS refuses is a
//! [`Error::ProcessControl`] and never turns into a result.
//!
//! Starting the process is synchronous so the caller learns about spawn
//! failures immediately; the race itself runs as a separate task.

use crate::mailbox::MailboxSender;
use crate::store::EntryPaths;
use crate::types::ExecutionResult;
use crate::{Error, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to wait for pipe readers once the process is gone. Descendants
/// can keep a pipe open after the artifact itself exited.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// How long a killed process may take to be reaped
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Convert a millisecond budget into a deadline
pub fn budget_from_millis(expected_millis: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(expected_millis / 1000.0).map_err(|_| {
        Error::configuration(format!(
            "expected time must be a finite, non-negative number of milliseconds, got {expected_millis}"
        ))
    })
}

/// Bytes read from one of the child's pipes so far
#[derive(Debug)]
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl Capture {
    fn start<R>(mut pipe: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let reader = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buffer, reader }
    }

    /// Whatever has been captured once the reader finishes or the grace
    /// period runs out, whichever comes first
    async fn collect(self) -> String {
        let Self { buffer, mut reader } = self;
        if tokio::time::timeout(OUTPUT_GRACE, &mut reader).await.is_err() {
            debug!("Output reader still busy after grace period; keeping partial output");
            reader.abort();
        }
        let bytes = std::mem::take(&mut *buffer.lock().await);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

async fn collect_optional(capture: Option<Capture>) -> String {
    match capture {
        Some(capture) => capture.collect().await,
        None => String::new(),
    }
}

/// A running artifact that has not been raced against its deadline yet
#[derive(Debug)]
pub struct Launched {
    paths: EntryPaths,
    child: Child,
    pid: Option<u32>,
    started: Instant,
    budget: Duration,
    expected_millis: f64,
    stdout: Option<Capture>,
    stderr: Option<Capture>,
}

impl Launched {
    /// Start the artifact of `paths` with stdout and stderr captured
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(paths: &EntryPaths, expected_millis: f64) -> Result<Self> {
        let budget = budget_from_millis(expected_millis)?;

        let mut cmd = Command::new(&paths.artifact);
        cmd.current_dir(&paths.entry_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout takes down everything the artifact spawned
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn(e, &paths.artifact))?;
        let pid = child.id();
        let stdout = child.stdout.take().map(Capture::start);
        let stderr = child.stderr.take().map(Capture::start);

        info!(
            artifact = %paths.artifact.display(),
            pid = ?pid,
            budget_ms = expected_millis,
            "Launched artifact"
        );

        Ok(Self {
            paths: paths.clone(),
            child,
            pid,
            started,
            budget,
            expected_millis,
            stdout,
            stderr,
        })
    }

    /// OS process id of the artifact
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Race the process against its deadline and build the result
    pub async fn wait(mut self) -> Result<ExecutionResult> {
        let exited = tokio::select! {
            status = self.child.wait() => Some(status),
            () = tokio::time::sleep(self.budget) => None,
        };

        match exited {
            Some(status) => {
                let actual_millis = elapsed_millis(self.started);
                let stdout = collect_optional(self.stdout.take()).await;
                let mut stderr = collect_optional(self.stderr.take()).await;
                let (exit_code, success) = match status {
                    Ok(status) => (status.code(), status.success()),
                    Err(e) => {
                        error!(artifact = %self.paths.artifact.display(), "Failed to wait for process: {e}");
                        stderr.push_str(&format!("\nfailed to wait for process: {e}"));
                        (None, false)
                    }
                };

                if success {
                    debug!(actual_millis, "Artifact finished within budget");
                } else {
                    warn!(exit_code = ?exit_code, actual_millis, "Artifact exited with failure");
                }
                Ok(ExecutionResult::finished(
                    &self.paths,
                    exit_code,
                    success,
                    stdout,
                    stderr,
                    actual_millis,
                    self.expected_millis,
                ))
            }
            None => {
                // Elapsed time is taken at the moment the deadline decision is made
                let actual_millis = elapsed_millis(self.started);
                self.terminate()?;
                match tokio::time::timeout(KILL_WAIT, self.child.wait()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Failed to reap terminated process: {e}"),
                    Err(_) => {
                        return Err(Error::process_control(
                            std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "process still running after kill",
                            ),
                            self.pid.unwrap_or_default(),
                        ));
                    }
                }

                let stdout = collect_optional(self.stdout.take()).await;
                let stderr = collect_optional(self.stderr.take()).await;
                warn!(
                    artifact = %self.paths.artifact.display(),
                    actual_millis,
                    expected_millis = self.expected_millis,
                    "Artifact exceeded its budget and was terminated"
                );
                Ok(ExecutionResult::timed_out(
                    &self.paths,
                    stdout,
                    stderr,
                    actual_millis,
                    self.expected_millis,
                ))
            }
        }
    }

    /// Race the process and post the result to the mailbox
    ///
    /// Only a process control fault comes back as an error; every other
    /// outcome is delivered as a result.
    pub async fn supervise(self, mailbox: MailboxSender) -> Result<()> {
        let pid = self.pid;
        match self.wait().await {
            Ok(result) => {
                mailbox.post(result);
                Ok(())
            }
            Err(e) => {
                error!(pid = ?pid, "Supervision failed: {e}");
                Err(e)
            }
        }
    }

    /// Kill the artifact's whole process group
    #[cfg(unix)]
    fn terminate(&mut self) -> Result<()> {
        let Some(pid) = self.pid else {
            // Already reaped
            return Ok(());
        };
        let pgid = i32::try_from(pid).map_err(|_| {
            Error::process_control(
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"),
                pid,
            )
        })?;

        // SAFETY: libc::kill with a negative pid signals the whole process group.
        // The group was created for this child via process_group(0).
        #[expect(unsafe_code, reason = "Required for POSIX signal handling")]
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc == 0 {
            debug!(pid, "Sent SIGKILL to process group");
            return Ok(());
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // The group vanished between the deadline and the kill
            return Ok(());
        }
        Err(Error::process_control(err, pid))
    }

    /// Kill the artifact process
    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<()> {
        let pid = self.pid.unwrap_or_default();
        self.child
            .start_kill()
            .map_err(|e| Error::process_control(e, pid))
    }
}

fn elapsed_millis(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Run an artifact under a deadline and wait for its result
pub async fn run_with_deadline(paths: &EntryPaths, expected_millis: f64) -> Result<ExecutionResult> {
    Launched::start(paths, expected_millis)?.wait().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fingerprint::Snippet;
    use crate::mailbox::Mailbox;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(tmp: &TempDir, body: &str) -> EntryPaths {
        let fp = Snippet::new(body).fingerprint();
        let paths = EntryPaths::resolve(tmp.path(), &fp, "sh");
        std::fs::create_dir_all(&paths.entry_dir).unwrap();
        std::fs::write(&paths.artifact, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&paths.artifact, std::fs::Permissions::from_mode(0o755)).unwrap();
        paths
    }

    #[test]
    fn test_budget_rejects_invalid_values() {
        assert!(budget_from_millis(-1.0).is_err());
        assert!(budget_from_millis(f64::NAN).is_err());
        assert!(budget_from_millis(f64::INFINITY).is_err());
        assert_eq!(budget_from_millis(1500.0).unwrap(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_fast_process_is_ok() {
        let tmp = TempDir::new().unwrap();
        let paths = script(&tmp, "echo OK; echo warn >&2");
        let result = run_with_deadline(&paths, 5000.0).await.unwrap();
        assert!(result.ok_time);
        assert!(result.ok_result);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "OK\n");
        assert_eq!(result.stderr, "warn\n");
        assert!(result.actual_millis < 5000.0);
        assert!((result.expected_millis - 5000.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failing_process_reports_runtime_error() {
        let tmp = TempDir::new().unwrap();
        let paths = script(&tmp, "echo 'panic: boom' >&2; exit 3");
        let result = run_with_deadline(&paths, 5000.0).await.unwrap();
        assert!(result.ok_time);
        assert!(!result.ok_result);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.stderr.contains("panic: boom"));
    }

    #[tokio::test]
    async fn test_slow_process_is_killed_at_deadline() {
        let tmp = TempDir::new().unwrap();
        let paths = script(&tmp, "echo started; sleep 10; echo never");
        let wall = Instant::now();
        let result = run_with_deadline(&paths, 200.0).await.unwrap();

        assert!(!result.ok_time);
        assert!(!result.ok_result);
        assert!(result.actual_millis >= 200.0);
        assert!(result.actual_millis < 2000.0);
        assert!(!result.stdout.contains("never"));
        // The sleeping grandchild must not keep us waiting for 10 seconds
        assert!(wall.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let fp = Snippet::new("never built").fingerprint();
        let paths = EntryPaths::resolve(tmp.path(), &fp, "go");
        std::fs::create_dir_all(&paths.entry_dir).unwrap();
        assert!(matches!(
            Launched::start(&paths, 100.0),
            Err(Error::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_supervise_posts_exactly_one_result() {
        let tmp = TempDir::new().unwrap();
        let paths = script(&tmp, "echo hi");
        let (mut mailbox, tx) = Mailbox::channel();

        let launched = Launched::start(&paths, 5000.0).unwrap();
        assert!(launched.pid().is_some());
        launched.supervise(tx).await.unwrap();

        let results = mailbox.drain_all();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].stdout, "hi\n");
        assert_eq!(results[0].name, paths.artifact);
    }

    #[tokio::test]
    async fn test_failed_kill_is_a_fault_and_posts_nothing() {
        let tmp = TempDir::new().unwrap();
        let paths = script(&tmp, "sleep 2");
        let (mut mailbox, tx) = Mailbox::channel();

        let mut launched = Launched::start(&paths, 50.0).unwrap();
        // A pid that cannot name a process group makes the kill fail
        launched.pid = Some(u32::MAX);
        let err = launched.supervise(tx).await.unwrap_err();

        assert!(matches!(err, Error::ProcessControl { pid, .. } if pid == u32::MAX));
        assert!(err.is_fatal());
        assert!(mailbox.drain_all().is_empty());
    }
}
