//! Toolchain service: turns a cache entry's source into a runnable artifact

use crate::config::ToolchainConfig;
use crate::store::EntryPaths;
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, warn};

/// Compiles the source of a cache entry into its artifact path
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// File extension used for source files handed to this toolchain
    fn source_extension(&self) -> &str;

    /// Compile `paths.source_file` into `paths.artifact`.
    ///
    /// A toolchain that fails must not leave a file at `paths.artifact`.
    async fn compile(&self, paths: &EntryPaths) -> Result<()>;
}

/// Toolchain backed by an external compiler command
///
/// Arguments may contain the placeholders `{source}`, `{artifact}`, `{dir}`
/// and `{fingerprint}`. The command runs inside the entry directory.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    config: ToolchainConfig,
}

impl CommandToolchain {
    /// Create a toolchain from its configuration
    #[must_use]
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    /// The `go build` toolchain
    #[must_use]
    pub fn go() -> Self {
        Self::new(ToolchainConfig::default())
    }

    fn render_args(&self, paths: &EntryPaths) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &paths.source_file.to_string_lossy())
                    .replace("{artifact}", &paths.artifact.to_string_lossy())
                    .replace("{dir}", &paths.entry_dir.to_string_lossy())
                    .replace("{fingerprint}", paths.fingerprint.as_hex())
            })
            .collect()
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    fn source_extension(&self) -> &str {
        &self.config.source_extension
    }

    async fn compile(&self, paths: &EntryPaths) -> Result<()> {
        let args = self.render_args(paths);
        debug!(
            program = %self.config.program,
            args = ?args,
            dir = %paths.entry_dir.display(),
            "Invoking toolchain"
        );

        let start = Instant::now();
        let output = Command::new(&self.config.program)
            .args(&args)
            .current_dir(&paths.entry_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                Error::build(
                    &paths.fingerprint,
                    format!("failed to run {}: {e}", self.config.program),
                )
            })?;

        let duration_ms = start.elapsed().as_millis();
        if output.status.success() {
            debug!(duration_ms, "Toolchain finished");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        warn!(
            status = %output.status,
            duration_ms,
            "Toolchain rejected snippet"
        );
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        Err(Error::build(
            &paths.fingerprint,
            format!("{} exited with {}: {detail}", self.config.program, output.status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Snippet;
    use std::path::Path;

    fn paths() -> EntryPaths {
        let fp = Snippet::new("abc").fingerprint();
        EntryPaths::resolve(Path::new("/cache"), &fp, "go")
    }

    #[test]
    fn test_default_toolchain_is_go_build() {
        let toolchain = CommandToolchain::go();
        assert_eq!(toolchain.source_extension(), "go");
        let p = paths();
        let args = toolchain.render_args(&p);
        assert_eq!(args[0], "build");
        assert_eq!(args[1], "-o");
        assert_eq!(args[2], p.artifact.to_string_lossy());
        assert_eq!(args[3], p.source_file.to_string_lossy());
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let toolchain = CommandToolchain::new(ToolchainConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "echo {fingerprint} > {dir}/log".into()],
            source_extension: "sh".into(),
        });
        let p = paths();
        let args = toolchain.render_args(&p);
        assert_eq!(
            args[1],
            format!(
                "echo {} > {}/log",
                p.fingerprint.as_hex(),
                p.entry_dir.display()
            )
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_toolchain_reports_stderr() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fp = Snippet::new("broken").fingerprint();
        let p = EntryPaths::resolve(tmp.path(), &fp, "sh");
        std::fs::create_dir_all(&p.entry_dir).unwrap();

        let toolchain = CommandToolchain::new(ToolchainConfig {
            program: "sh".into(),
            args: vec!["-c".into(), "echo 'syntax error near line 1' >&2; exit 2".into()],
            source_extension: "sh".into(),
        });
        let err = toolchain.compile(&p).await.unwrap_err();
        match err {
            Error::Build { message, .. } => assert!(message.contains("syntax error")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_build_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fp = Snippet::new("x").fingerprint();
        let p = EntryPaths::resolve(tmp.path(), &fp, "go");
        std::fs::create_dir_all(&p.entry_dir).unwrap();

        let toolchain = CommandToolchain::new(ToolchainConfig {
            program: "timebox-definitely-not-a-compiler".into(),
            args: vec![],
            source_extension: "go".into(),
        });
        assert!(matches!(
            toolchain.compile(&p).await,
            Err(Error::Build { .. })
        ));
    }
}
