//! Harness configuration
//!
//! Every value has a default, so an empty TOML file is a valid configuration.
//! The cache root is always an explicit value once a [`HarnessConfig`] exists;
//! environment lookups happen only in [`default_cache_root`].

use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default store ceiling: 100 MiB
pub const DEFAULT_MAX_STORE_BYTES: u64 = 100 * 1024 * 1024;
/// Default retention window for the age sweep: 2 days
pub const DEFAULT_RETENTION_MINUTES: u64 = 60 * 24 * 2;
/// Default bound on oldest-first purge attempts
pub const DEFAULT_MAX_PURGE_ATTEMPTS: u32 = 20;
/// Default idle time before the consumer loop prints pending results
pub const DEFAULT_IDLE_POLL_MILLIS: u64 = 20_000;
/// Default period between eviction runs
pub const DEFAULT_EVICTION_INTERVAL_SECS: u64 = 600;

/// External compiler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Program to run, looked up on `PATH`
    pub program: String,
    /// Argument templates, see [`crate::toolchain::CommandToolchain`]
    pub args: Vec<String>,
    /// Extension given to source files
    pub source_extension: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
            args: vec![
                "build".to_string(),
                "-o".to_string(),
                "{artifact}".to_string(),
                "{source}".to_string(),
            ],
            source_extension: "go".to_string(),
        }
    }
}

/// Configuration for the build cache, eviction policy and consumer loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root directory of the cache store; resolved by [`default_cache_root`] when unset
    pub cache_root: Option<PathBuf>,
    /// Byte ceiling of the cache store
    pub max_store_bytes: u64,
    /// Files untouched for longer than this are removed by the age sweep
    pub retention_minutes: u64,
    /// Bound on oldest-first deletions before the full purge
    pub max_purge_attempts: u32,
    /// How long the consumer loop waits for input before printing results
    pub idle_poll_millis: u64,
    /// Period between eviction runs; zero disables periodic runs
    pub eviction_interval_secs: u64,
    /// Compiler used for cache misses
    pub toolchain: ToolchainConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            retention_minutes: DEFAULT_RETENTION_MINUTES,
            max_purge_attempts: DEFAULT_MAX_PURGE_ATTEMPTS,
            idle_poll_millis: DEFAULT_IDLE_POLL_MILLIS,
            eviction_interval_secs: DEFAULT_EVICTION_INTERVAL_SECS,
            toolchain: ToolchainConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read config"))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the harness cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.toolchain.program.trim().is_empty() {
            return Err(Error::configuration("toolchain.program must not be empty"));
        }
        let ext = &self.toolchain.source_extension;
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(Error::configuration(format!(
                "toolchain.source_extension must be a bare extension, got {ext:?}"
            )));
        }
        if self.max_purge_attempts == 0 {
            return Err(Error::configuration("max_purge_attempts must be at least 1"));
        }
        Ok(())
    }

    /// The cache root, resolving the default location if none was configured
    pub fn resolved_cache_root(&self) -> Result<PathBuf> {
        match &self.cache_root {
            Some(root) => Ok(root.clone()),
            None => default_cache_root(),
        }
    }

    /// Retention window of the age sweep
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        i64::try_from(self.retention_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Idle timeout of the consumer loop
    #[must_use]
    pub const fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_millis)
    }

    /// Period between eviction runs, if enabled
    #[must_use]
    pub const fn eviction_interval(&self) -> Option<Duration> {
        if self.eviction_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.eviction_interval_secs))
        }
    }
}

/// Inputs for determining the cache root directory
#[derive(Debug, Clone)]
struct CacheInputs {
    timebox_cache_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) TIMEBOX_CACHE_DIR (explicit override)
    // 2) XDG_CACHE_HOME/timebox
    // 3) OS cache dir/timebox
    // 4) ~/.timebox/cache
    // 5) TMPDIR/timebox/cache
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = inputs.timebox_cache_dir.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("timebox"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("timebox"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".timebox/cache"));
    }
    candidates.push(inputs.temp_dir.join("timebox/cache"));

    for path in candidates {
        // Some CI environments provide read-only cache directories under $HOME
        if path.exists() {
            let probe = path.join(".write_probe");
            match std::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
            {
                Ok(_) => {
                    let _ = std::fs::remove_file(&probe);
                    return Ok(path);
                }
                Err(_) => continue,
            }
        }
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }
    Err(Error::configuration(
        "Failed to determine a writable cache directory",
    ))
}

/// Resolve the default cache root from the environment
pub fn default_cache_root() -> Result<PathBuf> {
    let non_empty = |key: &str| {
        std::env::var(key)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    };
    cache_root_from_inputs(CacheInputs {
        timebox_cache_dir: non_empty("TIMEBOX_CACHE_DIR"),
        xdg_cache_home: non_empty("XDG_CACHE_HOME"),
        os_cache_dir: cache_dir(),
        home_dir: home_dir(),
        temp_dir: std::env::temp_dir(),
    })
}
