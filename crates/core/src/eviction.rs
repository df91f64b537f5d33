//! Cache eviction policy
//!
//! Keeps the cache store under its byte ceiling. Stages run cheapest and least
//! destructive first and each one re-checks the size before handing over:
//!
//! 1. check the size and stop if the store is below the ceiling
//! 2. age sweep: remove everything older than the retention window
//! 3. oldest-first purge: remove the oldest entry directory, up to a bounded
//!    number of attempts
//! 4. full purge: remove every entry
//!
//! The ceiling is soft. Builders may write concurrently, so the bound on stage 3
//! guarantees termination and stage 4 guarantees the ceiling.

use crate::config::HarnessConfig;
use crate::store::CacheStore;
use crate::Result;
use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Stage at which an eviction run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The store was already below the ceiling
    WithinLimit,
    /// The age sweep was enough
    AgeSweep,
    /// Removing oldest entries was enough
    OldestFirst,
    /// Everything was removed
    FullPurge,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithinLimit => write!(f, "within limit"),
            Self::AgeSweep => write!(f, "age sweep"),
            Self::OldestFirst => write!(f, "oldest-first purge"),
            Self::FullPurge => write!(f, "full purge"),
        }
    }
}

/// Summary of one eviction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Stage that restored the ceiling
    pub stage: Stage,
    /// Store size when the run started
    pub size_before: u64,
    /// Store size when the run ended
    pub size_after: u64,
    /// Entries and files removed across all stages
    pub removed: usize,
    /// Oldest-first deletions attempted
    pub purge_attempts: u32,
}

/// Staged size-bounded eviction over a cache store
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    max_bytes: u64,
    retention: Duration,
    max_attempts: u32,
}

impl EvictionPolicy {
    /// Create a policy
    #[must_use]
    pub const fn new(max_bytes: u64, retention: Duration, max_attempts: u32) -> Self {
        Self {
            max_bytes,
            retention,
            max_attempts,
        }
    }

    /// Policy values taken from the harness configuration
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            config.max_store_bytes,
            config.retention(),
            config.max_purge_attempts,
        )
    }

    /// Byte ceiling
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Measure the store and report whether it is at or above the ceiling
    fn too_heavy(&self, store: &CacheStore) -> Result<(bool, u64)> {
        let size = store.size()?;
        let heavy = size >= self.max_bytes;
        if heavy {
            info!(
                size,
                limit = self.max_bytes,
                root = %store.root().display(),
                "Cache store is larger than its limit"
            );
        } else {
            debug!(size, limit = self.max_bytes, "Cache store within limit");
        }
        Ok((heavy, size))
    }

    /// Run the full eviction sequence
    pub fn run(&self, store: &CacheStore) -> Result<EvictionReport> {
        let (heavy, size_before) = self.too_heavy(store)?;
        let mut report = EvictionReport {
            stage: Stage::WithinLimit,
            size_before,
            size_after: size_before,
            removed: 0,
            purge_attempts: 0,
        };
        if !heavy {
            return Ok(report);
        }

        // Stage 2: age sweep
        info!(
            retention_minutes = self.retention.num_minutes(),
            "Removing cache files older than the retention window"
        );
        let sweep = store.delete_older_than(self.retention)?;
        report.removed += sweep.files_removed + sweep.dirs_removed;
        let (heavy, size) = self.too_heavy(store)?;
        report.size_after = size;
        if !heavy {
            report.stage = Stage::AgeSweep;
            return Ok(report);
        }

        // Stage 3: bounded oldest-first purge
        while report.purge_attempts < self.max_attempts {
            report.purge_attempts += 1;
            let entries = store.entries_by_age()?;
            let Some(oldest) = entries.first() else {
                debug!("No entry directories left to purge");
                break;
            };
            info!(entry = %oldest.path.display(), "Removing the oldest cache entry");
            match store.delete_entry(&oldest.path) {
                Ok(()) => report.removed += 1,
                Err(e) => warn!(entry = %oldest.path.display(), "Failed to remove cache entry: {e}"),
            }

            let (heavy, size) = self.too_heavy(store)?;
            report.size_after = size;
            if !heavy {
                report.stage = Stage::OldestFirst;
                return Ok(report);
            }
        }

        // Stage 4: full purge
        warn!(
            attempts = report.purge_attempts,
            "Cache store still over its limit; removing every entry"
        );
        report.removed += store.purge_all()?;
        report.size_after = store.size()?;
        report.stage = Stage::FullPurge;
        info!(size = report.size_after, "Cache store purged");
        Ok(report)
    }
}
