//! On-disk cache store
//!
//! Every snippet gets one entry directory named after its fingerprint:
//!
//! ```text
//! <cache_root>/
//!   <fingerprint>/
//!     <fingerprint>.<ext>   (source)
//!     <fingerprint>         (built artifact)
//! ```
//!
//! [`CacheStore`] is also the filesystem service used by the eviction policy.
//! Size, age and ordering are computed from native metadata, never by spawning
//! external utilities.

use crate::fingerprint::{Fingerprint, Snippet};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Resolved locations of a single cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    /// Fingerprint the entry is keyed by
    pub fingerprint: Fingerprint,
    /// `<root>/<fingerprint>`
    pub entry_dir: PathBuf,
    /// `<root>/<fingerprint>/<fingerprint>.<ext>`
    pub source_file: PathBuf,
    /// `<root>/<fingerprint>/<fingerprint>` (plus the platform executable suffix)
    pub artifact: PathBuf,
}

impl EntryPaths {
    /// Resolve the paths of an entry. Pure; touches nothing on disk.
    #[must_use]
    pub fn resolve(root: &Path, fingerprint: &Fingerprint, source_extension: &str) -> Self {
        let name = fingerprint.as_hex();
        let entry_dir = root.join(name);
        let source_file = entry_dir.join(format!("{name}.{source_extension}"));
        let artifact = entry_dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
        Self {
            fingerprint: fingerprint.clone(),
            entry_dir,
            source_file,
            artifact,
        }
    }
}

/// An entry directory together with its last modification time
#[derive(Debug, Clone)]
pub struct AgedEntry {
    /// Path to the entry directory
    pub path: PathBuf,
    /// Last modification time of the directory itself
    pub modified: DateTime<Utc>,
}

/// What an age sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Regular files removed individually
    pub files_removed: usize,
    /// Directories removed together with their contents
    pub dirs_removed: usize,
    /// Bytes released
    pub bytes_freed: u64,
}

/// Root directory holding all cache entries
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Create a store rooted at the given directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the entry paths for a fingerprint inside this store
    #[must_use]
    pub fn paths(&self, fingerprint: &Fingerprint, source_extension: &str) -> EntryPaths {
        EntryPaths::resolve(&self.root, fingerprint, source_extension)
    }

    /// Whether a path exists on disk
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Create the store root if it is missing
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::io(e, &self.root, "create_dir_all"))
    }

    /// Create the directory of an entry. Idempotent.
    pub fn create_entry_dir(&self, paths: &EntryPaths) -> Result<()> {
        fs::create_dir_all(&paths.entry_dir)
            .map_err(|e| Error::io(e, &paths.entry_dir, "create_dir_all"))
    }

    /// Write the snippet bytes to the entry's source file
    pub fn write_source(&self, paths: &EntryPaths, snippet: &Snippet) -> Result<()> {
        debug!(path = %paths.source_file.display(), "Writing snippet source");
        fs::write(&paths.source_file, snippet.as_bytes())
            .map_err(|e| Error::io(e, &paths.source_file, "write"))
    }

    /// Total size in bytes of every file under the store. A missing root is empty.
    pub fn size(&self) -> Result<u64> {
        if !self.root.exists() {
            return Ok(0);
        }
        Ok(directory_size(&self.root))
    }

    /// Delete every file and directory under the store whose modification time
    /// is older than `age`. Directories are removed with their contents.
    pub fn delete_older_than(&self, age: Duration) -> Result<SweepStats> {
        let mut stats = SweepStats::default();
        if !self.root.exists() {
            return Ok(stats);
        }

        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut walker = WalkDir::new(&self.root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable cache path during sweep: {e}");
                    continue;
                }
            };
            let Some(modified) = entry.metadata().ok().and_then(|m| modified_at(&m)) else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            let path = entry.path();
            if entry.file_type().is_dir() {
                let bytes = directory_size(path);
                match fs::remove_dir_all(path) {
                    Ok(()) => {
                        stats.dirs_removed += 1;
                        stats.bytes_freed += bytes;
                        walker.skip_current_dir();
                    }
                    Err(e) => warn!(path = %path.display(), "Failed to remove stale directory: {e}"),
                }
            } else {
                let bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
                match fs::remove_file(path) {
                    Ok(()) => {
                        stats.files_removed += 1;
                        stats.bytes_freed += bytes;
                    }
                    Err(e) => warn!(path = %path.display(), "Failed to remove stale file: {e}"),
                }
            }
        }

        debug!(
            files = stats.files_removed,
            dirs = stats.dirs_removed,
            bytes = stats.bytes_freed,
            "Age sweep finished"
        );
        Ok(stats)
    }

    /// Entry directories directly under the root, oldest first
    pub fn entries_by_age(&self) -> Result<Vec<AgedEntry>> {
        let mut entries = Vec::new();
        if !self.root.exists() {
            return Ok(entries);
        }

        let read_dir =
            fs::read_dir(&self.root).map_err(|e| Error::io(e, &self.root, "read_dir"))?;
        for entry in read_dir {
            let entry = entry.map_err(|e| Error::io(e, &self.root, "read_dir_entry"))?;
            // Entries can vanish while we list them
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let Some(modified) = modified_at(&metadata) else {
                continue;
            };
            entries.push(AgedEntry {
                path: entry.path(),
                modified,
            });
        }

        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    /// Remove one entry directory and everything in it
    pub fn delete_entry(&self, path: &Path) -> Result<()> {
        if path.parent() != Some(self.root.as_path()) {
            return Err(Error::configuration(format!(
                "{} is not a cache entry of {}",
                path.display(),
                self.root.display()
            )));
        }
        fs::remove_dir_all(path).map_err(|e| Error::io(e, path, "remove_dir_all"))
    }

    /// Remove every child of the root, keeping the root itself
    pub fn purge_all(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let read_dir =
            fs::read_dir(&self.root).map_err(|e| Error::io(e, &self.root, "read_dir"))?;
        for entry in read_dir {
            let entry = entry.map_err(|e| Error::io(e, &self.root, "read_dir_entry"))?;
            let path = entry.path();
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            let result = if is_dir {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(e, &path, "remove")),
            }
        }
        Ok(removed)
    }
}

/// Calculate total size of the regular files below `path`
fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn modified_at(metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}
