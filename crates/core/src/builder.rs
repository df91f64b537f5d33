//! Build cache: make sure a snippet has a runnable artifact
//!
//! A cache hit is decided solely by the existence of the artifact file. The
//! toolchain only produces that file on success, so a failed build can never
//! be mistaken for a cached one.

use crate::fingerprint::{Fingerprint, Snippet};
use crate::store::CacheStore;
use crate::toolchain::Toolchain;
use crate::types::BuildOutcome;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces artifacts for snippets, compiling only on cache misses
#[derive(Clone)]
pub struct Builder {
    store: CacheStore,
    toolchain: Arc<dyn Toolchain>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("store", &self.store)
            .field("source_extension", &self.toolchain.source_extension())
            .finish()
    }
}

impl Builder {
    /// Create a builder over a store and toolchain
    #[must_use]
    pub fn new(store: CacheStore, toolchain: Arc<dyn Toolchain>) -> Self {
        Self { store, toolchain }
    }

    /// The store artifacts are written to
    #[must_use]
    pub const fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Ensure the artifact for `snippet` exists, building it on a cache miss
    pub async fn ensure_built(
        &self,
        fingerprint: &Fingerprint,
        snippet: &Snippet,
    ) -> Result<BuildOutcome> {
        let paths = self
            .store
            .paths(fingerprint, self.toolchain.source_extension());

        if self.store.exists(&paths.artifact) {
            debug!(fingerprint = %fingerprint.short(), "Build cache hit");
            return Ok(BuildOutcome {
                paths,
                cache_hit: true,
            });
        }

        info!(
            fingerprint = %fingerprint.short(),
            dir = %paths.entry_dir.display(),
            "Build cache miss; compiling snippet"
        );
        self.store
            .create_entry_dir(&paths)
            .map_err(|e| Error::build(fingerprint, e.to_string()))?;
        self.store
            .write_source(&paths, snippet)
            .map_err(|e| Error::build(fingerprint, e.to_string()))?;
        self.toolchain.compile(&paths).await?;

        if !self.store.exists(&paths.artifact) {
            return Err(Error::build(
                fingerprint,
                format!(
                    "toolchain reported success but {} was not produced",
                    paths.artifact.display()
                ),
            ));
        }

        info!(fingerprint = %fingerprint.short(), "Snippet built");
        Ok(BuildOutcome {
            paths,
            cache_hit: false,
        })
    }
}
