//! Harness: submit snippets, collect results
//!
//! Ties the build cache, the supervisor and the mailbox together. A submission
//! returns as soon as the artifact has been launched; its result shows up in
//! the mailbox later. Supervisor tasks live in a [`JoinSet`] so a process
//! control fault is reported through [`Harness::reap`] instead of being lost.

use crate::builder::Builder;
use crate::config::HarnessConfig;
use crate::eviction::{EvictionPolicy, EvictionReport};
use crate::fingerprint::Snippet;
use crate::mailbox::{Mailbox, MailboxSender};
use crate::store::CacheStore;
use crate::supervisor::{Launched, budget_from_millis};
use crate::toolchain::Toolchain;
use crate::types::{ExecutionResult, Submission};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

/// Owner of the cache, the running supervisors and the result mailbox
#[derive(Debug)]
pub struct Harness {
    config: HarnessConfig,
    builder: Builder,
    policy: EvictionPolicy,
    mailbox: Mailbox,
    sender: MailboxSender,
    tasks: JoinSet<Result<()>>,
}

impl Harness {
    /// Validate `config`, create the cache root and wire up a harness
    pub fn new(config: HarnessConfig, toolchain: Arc<dyn Toolchain>) -> Result<Self> {
        config.validate()?;
        let store = CacheStore::new(config.resolved_cache_root()?);
        store.ensure_root()?;
        info!(root = %store.root().display(), "Cache store ready");

        let (mailbox, sender) = Mailbox::channel();
        Ok(Self {
            policy: EvictionPolicy::from_config(&config),
            builder: Builder::new(store, toolchain),
            config,
            mailbox,
            sender,
            tasks: JoinSet::new(),
        })
    }

    /// Configuration the harness was created with
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The cache store
    #[must_use]
    pub const fn store(&self) -> &CacheStore {
        self.builder.store()
    }

    /// Build (or reuse) the artifact for `snippet` and launch it under a
    /// deadline of `expected_millis`
    ///
    /// Build and spawn failures are returned here and produce no result.
    #[instrument(skip(self, snippet), fields(bytes = snippet.as_bytes().len()))]
    pub async fn submit(&mut self, snippet: &Snippet, expected_millis: f64) -> Result<Submission> {
        budget_from_millis(expected_millis)?;

        let fingerprint = snippet.fingerprint();
        let outcome = self.builder.ensure_built(&fingerprint, snippet).await?;
        let launched = Launched::start(&outcome.paths, expected_millis)?;
        let pid = launched.pid();

        self.tasks.spawn(launched.supervise(self.sender.clone()));
        debug!(
            fingerprint = %fingerprint.short(),
            in_flight = self.tasks.len(),
            "Supervisor started"
        );

        Ok(Submission {
            fingerprint,
            artifact: outcome.paths.artifact,
            cache_hit: outcome.cache_hit,
            pid,
        })
    }

    /// Every result delivered since the last drain
    pub fn drain_results(&mut self) -> Vec<ExecutionResult> {
        self.mailbox.drain_all()
    }

    /// Collect finished supervisor tasks
    ///
    /// Returns the first fault found. Faults are fatal: the harness can no
    /// longer guarantee that timed-out processes are gone.
    pub fn reap(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.try_join_next() {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(join) => return Err(Error::task(join.to_string())),
            }
        }
        Ok(())
    }

    /// Wait until every launched execution has posted its result
    pub async fn wait_idle(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(join) => return Err(Error::task(join.to_string())),
            }
        }
        Ok(())
    }

    /// Supervisors that have not finished yet
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Policy used by [`Harness::evict`]
    #[must_use]
    pub const fn eviction_policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Run the eviction policy over the cache store
    ///
    /// Blocking filesystem work; callers on a runtime should move it to
    /// `spawn_blocking` with a clone of the store and policy.
    pub fn evict(&self) -> Result<EvictionReport> {
        self.policy.run(self.store())
    }
}
