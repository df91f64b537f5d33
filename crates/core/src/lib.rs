//! Build-once, run-under-deadline harness for code snippets
//!
//! This crate provides the machinery behind the `timebox` command:
//! - A content-addressed build cache keyed by the SHA-256 of a snippet
//! - A staged eviction policy that keeps the cache under a byte ceiling
//! - A supervisor that runs an artifact and kills its process group on timeout
//! - A mailbox through which concurrent supervisors deliver their results
//!
//! # Overview
//!
//! A [`Harness`] takes a [`Snippet`] and an expected run time. The snippet is
//! compiled on a cache miss, then launched; the call returns right away with a
//! [`Submission`]. The [`ExecutionResult`] arrives in the mailbox once the
//! process exits or its deadline fires, and is drained by the caller.
//!
//! # Cache layout
//!
//! ```text
//! <root>/<fingerprint>/<fingerprint>.<ext>   source
//! <root>/<fingerprint>/<fingerprint>         artifact
//! ```
//!
//! The existence of the artifact is the only cache-hit criterion.

#![expect(
    clippy::missing_errors_doc,
    reason = "Errors are described on the Error enum variants"
)]

mod error;

pub mod builder;
pub mod config;
pub mod eviction;
pub mod fingerprint;
pub mod harness;
pub mod mailbox;
pub mod store;
pub mod supervisor;
pub mod toolchain;
pub mod types;

pub use error::{Error, Result};

pub use builder::Builder;
pub use config::{HarnessConfig, ToolchainConfig, default_cache_root};
pub use eviction::{EvictionPolicy, EvictionReport, Stage};
pub use fingerprint::{Fingerprint, Snippet, fingerprint};
pub use harness::Harness;
pub use mailbox::{Mailbox, MailboxSender};
pub use store::{CacheStore, EntryPaths};
pub use supervisor::{Launched, run_with_deadline};
pub use toolchain::{CommandToolchain, Toolchain};
pub use types::{BuildOutcome, ExecutionResult, Submission};
