//! Result mailbox between supervisors and the consumer loop
//!
//! Any number of supervisor tasks post into the mailbox through cloned
//! [`MailboxSender`]s; a single consumer owns the [`Mailbox`] and drains it.
//! Posting never blocks. Draining returns every result delivered so far and
//! each result is returned exactly once.

use crate::types::ExecutionResult;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, warn};

/// Posting half of the mailbox, cloned into every supervisor task
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: UnboundedSender<ExecutionResult>,
}

impl MailboxSender {
    /// Deliver a result. Returns `false` when the consumer is gone.
    pub fn post(&self, result: ExecutionResult) -> bool {
        let name = result.name.display().to_string();
        match self.tx.send(result) {
            Ok(()) => {
                debug!(artifact = %name, "Result posted");
                true
            }
            Err(_) => {
                warn!(artifact = %name, "Result dropped: mailbox closed");
                false
            }
        }
    }
}

/// Consuming half of the mailbox
#[derive(Debug)]
pub struct Mailbox {
    rx: UnboundedReceiver<ExecutionResult>,
}

impl Mailbox {
    /// Create a connected mailbox and sender
    #[must_use]
    pub fn channel() -> (Self, MailboxSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, MailboxSender { tx })
    }

    /// Take every result that is ready now, without waiting
    pub fn drain_all(&mut self) -> Vec<ExecutionResult> {
        let mut results = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(result) => results.push(result),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        results
    }
}
