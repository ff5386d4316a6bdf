//! The single "current filter" shared by the pipeline and the UI

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{FilterPredicate, compile};
use crate::Result;

/// Holder of the currently active [`FilterPredicate`].
///
/// Exactly one predicate is current at any instant. Updates replace the whole
/// `Arc<FilterPredicate>` in one step, so readers take a snapshot without any
/// further locking and never see a partially applied filter. Clones share the
/// same slot.
#[derive(Clone)]
pub struct FilterSlot {
    tx: Arc<watch::Sender<Arc<FilterPredicate>>>,
}

impl FilterSlot {
    /// Create a slot holding `initial`.
    pub fn new(initial: FilterPredicate) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current predicate.
    pub fn current(&self) -> Arc<FilterPredicate> {
        Arc::clone(&self.tx.borrow())
    }

    /// Compile `expression` and make it current.
    ///
    /// On a syntax error the previous predicate stays active and the error is
    /// returned to the caller.
    pub fn install(&self, expression: &str) -> Result<Arc<FilterPredicate>> {
        let predicate = compile(expression).inspect_err(|e| {
            debug!(expression, error = %e, "Rejected filter expression");
        })?;
        Ok(self.replace(predicate))
    }

    /// Make an already compiled predicate current, returning it.
    pub fn replace(&self, predicate: FilterPredicate) -> Arc<FilterPredicate> {
        let predicate = Arc::new(predicate);
        let previous = self.tx.send_replace(Arc::clone(&predicate));
        info!(from = %previous, to = %predicate, "Filter changed");
        predicate
    }

    /// Watch for filter changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FilterPredicate>> {
        self.tx.subscribe()
    }
}

impl Default for FilterSlot {
    fn default() -> Self {
        Self::new(FilterPredicate::match_all())
    }
}
