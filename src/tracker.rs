//! Outstanding-work tracker.
//!
//! Counts work that has been registered but not yet completed, and lets a
//! waiter block until that count reaches zero. The count is only reachable
//! through `register`, `complete` and `drain`; there is no raw access.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, trace};

use crate::error::{Error, Result};

/// Process-wide counter of not-yet-completed work items.
///
/// Cheap to clone; all clones share one counter.
#[derive(Debug, Clone)]
pub struct Tracker {
    count: Arc<watch::Sender<usize>>,
}

impl Tracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Add `n` outstanding units. `n` must be at least 1.
    pub fn register(&self, n: usize) -> Result<()> {
        if n == 0 {
            error!("register called with zero units");
            return Err(Error::InvalidRegistration);
        }
        self.count.send_modify(|count| {
            *count += n;
            trace!(added = n, outstanding = *count, "work registered");
        });
        Ok(())
    }

    /// Mark one unit as finished, returning how many remain.
    ///
    /// Completing with nothing outstanding is a dispatch bug: the count is
    /// left at zero and `Error::UnmatchedComplete` is returned.
    pub fn complete(&self) -> Result<usize> {
        let mut remaining = None;
        self.count.send_if_modified(|count| match count.checked_sub(1) {
            Some(n) => {
                *count = n;
                remaining = Some(n);
                // Only waiters on zero care about the value.
                n == 0
            }
            None => false,
        });
        match remaining {
            Some(n) => {
                trace!(outstanding = n, "work completed");
                Ok(n)
            }
            None => {
                error!("complete called with no outstanding work");
                Err(Error::UnmatchedComplete)
            }
        }
    }

    /// Wait until the outstanding count is zero.
    ///
    /// Returns immediately if nothing is outstanding. Registrations racing
    /// with the wait are counted; callers that need "nothing new after drain"
    /// must stop registering before calling this.
    pub async fn drain(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Snapshot of the outstanding count.
    pub fn outstanding(&self) -> usize {
        *self.count.borrow()
    }

    /// Register `n` units and hand back one `Completion` per unit.
    pub fn enlist(&self, n: usize) -> Result<Vec<Completion>> {
        self.register(n)?;
        Ok((0..n)
            .map(|_| Completion {
                tracker: self.clone(),
                pending: true,
            })
            .collect())
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Obligation to complete exactly one registered unit.
///
/// Completes on `finish` or, failing that, on drop, so a unit that errors or
/// panics still releases its registration.
#[derive(Debug)]
#[must_use = "dropping a Completion immediately completes its unit"]
pub struct Completion {
    tracker: Tracker,
    pending: bool,
}

impl Completion {
    /// Complete the unit now, returning how many remain outstanding.
    pub fn finish(mut self) -> Result<usize> {
        self.pending = false;
        self.tracker.complete()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.pending {
            let _ = self.tracker.complete();
        }
    }
}
