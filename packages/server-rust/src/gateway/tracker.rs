//! Accounting for broker handles that are closed in the background.
//!
//! A scope cancelled mid-operation cannot close its handle in place, so its
//! `Drop` spawns the close. Each such task holds a [`ReleaseGuard`] until the
//! close finishes, and shutdown waits on [`ReleaseTracker::wait_idle`] so the
//! process does not exit with a client half-closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts background handle closes that have not finished yet.
#[derive(Debug, Clone, Default)]
pub struct ReleaseTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    pending: AtomicU64,
    idle: Notify,
}

impl ReleaseTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Background closes still running.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Registers one background close. Dropping the guard marks it finished.
    #[must_use]
    pub fn track(&self) -> ReleaseGuard {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        ReleaseGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Resolves once no background close is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a close finishing in between still wakes us.
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Held by a background close task for as long as the close runs.
#[derive(Debug)]
pub struct ReleaseGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
