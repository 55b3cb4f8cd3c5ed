//! Server lifecycle and shutdown coordination.
//!
//! The stdio loop handles one frame at a time and only looks at the shutdown
//! signal between frames, so no call is ever cut short by shutdown itself.
//! What can still be running when the loop stops are broker handles whose
//! scope was cancelled by the pipeline timeout and that are being closed in
//! the background. Draining waits for those.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::gateway::ReleaseTracker;

/// Lifecycle state: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// stdin not read yet.
    Starting,
    /// The stdio loop is reading frames.
    Ready,
    /// No new frames are read; background handle closes may still run.
    Draining,
    /// Every broker handle has been released.
    Stopped,
}

/// Coordinates the signal handler, the stdio loop and broker handle release.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    health_state: ArcSwap<HealthState>,
    releases: ReleaseTracker,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state that drains `releases`.
    #[must_use]
    pub fn new(releases: ReleaseTracker) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            health_state: ArcSwap::from_pointee(HealthState::Starting),
            releases,
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// Receiver that flips to `true` once shutdown is triggered. A receiver
    /// created after the trigger already reads `true`.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves to `Draining` and wakes every receiver. Idempotent.
    pub fn trigger_shutdown(&self) {
        self.health_state.store(Arc::new(HealthState::Draining));
        self.shutdown_signal.send_replace(true);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Background handle closes not yet finished.
    #[must_use]
    pub fn pending_releases(&self) -> u64 {
        self.releases.pending()
    }

    /// Waits up to `timeout` for background handle closes to finish.
    ///
    /// Returns `true` and moves to `Stopped` once none are pending; returns
    /// `false` and stays `Draining` if the timeout expires first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        if tokio::time::timeout(timeout, self.releases.wait_idle())
            .await
            .is_err()
        {
            return false;
        }
        self.health_state.store(Arc::new(HealthState::Stopped));
        true
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new(ReleaseTracker::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_starting_ready_draining() {
        let controller = ShutdownController::default();
        assert_eq!(controller.health_state(), HealthState::Starting);

        controller.set_ready();
        assert_eq!(controller.health_state(), HealthState::Ready);

        controller.trigger_shutdown();
        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Draining);
    }

    #[tokio::test]
    async fn shutdown_receiver_notified() {
        let controller = ShutdownController::default();
        let mut rx = controller.shutdown_receiver();
        assert!(!*rx.borrow());

        controller.trigger_shutdown();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn late_receiver_sees_earlier_trigger() {
        let controller = ShutdownController::default();
        controller.trigger_shutdown();
        let rx = controller.shutdown_receiver();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn nothing_pending_stops_immediately() {
        let controller = ShutdownController::default();
        controller.set_ready();
        controller.trigger_shutdown();

        assert!(controller.wait_for_drain(Duration::from_secs(1)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_background_close() {
        let releases = ReleaseTracker::new();
        let controller = ShutdownController::new(releases.clone());
        controller.set_ready();

        let guard = releases.track();
        assert_eq!(controller.pending_releases(), 1);
        controller.trigger_shutdown();

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(2)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
        assert_eq!(controller.pending_releases(), 0);
        closer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_on_stuck_close() {
        let releases = ReleaseTracker::new();
        let controller = ShutdownController::new(releases.clone());
        let _stuck = releases.track();
        controller.trigger_shutdown();

        assert!(!controller.wait_for_drain(Duration::from_millis(50)).await);
        assert_eq!(controller.health_state(), HealthState::Draining);
        assert_eq!(controller.pending_releases(), 1);
    }
}
