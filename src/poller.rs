//! Status change detection.
//!
//! The poller samples the engine on a fixed tick and publishes a snapshot
//! only when it differs from the last one published. Connected controllers
//! therefore see one line per change, not one per tick.
//!
//! # Example
//!
//! ```ignore
//! let poller = StatusPoller::new(engine.clone(), Duration::from_millis(250));
//! let (status_tx, _) = broadcast::channel(16);
//! let resample = Arc::new(Notify::new());
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! tokio::spawn(poller.run(status_tx.clone(), resample.clone(), shutdown_rx));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::automation::AutomationEngine;
use crate::control::protocol::StatusSnapshot;

/// Default tick.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Samples engine status and reports changes.
pub struct StatusPoller {
    engine: Arc<AutomationEngine>,
    interval: Duration,
    /// Last published snapshot; starts as all-unknown.
    previous: StatusSnapshot,
}

impl StatusPoller {
    /// Create a poller.
    pub fn new(engine: Arc<AutomationEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            previous: StatusSnapshot::default(),
        }
    }

    /// The last published snapshot.
    pub fn previous(&self) -> StatusSnapshot {
        self.previous
    }

    /// Sample once. Returns the new snapshot if it differs from the previous.
    pub fn poll_once(&mut self) -> Option<StatusSnapshot> {
        let current = self.engine.snapshot();
        if current == self.previous {
            trace!("Status unchanged: {}", current);
            return None;
        }
        debug!("Status changed: {} -> {}", self.previous, current);
        self.previous = current;
        Some(current)
    }

    /// Run until shutdown, publishing changes on `status_tx`.
    ///
    /// A notification on `resample` triggers an immediate sample without
    /// waiting for the next tick.
    pub async fn run(
        mut self,
        status_tx: broadcast::Sender<StatusSnapshot>,
        resample: Arc<Notify>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = resample.notified() => {
                    trace!("Re-sample requested");
                }
                _ = shutdown_rx.changed() => {
                    debug!("Status poller received shutdown signal");
                    break;
                }
            }

            if let Some(snapshot) = self.poll_once() {
                // No receivers just means no controller is connected.
                let _ = status_tx.send(snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{AutomationSettings, ControlLabels, SimulatedProvider};
    use crate::control::protocol::{AudioStatus, VideoStatus};

    fn setup() -> (Arc<SimulatedProvider>, Arc<AutomationEngine>) {
        let sim = Arc::new(SimulatedProvider::meeting(
            &ControlLabels::default(),
            "Zoom Meeting",
        ));
        let engine = Arc::new(AutomationEngine::new(
            sim.clone(),
            AutomationSettings::default(),
        ));
        (sim, engine)
    }

    #[test]
    fn test_reports_only_changes() {
        let (sim, engine) = setup();
        let mut poller = StatusPoller::new(engine, DEFAULT_POLL_INTERVAL);

        let first = poller.poll_once().unwrap();
        assert_eq!(first.audio_status, AudioStatus::Unmuted);
        assert_eq!(first.video_status, VideoStatus::On);
        assert!(first.meeting_active);

        assert_eq!(poller.poll_once(), None);
        assert_eq!(poller.poll_once(), None);

        let video = sim.find_by_title("Stop video").unwrap();
        sim.set_title(video, "Start video");
        let changed = poller.poll_once().unwrap();
        assert_eq!(changed.video_status, VideoStatus::Off);
        assert_eq!(poller.previous(), changed);
    }

    #[test]
    fn test_no_app_matches_initial_snapshot() {
        let sim = Arc::new(SimulatedProvider::new());
        let engine = Arc::new(AutomationEngine::new(sim, AutomationSettings::default()));
        let mut poller = StatusPoller::new(engine, DEFAULT_POLL_INTERVAL);

        assert_eq!(poller.poll_once(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_broadcasts_changes() {
        let (sim, engine) = setup();
        let poller = StatusPoller::new(engine, DEFAULT_POLL_INTERVAL);
        let (status_tx, mut status_rx) = broadcast::channel(16);
        let resample = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(poller.run(status_tx, resample.clone(), shutdown_rx));

        let first = status_rx.recv().await.unwrap();
        assert_eq!(first.audio_status, AudioStatus::Unmuted);

        let audio = sim.find_by_title("Mute audio").unwrap();
        sim.set_title(audio, "Unmute audio");
        resample.notify_one();

        let second = status_rx.recv().await.unwrap();
        assert_eq!(second.audio_status, AudioStatus::Muted);

        // Several ticks with no change produce nothing.
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 4).await;
        assert!(status_rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
