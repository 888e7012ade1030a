//! Periodic scan loop: frame -> matcher -> published state

use super::recognizer::RecognizerCore;
use super::sources::FrameSource;
use super::types::RecognitionEvent;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Counts consecutive missing frames and decides when to escalate.
#[derive(Debug, Clone)]
pub struct MissTracker {
    threshold: u32,
    consecutive: u32,
    escalated: bool,
}

impl MissTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
            escalated: false,
        }
    }

    /// Record a missing frame. Returns the miss count when it reaches the
    /// threshold or another multiple of it.
    pub fn record_miss(&mut self) -> Option<u32> {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.threshold > 0 && self.consecutive % self.threshold == 0 {
            self.escalated = true;
            return Some(self.consecutive);
        }
        None
    }

    /// Record a delivered frame. Returns the previous miss count if an
    /// escalation had been logged.
    pub fn record_frame(&mut self) -> Option<u32> {
        let recovered = self.escalated.then_some(self.consecutive);
        self.consecutive = 0;
        self.escalated = false;
        recovered
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Handle to a running scan loop
pub(crate) struct ScanHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScanHandle {
    pub(crate) fn spawn<S>(core: Arc<RecognizerCore>, source: Arc<S>, generation: u64) -> Self
    where
        S: FrameSource + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_scan_loop(core, source, generation, shutdown_rx));
        Self { shutdown, task }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop to exit. Does not wait for it.
    pub(crate) fn cancel(self) {
        let _ = self.shutdown.send(true);
    }
}

async fn run_scan_loop<S>(
    core: Arc<RecognizerCore>,
    source: Arc<S>,
    generation: u64,
    mut shutdown: watch::Receiver<bool>,
) where
    S: FrameSource + 'static,
{
    let config = core.config();
    let mut ticker = tokio::time::interval(config.scan_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut misses = MissTracker::new(config.frame_miss_warn_threshold);
    let mut scans: u64 = 0;

    log::info!(
        "🔍 Scan loop started (interval: {}ms)",
        config.scan_interval_ms
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = source.latest_frame() => frame,
        };

        let Some(frame) = frame else {
            if let Some(count) = misses.record_miss() {
                log::warn!("⚠️ No frame from source for {} consecutive scans", count);
                core.emit(RecognitionEvent::FramesMissing(count));
            }
            continue;
        };
        if let Some(count) = misses.record_frame() {
            log::info!("Frames resumed after {} missed scans", count);
        }

        let state = core.scan_frame(generation, frame).await;
        scans += 1;
        if config.debug_enabled {
            log::debug!("Scan #{}: {}", scans, state);
        }
    }

    log::info!("🔍 Scan loop ended after {} scans", scans);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_tracker_escalates_at_threshold() {
        let mut tracker = MissTracker::new(3);
        assert_eq!(tracker.record_miss(), None);
        assert_eq!(tracker.record_miss(), None);
        assert_eq!(tracker.record_miss(), Some(3));
        assert_eq!(tracker.record_miss(), None);
        assert_eq!(tracker.record_miss(), None);
        assert_eq!(tracker.record_miss(), Some(6));
        assert_eq!(tracker.consecutive(), 6);
    }

    #[test]
    fn test_miss_tracker_resets_on_frame() {
        let mut tracker = MissTracker::new(2);
        tracker.record_miss();
        assert_eq!(tracker.record_frame(), None);
        assert_eq!(tracker.consecutive(), 0);

        tracker.record_miss();
        tracker.record_miss();
        assert_eq!(tracker.record_frame(), Some(2));
        assert_eq!(tracker.record_frame(), None);
    }

    #[test]
    fn test_miss_tracker_zero_threshold_never_escalates() {
        let mut tracker = MissTracker::new(0);
        for _ in 0..100 {
            assert_eq!(tracker.record_miss(), None);
        }
    }
}
