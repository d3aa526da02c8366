//! Synchronization statistics for a playback session

use dualtrack_core::TrackKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// Number of drift measurements kept for the rolling average
const DRIFT_WINDOW: usize = 64;

/// Counters describing how hard the session had to work to stay in sync
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Reconcile ticks that measured drift
    pub drift_samples: u64,
    /// Times the follower was re-seeked to the master
    pub drift_corrections: u64,
    /// Largest absolute drift measured (seconds)
    pub max_drift: f64,
    /// Most recent absolute drift measured (seconds)
    pub last_drift: f64,
    /// Mean absolute drift over the recent window (seconds)
    pub mean_drift: f64,
    /// Stalls reported by the video track
    pub video_stalls: u64,
    /// Stalls reported by the audio track
    pub audio_stalls: u64,
    /// Stalls that lasted long enough to become fatal
    pub stall_escalations: u64,
    /// Completed seek transactions
    pub seeks: u64,
    /// Completed format switches
    pub format_switches: u64,
    /// Operations replaced by a newer one before completing
    pub superseded_operations: u64,
}

impl SyncStats {
    /// Total stalls across both tracks
    pub fn total_stalls(&self) -> u64 {
        self.video_stalls + self.audio_stalls
    }

    /// Serialize for log shipping or a debug overlay
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    stats: SyncStats,
    window: VecDeque<f64>,
}

/// Collects [`SyncStats`] for one session
///
/// Recording takes `&self` so the monitor can be shared between the session
/// task and whoever reads the statistics.
#[derive(Debug)]
pub struct SyncMonitor {
    session_id: Uuid,
    state: Mutex<MonitorState>,
}

impl SyncMonitor {
    /// Create a monitor with a fresh session id
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Id used to correlate log lines of one session
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Record a drift measurement between the two playheads
    pub fn record_drift(&self, drift: f64) {
        let drift = drift.abs();
        let mut state = self.state.lock();
        if state.window.len() == DRIFT_WINDOW {
            state.window.pop_front();
        }
        state.window.push_back(drift);
        let mean = state.window.iter().sum::<f64>() / state.window.len() as f64;

        let stats = &mut state.stats;
        stats.drift_samples += 1;
        stats.last_drift = drift;
        stats.mean_drift = mean;
        if drift > stats.max_drift {
            stats.max_drift = drift;
        }
    }

    /// Record that the follower was re-aligned to the master
    pub fn record_correction(&self, drift: f64) {
        let mut state = self.state.lock();
        state.stats.drift_corrections += 1;
        debug!(
            "📊 [{}] Drift correction #{} ({:.3}s)",
            self.session_id, state.stats.drift_corrections, drift
        );
    }

    /// Record a stall on a track
    pub fn record_stall(&self, track: TrackKind) {
        let mut state = self.state.lock();
        match track {
            TrackKind::Video => state.stats.video_stalls += 1,
            TrackKind::Audio => state.stats.audio_stalls += 1,
        }
    }

    /// Record a stall that exceeded the stall timeout
    pub fn record_stall_escalation(&self) {
        self.state.lock().stats.stall_escalations += 1;
    }

    /// Record a completed seek
    pub fn record_seek(&self) {
        self.state.lock().stats.seeks += 1;
    }

    /// Record a completed format switch
    pub fn record_format_switch(&self) {
        self.state.lock().stats.format_switches += 1;
    }

    /// Record a superseded operation
    pub fn record_superseded(&self) {
        self.state.lock().stats.superseded_operations += 1;
    }

    /// Current statistics
    pub fn snapshot(&self) -> SyncStats {
        self.state.lock().stats.clone()
    }

    /// Clear all counters, keeping the session id
    pub fn reset(&self) {
        *self.state.lock() = MonitorState::default();
    }
}

impl Default for SyncMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_statistics() {
        let monitor = SyncMonitor::new();
        monitor.record_drift(0.05);
        monitor.record_drift(-0.25);
        monitor.record_drift(0.10);

        let stats = monitor.snapshot();
        assert_eq!(stats.drift_samples, 3);
        assert_eq!(stats.max_drift, 0.25);
        assert_eq!(stats.last_drift, 0.10);
        assert!((stats.mean_drift - 0.4 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_drift_window_is_bounded() {
        let monitor = SyncMonitor::new();
        monitor.record_drift(10.0);
        for _ in 0..DRIFT_WINDOW {
            monitor.record_drift(0.0);
        }
        let stats = monitor.snapshot();
        assert_eq!(stats.mean_drift, 0.0);
        assert_eq!(stats.max_drift, 10.0);
    }

    #[test]
    fn test_reset_keeps_session_id() {
        let monitor = SyncMonitor::new();
        let id = monitor.session_id();
        monitor.record_stall(TrackKind::Audio);
        monitor.record_stall(TrackKind::Video);
        assert_eq!(monitor.snapshot().total_stalls(), 2);

        monitor.reset();
        assert_eq!(monitor.snapshot(), SyncStats::default());
        assert_eq!(monitor.session_id(), id);
    }
}
