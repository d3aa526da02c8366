//! Read-only view of a session for the transport UI

use dualtrack_core::{format_timestamp, FormatSelection, MediaRef, PlaybackState, TrackPair};
use dualtrack_diagnostics::SyncStats;
use serde::{Deserialize, Serialize};

/// Everything a transport UI renders, published after every session step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Transport state
    pub state: PlaybackState,
    /// Master clock position, or the target while seeking/switching
    pub current_time: f64,
    /// Media duration, 0 while unknown
    pub duration: f64,
    /// Buffered share of the video track in `[0, 1]`
    pub buffered_fraction: f64,
    /// Audio volume in `[0, 1]`
    pub volume: f64,
    /// Whether the user muted audio
    pub is_muted: bool,
    /// Active variant per track
    pub active_formats: FormatSelection,
    /// Transient loading indicator: stalls and in-flight transactions
    pub is_loading: bool,
    /// User-visible message of the last unrecoverable error
    pub error: Option<String>,
    /// Item loaded in the session
    pub media_ref: Option<MediaRef>,
    /// Locator URL assigned to each track
    pub sources: TrackPair<Option<String>>,
    /// Synchronization counters
    pub stats: SyncStats,
}

impl PlayerSnapshot {
    /// Snapshot of a session that has nothing loaded
    pub fn idle(volume: f64, is_muted: bool) -> Self {
        Self {
            state: PlaybackState::Idle,
            current_time: 0.0,
            duration: 0.0,
            buffered_fraction: 0.0,
            volume,
            is_muted,
            active_formats: FormatSelection::default(),
            is_loading: false,
            error: None,
            media_ref: None,
            sources: TrackPair::default(),
            stats: SyncStats::default(),
        }
    }

    /// Playback progress in `[0, 1]`, 0 while the duration is unknown
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Serialize for bridging to a UI process
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Display for PlayerSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} / {}",
            self.state,
            format_timestamp(self.current_time),
            format_timestamp(self.duration)
        )?;
        if self.is_muted {
            write!(f, " (muted)")?;
        } else {
            write!(f, " (vol {:.0}%)", self.volume * 100.0)?;
        }
        if let Some(error) = &self.error {
            write!(f, " error: {}", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_snapshot() {
        let snapshot = PlayerSnapshot::idle(0.8, false);
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.progress(), 0.0);
        assert_eq!(snapshot.to_string(), "Idle 0:00 / 0:00 (vol 80%)");
    }

    #[test]
    fn test_progress_and_display() {
        let snapshot = PlayerSnapshot {
            state: PlaybackState::Playing,
            current_time: 75.0,
            duration: 300.0,
            is_muted: true,
            ..PlayerSnapshot::idle(1.0, false)
        };
        assert_eq!(snapshot.progress(), 0.25);
        assert_eq!(snapshot.to_string(), "Playing 1:15 / 5:00 (muted)");
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = PlayerSnapshot::idle(1.0, false).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["state"], "Idle");
        assert_eq!(value["sources"]["video"], serde_json::Value::Null);
    }
}
