//! Media element contract and the events elements report

use dualtrack_core::{PlayableLocator, TrackKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// Concrete decoder/output behind one track
///
/// Commands never fail synchronously: loading, buffering and decode faults
/// are reported later through the [`TrackEventSink`] handed over on `load`.
pub trait MediaElement: Send {
    /// Start fetching from a locator, replacing whatever was loaded
    fn load(&mut self, locator: &PlayableLocator, sink: TrackEventSink);

    /// Drop the current resource and stop reporting events
    fn unload(&mut self);

    /// Start or resume playback once data is available
    fn play(&mut self);

    /// Pause playback
    fn pause(&mut self);

    /// Move the playhead (seconds)
    fn seek(&mut self, position: f64);

    /// Current playhead (seconds)
    fn position(&self) -> f64;

    /// Enough data buffered at the playhead to play (`HAVE_FUTURE_DATA`)
    fn is_ready(&self) -> bool;

    /// Output volume in `[0, 1]`
    fn set_volume(&mut self, volume: f64);

    /// Mute output
    fn set_muted(&mut self, muted: bool);
}

/// Events a media element reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackEvent {
    /// Duration became known
    LoadedMetadata {
        /// Duration in seconds
        duration: f64,
    },
    /// First frame / first audio data of a new resource is available
    LoadedData,
    /// Enough data to play at the playhead
    CanPlay,
    /// Playback stopped for lack of data
    Waiting,
    /// A seek finished
    Seeked {
        /// Playhead after the seek
        position: f64,
    },
    /// Buffered range grew
    Progress {
        /// End of the buffered range containing the playhead (seconds)
        buffered_end: f64,
    },
    /// Periodic playhead report
    TimeUpdate {
        /// Playhead in seconds
        position: f64,
    },
    /// Playback reached the end of the resource
    Ended,
    /// Non-recoverable decode or network fault
    Error {
        /// Reason reported by the element
        reason: String,
    },
}

/// Discriminant of [`TrackEvent`], used as dispatch key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackEventKind {
    /// See [`TrackEvent::LoadedMetadata`]
    LoadedMetadata,
    /// See [`TrackEvent::LoadedData`]
    LoadedData,
    /// See [`TrackEvent::CanPlay`]
    CanPlay,
    /// See [`TrackEvent::Waiting`]
    Waiting,
    /// See [`TrackEvent::Seeked`]
    Seeked,
    /// See [`TrackEvent::Progress`]
    Progress,
    /// See [`TrackEvent::TimeUpdate`]
    TimeUpdate,
    /// See [`TrackEvent::Ended`]
    Ended,
    /// See [`TrackEvent::Error`]
    Error,
}

impl TrackEvent {
    /// Dispatch key of this event
    pub fn kind(&self) -> TrackEventKind {
        match self {
            TrackEvent::LoadedMetadata { .. } => TrackEventKind::LoadedMetadata,
            TrackEvent::LoadedData => TrackEventKind::LoadedData,
            TrackEvent::CanPlay => TrackEventKind::CanPlay,
            TrackEvent::Waiting => TrackEventKind::Waiting,
            TrackEvent::Seeked { .. } => TrackEventKind::Seeked,
            TrackEvent::Progress { .. } => TrackEventKind::Progress,
            TrackEvent::TimeUpdate { .. } => TrackEventKind::TimeUpdate,
            TrackEvent::Ended => TrackEventKind::Ended,
            TrackEvent::Error { .. } => TrackEventKind::Error,
        }
    }
}

/// Event tagged with the track and load it came from
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSignal {
    /// Reporting track
    pub track: TrackKind,
    /// Load epoch of the resource that produced the event
    pub epoch: u64,
    /// The event
    pub event: TrackEvent,
}

/// Channel an element reports its events through
///
/// A sink is bound to one load of one track. Events sent after the track was
/// reloaded carry a stale epoch and are dropped by the session.
#[derive(Debug, Clone)]
pub struct TrackEventSink {
    track: TrackKind,
    epoch: u64,
    tx: mpsc::UnboundedSender<TrackSignal>,
}

impl TrackEventSink {
    /// Create a sink for one load of a track
    pub fn new(track: TrackKind, epoch: u64, tx: mpsc::UnboundedSender<TrackSignal>) -> Self {
        Self { track, epoch, tx }
    }

    /// Track this sink reports for
    pub fn track(&self) -> TrackKind {
        self.track
    }

    /// Load epoch this sink is bound to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event; returns `false` once the session is gone
    pub fn emit(&self, event: TrackEvent) -> bool {
        trace!("{} track event (epoch {}): {:?}", self.track, self.epoch, event);
        self.tx
            .send(TrackSignal {
                track: self.track,
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    /// Whether the receiving session has shut down
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(TrackEvent::CanPlay.kind(), TrackEventKind::CanPlay);
        assert_eq!(
            TrackEvent::LoadedMetadata { duration: 10.0 }.kind(),
            TrackEventKind::LoadedMetadata
        );
        assert_eq!(
            TrackEvent::Error {
                reason: "403".to_string()
            }
            .kind(),
            TrackEventKind::Error
        );
    }

    #[tokio::test]
    async fn test_sink_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = TrackEventSink::new(TrackKind::Audio, 3, tx);

        assert!(sink.emit(TrackEvent::Waiting));
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.track, TrackKind::Audio);
        assert_eq!(signal.epoch, 3);
        assert_eq!(signal.event, TrackEvent::Waiting);
    }

    #[tokio::test]
    async fn test_sink_reports_closed_session() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TrackEventSink::new(TrackKind::Video, 1, tx);
        drop(rx);

        assert!(sink.is_closed());
        assert!(!sink.emit(TrackEvent::CanPlay));
    }
}
