//! Event system for player notifications

use dualtrack_core::{MediaRef, PlaybackState, TrackKind};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Notifications a session publishes while it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// Transport state changed
    StateChanged {
        /// Previous state
        from: PlaybackState,
        /// New state
        to: PlaybackState,
    },
    /// Media duration became known or changed
    DurationChanged {
        /// Duration in seconds
        duration: f64,
    },
    /// A track now plays a different variant
    FormatChanged {
        /// Track whose locator was replaced
        track: TrackKind,
        /// New format id, `None` for the resolver default
        format_id: Option<String>,
    },
    /// Audio was re-aligned to video during playback
    DriftCorrected {
        /// Audio minus video position before the correction (seconds)
        drift: f64,
        /// Position audio was moved to, ahead of video by the expected seek time
        position: f64,
    },
    /// A track ran out of data
    TrackStalled {
        /// Stalled track
        track: TrackKind,
    },
    /// A stalled track can play again
    TrackRecovered {
        /// Recovered track
        track: TrackKind,
    },
    /// Playback of an item genuinely started
    WatchStarted {
        /// Item being watched
        media_ref: MediaRef,
    },
    /// Volume or mute changed
    VolumeChanged {
        /// Audio volume in `[0, 1]`
        volume: f64,
        /// Whether audio is muted
        muted: bool,
    },
    /// Video reached the end of the media
    Ended,
    /// An operation or track failed
    Error {
        /// User-visible message
        message: String,
        /// Whether the session can continue or be retried
        recoverable: bool,
    },
}

impl PlayerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "state_changed",
            PlayerEvent::DurationChanged { .. } => "duration_changed",
            PlayerEvent::FormatChanged { .. } => "format_changed",
            PlayerEvent::DriftCorrected { .. } => "drift_corrected",
            PlayerEvent::TrackStalled { .. } => "track_stalled",
            PlayerEvent::TrackRecovered { .. } => "track_recovered",
            PlayerEvent::WatchStarted { .. } => "watch_started",
            PlayerEvent::VolumeChanged { .. } => "volume_changed",
            PlayerEvent::Ended => "ended",
            PlayerEvent::Error { .. } => "error",
        }
    }

    /// Check if this event concerns track synchronization
    pub fn is_sync_event(&self) -> bool {
        matches!(
            self,
            PlayerEvent::DriftCorrected { .. }
                | PlayerEvent::TrackStalled { .. }
                | PlayerEvent::TrackRecovered { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, PlayerEvent::Error { .. })
    }
}

/// Stream of player events for async iteration
#[derive(Debug)]
pub struct PlayerEventStream {
    receiver: mpsc::UnboundedReceiver<PlayerEvent>,
}

impl PlayerEventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<PlayerEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<PlayerEvent> {
        self.receiver.recv().await
    }

    /// Next queued event, if any, without waiting
    ///
    /// Returns `None` both when nothing is queued and when the player is gone.
    pub fn try_next(&mut self) -> Option<PlayerEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for PlayerEventStream {
    type Item = PlayerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Fan-out of events to every live subscriber
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<PlayerEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self, tx: mpsc::UnboundedSender<PlayerEvent>) {
        self.subscribers.push(tx);
    }

    pub(crate) fn emit(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn clear(&mut self) {
        self.subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_event_type_classification() {
        let drift = PlayerEvent::DriftCorrected {
            drift: 0.3,
            position: 10.0,
        };
        assert_eq!(drift.event_type(), "drift_corrected");
        assert!(drift.is_sync_event());
        assert!(!drift.is_error_event());

        let error = PlayerEvent::Error {
            message: "Could not resolve video stream".to_string(),
            recoverable: true,
        };
        assert!(error.is_error_event());
        assert!(!error.is_sync_event());
        assert_eq!(PlayerEvent::Ended.event_type(), "ended");
    }

    #[tokio::test]
    async fn test_event_stream_basic() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = PlayerEventStream::new(rx);

        tx.send(PlayerEvent::Ended).unwrap();
        assert_eq!(stream.next().await, Some(PlayerEvent::Ended));
        assert!(stream.try_next().is_none());

        // events queued before the player went away are still delivered
        tx.send(PlayerEvent::Ended).unwrap();
        drop(tx);
        assert_eq!(stream.try_next(), Some(PlayerEvent::Ended));
        assert!(stream.try_next().is_none());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_event_stream_as_futures_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = PlayerEventStream::new(rx);
        tx.send(PlayerEvent::TrackStalled {
            track: TrackKind::Audio,
        })
        .unwrap();
        tx.send(PlayerEvent::Ended).unwrap();
        drop(tx);

        let types: Vec<_> = stream.map(|e| e.event_type()).collect().await;
        assert_eq!(types, vec!["track_stalled", "ended"]);
    }

    #[test]
    fn test_bus_drops_closed_subscribers() {
        let mut bus = EventBus::default();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        bus.subscribe(live_tx);
        bus.subscribe(dead_tx);
        drop(dead_rx);

        bus.emit(PlayerEvent::Ended);
        assert_eq!(bus.subscribers.len(), 1);
        assert_eq!(live_rx.try_recv().unwrap(), PlayerEvent::Ended);
    }
}
