//! Track handles owned by the playback session

use crate::element::{MediaElement, TrackEventSink, TrackSignal};
use dualtrack_core::{PlayableLocator, ReadyState, TrackKind};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

/// One of the two playable resources of a session
///
/// The handle is the only writer of its element's source. Every load or
/// release starts a new epoch so that events from the previous resource can
/// be told apart from current ones.
pub struct MediaTrackHandle {
    kind: TrackKind,
    element: Box<dyn MediaElement>,
    source_locator: Option<PlayableLocator>,
    ready_state: ReadyState,
    epoch: u64,
    muted: bool,
    /// When the seek still awaiting readiness was issued
    seek_started: Option<Instant>,
    /// Smoothed time from `seek` to readiness
    seek_latency: Option<Duration>,
    signals: mpsc::UnboundedSender<TrackSignal>,
}

impl std::fmt::Debug for MediaTrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrackHandle")
            .field("kind", &self.kind)
            .field("source_locator", &self.source_locator.as_ref().map(|l| &l.url))
            .field("ready_state", &self.ready_state)
            .field("epoch", &self.epoch)
            .field("muted", &self.muted)
            .finish()
    }
}

impl MediaTrackHandle {
    /// Wrap an element for a track
    ///
    /// Video handles are muted for their whole lifetime: sound is the audio
    /// track's job.
    pub fn new(
        kind: TrackKind,
        mut element: Box<dyn MediaElement>,
        signals: mpsc::UnboundedSender<TrackSignal>,
    ) -> Self {
        let muted = kind == TrackKind::Video;
        element.set_muted(muted);
        Self {
            kind,
            element,
            source_locator: None,
            ready_state: ReadyState::Empty,
            epoch: 0,
            muted,
            seek_started: None,
            seek_latency: None,
            signals,
        }
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Current locator, if one is assigned
    pub fn source_locator(&self) -> Option<&PlayableLocator> {
        self.source_locator.as_ref()
    }

    /// Readiness as last reported
    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Current load epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether output is muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Observed time a seek takes to become playable, zero until measured
    pub fn seek_latency(&self) -> Duration {
        self.seek_latency.unwrap_or_default()
    }

    /// Playhead in seconds
    pub fn current_position(&self) -> f64 {
        self.element.position()
    }

    /// Replace the source with a new locator, forcing a reload
    pub fn load(&mut self, locator: PlayableLocator) {
        self.epoch += 1;
        info!(
            "📼 Loading {} track (epoch {}): {}",
            self.kind, self.epoch, locator.url
        );
        let sink = TrackEventSink::new(self.kind, self.epoch, self.signals.clone());
        self.element.load(&locator, sink);
        self.source_locator = Some(locator);
        self.seek_started = None;
        self.ready_state = ReadyState::Loading;
    }

    /// Drop the source and detach from its events
    pub fn release(&mut self) {
        self.epoch += 1;
        if self.source_locator.take().is_some() {
            debug!("⏏️ Releasing {} track", self.kind);
            self.element.unload();
        }
        self.seek_started = None;
        self.ready_state = ReadyState::Empty;
    }

    /// Whether a signal belongs to the currently loaded resource
    pub fn accepts(&self, signal: &TrackSignal) -> bool {
        signal.track == self.kind && signal.epoch == self.epoch && self.source_locator.is_some()
    }

    /// Record a readiness change
    pub fn set_ready_state(&mut self, state: ReadyState) {
        if self.ready_state != state {
            debug!(
                "🔄 {} track ready state: {:?} -> {:?}",
                self.kind, self.ready_state, state
            );
            self.ready_state = state;
        }
        if state == ReadyState::CanPlay {
            if let Some(started) = self.seek_started.take() {
                let sample = started.elapsed();
                let latency = match self.seek_latency {
                    Some(previous) => (previous + sample) / 2,
                    None => sample,
                };
                debug!("⏱️ {} seek took {:?} (estimate {:?})", self.kind, sample, latency);
                self.seek_latency = Some(latency);
            }
        }
    }

    /// Ask the element whether it really can play at the playhead
    ///
    /// Used to discard readiness reports that were queued before the last
    /// position change.
    pub fn confirm_ready(&self) -> bool {
        self.source_locator.is_some() && self.element.is_ready()
    }

    /// Whether the track can play right now
    pub fn can_play(&self) -> bool {
        self.ready_state.can_play()
    }

    /// Start playback
    pub fn play(&mut self) {
        self.element.play();
    }

    /// Pause playback
    pub fn pause(&mut self) {
        self.element.pause();
    }

    /// Move the playhead; readiness must be reported again afterwards
    pub fn seek(&mut self, position: f64) {
        self.element.seek(position);
        if self.source_locator.is_some() && self.ready_state != ReadyState::Errored {
            self.seek_started = Some(Instant::now());
            self.ready_state = ReadyState::Loading;
        }
    }

    /// Apply output volume (ignored on the video track)
    pub fn set_volume(&mut self, volume: f64) {
        if self.kind == TrackKind::Audio {
            self.element.set_volume(volume.clamp(0.0, 1.0));
        }
    }

    /// Apply mute (the video track stays muted regardless)
    pub fn set_muted(&mut self, muted: bool) {
        if self.kind == TrackKind::Audio {
            self.muted = muted;
            self.element.set_muted(muted);
        }
    }
}
