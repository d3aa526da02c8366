//! Track and transport state enumerations

use serde::{Deserialize, Serialize};

/// Track kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Video-only stream, the master clock
    Video,
    /// Audio-only stream, carries all sound
    Audio,
}

impl TrackKind {
    /// Both kinds, master first
    pub const ALL: [TrackKind; 2] = [TrackKind::Video, TrackKind::Audio];

    /// The other track of the pair
    pub fn other(self) -> TrackKind {
        match self {
            TrackKind::Video => TrackKind::Audio,
            TrackKind::Audio => TrackKind::Video,
        }
    }

    /// Whether this track drives the session clock
    pub fn is_master(self) -> bool {
        matches!(self, TrackKind::Video)
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

/// Readiness of a single track as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyState {
    /// No locator assigned
    Empty,
    /// Locator assigned or position changed, data not yet available
    Loading,
    /// Enough data buffered to play at the current position
    CanPlay,
    /// Playback ran out of buffered data
    Stalled,
    /// The element reported a fatal fault
    Errored,
}

impl ReadyState {
    /// Equivalent of `readyState >= HAVE_FUTURE_DATA`
    pub fn can_play(self) -> bool {
        matches!(self, ReadyState::CanPlay)
    }
}

/// Shared transport state of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing loaded
    Idle,
    /// Resolving locators for both tracks
    Initializing,
    /// Both locators assigned, transport not started yet
    Ready,
    /// Both tracks playing
    Playing,
    /// Both tracks paused
    Paused,
    /// Seek transaction in flight
    Seeking,
    /// Format switch transaction in flight
    Switching,
    /// Master track ran out of data while playing
    Stalled,
    /// Unrecoverable failure, needs re-initialization
    Errored,
}

impl PlaybackState {
    /// Whether the transport is logically playing
    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Stalled)
    }

    /// Whether a seek or switch transaction owns the tracks
    pub fn is_transaction(self) -> bool {
        matches!(self, PlaybackState::Seeking | PlaybackState::Switching)
    }

    /// Whether the session holds loaded tracks that accept transport commands
    pub fn has_media(self) -> bool {
        !matches!(
            self,
            PlaybackState::Idle | PlaybackState::Initializing | PlaybackState::Errored
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// One value per track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackPair<T> {
    /// Value for the video track
    pub video: T,
    /// Value for the audio track
    pub audio: T,
}

impl<T> TrackPair<T> {
    /// Create a pair from both values
    pub fn new(video: T, audio: T) -> Self {
        Self { video, audio }
    }

    /// Borrow the value for a track
    pub fn get(&self, kind: TrackKind) -> &T {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }

    /// Mutably borrow the value for a track
    pub fn get_mut(&mut self, kind: TrackKind) -> &mut T {
        match kind {
            TrackKind::Video => &mut self.video,
            TrackKind::Audio => &mut self.audio,
        }
    }

    /// Whether the predicate holds for both values
    pub fn both(&self, mut f: impl FnMut(&T) -> bool) -> bool {
        f(&self.video) && f(&self.audio)
    }

    /// Iterate `(kind, value)`, master first
    pub fn iter(&self) -> impl Iterator<Item = (TrackKind, &T)> {
        [(TrackKind::Video, &self.video), (TrackKind::Audio, &self.audio)].into_iter()
    }
}

/// Format a position as `M:SS`, or `H:MM:SS` past one hour
pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
