//! Player handle and builder

use crate::config::PlayerConfig;
use crate::event::PlayerEventStream;
use crate::session::{Collaborators, Command, Session};
use crate::snapshot::PlayerSnapshot;
use crate::transaction::Reply;
use dualtrack_core::{
    FormatCatalog, FormatResolver, HistorySink, MediaRequest, PlaybackState, PlayerError,
    PlayerResult, TrackKind, TrackPair,
};
use dualtrack_diagnostics::{SyncMonitor, SyncStats};
use dualtrack_media::{MediaElement, SimulatedControl, SimulatedElement, SimulationProfile};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// Builder for a [`Player`]
pub struct PlayerBuilder {
    config: PlayerConfig,
    resolver: Option<Arc<dyn FormatResolver>>,
    history: Option<Arc<dyn HistorySink>>,
    elements: Option<TrackPair<Box<dyn MediaElement>>>,
    catalog: FormatCatalog,
}

impl std::fmt::Debug for PlayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBuilder")
            .field("config", &self.config)
            .field("has_resolver", &self.resolver.is_some())
            .field("has_history", &self.history.is_some())
            .field("has_elements", &self.elements.is_some())
            .finish()
    }
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PlayerConfig::default(),
            resolver: None,
            history: None,
            elements: None,
            catalog: FormatCatalog::standard(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the format resolver (required)
    pub fn resolver(mut self, resolver: Arc<dyn FormatResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Notify a history sink when playback of an item starts
    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Set the media elements backing the two tracks (required)
    pub fn elements(mut self, video: Box<dyn MediaElement>, audio: Box<dyn MediaElement>) -> Self {
        self.elements = Some(TrackPair::new(video, audio));
        self
    }

    /// Back both tracks with simulated elements
    ///
    /// Returns the control handles used to inspect the elements and inject
    /// stalls, faults or drift.
    pub fn with_simulated_elements(
        self,
        profile: SimulationProfile,
    ) -> (Self, TrackPair<SimulatedControl>) {
        let (video, video_control) = SimulatedElement::new(profile.clone());
        let (audio, audio_control) = SimulatedElement::new(profile);
        (
            self.elements(Box::new(video), Box::new(audio)),
            TrackPair::new(video_control, audio_control),
        )
    }

    /// Use a custom format catalog for label lookups
    pub fn catalog(mut self, catalog: FormatCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Start playing as soon as initialization completes
    pub fn autoplay(mut self, enabled: bool) -> Self {
        self.config.autoplay = enabled;
        self
    }

    /// Audio/video distance (seconds) above which audio is re-aligned
    pub fn drift_threshold(mut self, seconds: f64) -> Self {
        self.config.drift_threshold = seconds;
        self
    }

    /// Period of the drift check
    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.config.reconcile_interval = interval;
        self
    }

    /// How long a track may stall before the session gives up
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.config.stall_timeout = timeout;
        self
    }

    /// How long a transaction may take
    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.config.transaction_timeout = timeout;
        self
    }

    /// Initial audio volume in `[0, 1]`
    pub fn volume(mut self, volume: f64) -> Self {
        self.config.initial_volume = volume;
        self
    }

    /// Spawn the session on the current tokio runtime
    pub fn build(self) -> PlayerResult<Player> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| PlayerError::MissingConfiguration {
                field: "tokio runtime".to_string(),
            })?;
        let resolver = self
            .resolver
            .ok_or_else(|| PlayerError::MissingConfiguration {
                field: "resolver".to_string(),
            })?;
        let elements = self
            .elements
            .ok_or_else(|| PlayerError::MissingConfiguration {
                field: "elements".to_string(),
            })?;

        let config = self.config.normalized();
        let monitor = SyncMonitor::new();
        let session_id = monitor.session_id();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(PlayerSnapshot::idle(
            config.initial_volume,
            config.start_muted,
        ));

        let session = Session::new(
            config,
            Collaborators {
                resolver,
                history: self.history,
                catalog: self.catalog,
            },
            elements,
            command_rx,
            snapshot_tx,
            monitor,
        );
        runtime.spawn(session.run().instrument(info_span!("session", id = %session_id)));
        debug!("Spawned playback session {}", session_id);

        Ok(Player {
            commands,
            snapshots,
            session_id,
        })
    }
}

/// Handle to a running playback session
///
/// Operations are queued to the session task and processed one at a time.
/// Each `async` method resolves once the operation completed, failed or was
/// replaced by a newer one. Dropping every handle tears the session down.
#[derive(Debug)]
pub struct Player {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<PlayerSnapshot>,
    session_id: Uuid,
}

impl Player {
    /// Start building a player
    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::new()
    }

    /// Resolve both locators for an item and load them
    ///
    /// Completes once both tracks have their sources, in `Ready` state (or
    /// on the way to `Playing` with autoplay).
    pub async fn initialize(&self, request: MediaRequest) -> PlayerResult<()> {
        self.request(|reply| Command::Initialize { request, reply })
            .await
    }

    /// Tear down the current tracks and initialize the last request again
    pub async fn retry(&self) -> PlayerResult<()> {
        self.request(|reply| Command::Retry { reply }).await
    }

    /// Start playback once both tracks can play
    pub async fn play(&self) -> PlayerResult<()> {
        self.request(|reply| Command::Play { reply }).await
    }

    /// Pause both tracks
    pub async fn pause(&self) -> PlayerResult<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Move both tracks to `position` seconds
    ///
    /// Playback resumes afterwards if it was playing before.
    pub async fn seek(&self, position: f64) -> PlayerResult<()> {
        self.request(|reply| Command::Seek { position, reply })
            .await
    }

    /// Switch one track to another format id or quality label
    ///
    /// The other track keeps its source; both resume at the position the
    /// switch started from.
    pub async fn set_format(&self, track: TrackKind, format_id: &str) -> PlayerResult<()> {
        let format_id = format_id.to_string();
        self.request(|reply| Command::SetFormat {
            track,
            format_id,
            reply,
        })
        .await
    }

    /// Set audio volume in `[0, 1]`
    pub async fn set_volume(&self, volume: f64) -> PlayerResult<()> {
        self.request(|reply| Command::SetVolume { volume, reply })
            .await
    }

    /// Mute or unmute audio
    pub async fn toggle_mute(&self) -> PlayerResult<()> {
        self.request(|reply| Command::ToggleMute { reply }).await
    }

    /// Stop the session and release both tracks
    ///
    /// Pending operations fail with [`PlayerError::TornDown`]. Calling this
    /// again is a no-op.
    pub async fn teardown(&self) -> PlayerResult<()> {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Teardown { ack }).is_err() {
            return Ok(());
        }
        let _ = done.await;
        Ok(())
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn watch(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to session events
    pub fn events(&self) -> PlayerEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.commands.send(Command::Subscribe { tx });
        PlayerEventStream::new(rx)
    }

    /// Current transport state
    pub fn state(&self) -> PlaybackState {
        self.snapshots.borrow().state
    }

    /// Synchronization counters
    pub fn stats(&self) -> SyncStats {
        self.snapshots.borrow().stats.clone()
    }

    /// Session identifier, also attached to the session's tracing span
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Whether the session has stopped
    pub fn is_torn_down(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> PlayerResult<()> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| PlayerError::TornDown)?;
        result.await.unwrap_or(Err(PlayerError::TornDown))
    }
}
