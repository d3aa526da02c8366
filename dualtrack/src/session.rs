//! Playback session: the task that owns both tracks and the transport state

use crate::config::PlayerConfig;
use crate::event::{EventBus, PlayerEvent};
use crate::snapshot::PlayerSnapshot;
use crate::transaction::{
    superseded, InitTransaction, OperationCounter, OperationToken, Reply, SwitchPhase,
    Transaction, TransactionKind,
};
use chrono::Utc;
use dualtrack_core::{
    format_timestamp, FormatCatalog, FormatResolver, FormatSelection, HistorySink, MediaRequest,
    PlayableLocator, PlaybackState, PlayerError, PlayerResult, ReadyState, ResolveError, TrackKind,
    TrackPair, WatchEntry,
};
use dualtrack_diagnostics::SyncMonitor;
use dualtrack_media::{MediaElement, MediaTrackHandle, TrackEvent, TrackSignal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Audio/video distance below which the final re-alignment is skipped
const ALIGN_EPSILON: f64 = 0.005;

/// Messages from the [`Player`](crate::Player) handle
#[derive(Debug)]
pub(crate) enum Command {
    Initialize {
        request: MediaRequest,
        reply: Reply,
    },
    Retry {
        reply: Reply,
    },
    Play {
        reply: Reply,
    },
    Pause {
        reply: Reply,
    },
    Seek {
        position: f64,
        reply: Reply,
    },
    SetFormat {
        track: TrackKind,
        format_id: String,
        reply: Reply,
    },
    SetVolume {
        volume: f64,
        reply: Reply,
    },
    ToggleMute {
        reply: Reply,
    },
    Subscribe {
        tx: mpsc::UnboundedSender<PlayerEvent>,
    },
    Teardown {
        ack: oneshot::Sender<()>,
    },
}

/// External services the session talks to
pub(crate) struct Collaborators {
    pub(crate) resolver: Arc<dyn FormatResolver>,
    pub(crate) history: Option<Arc<dyn HistorySink>>,
    pub(crate) catalog: FormatCatalog,
}

/// Resolver completion, tagged with the operation that asked for it
#[derive(Debug)]
struct Resolution {
    token: OperationToken,
    track: TrackKind,
    result: Result<PlayableLocator, ResolveError>,
}

/// Deadlines owned by the session
#[derive(Debug, Default)]
struct Timers {
    reconcile: Option<Instant>,
    transaction: Option<Instant>,
    /// When each track started stalling
    stall: TrackPair<Option<Instant>>,
}

impl Timers {
    fn next(&self, stall_timeout: Duration) -> Option<Instant> {
        [
            self.reconcile,
            self.transaction,
            self.stall.video.map(|since| since + stall_timeout),
            self.stall.audio.map(|since| since + stall_timeout),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

pub(crate) struct Session {
    config: PlayerConfig,
    resolver: Arc<dyn FormatResolver>,
    history: Option<Arc<dyn HistorySink>>,
    catalog: FormatCatalog,
    monitor: SyncMonitor,

    tracks: TrackPair<MediaTrackHandle>,
    state: PlaybackState,
    duration: Option<f64>,
    buffered_end: f64,
    volume: f64,
    muted: bool,
    premute_volume: Option<f64>,
    selection: FormatSelection,
    request: Option<MediaRequest>,
    watch_reported: bool,
    last_error: Option<String>,
    target_position: Option<f64>,
    /// Tracks that must be moved to the target once their new source has data
    reposition_on_load: TrackPair<bool>,
    /// A drift correction seek on the audio track awaits readiness
    correcting: bool,
    /// Drift is left alone until audio has played this long after a correction
    drift_hold: Option<Instant>,

    operations: OperationCounter,
    init: Option<InitTransaction>,
    transaction: Option<Transaction>,
    resolver_tasks: Vec<JoinHandle<()>>,
    timers: Timers,

    commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedReceiver<TrackSignal>,
    resolutions_tx: mpsc::UnboundedSender<Resolution>,
    resolutions: mpsc::UnboundedReceiver<Resolution>,
    snapshot_tx: watch::Sender<PlayerSnapshot>,
    events: EventBus,
    /// Replies held back until the snapshot reflecting them is published
    outbox: Vec<(Reply, PlayerResult<()>)>,
}

impl Session {
    pub(crate) fn new(
        config: PlayerConfig,
        collaborators: Collaborators,
        elements: TrackPair<Box<dyn MediaElement>>,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshot_tx: watch::Sender<PlayerSnapshot>,
        monitor: SyncMonitor,
    ) -> Self {
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let (resolutions_tx, resolutions) = mpsc::unbounded_channel();
        let mut tracks = TrackPair::new(
            MediaTrackHandle::new(TrackKind::Video, elements.video, signals_tx.clone()),
            MediaTrackHandle::new(TrackKind::Audio, elements.audio, signals_tx),
        );
        tracks.audio.set_volume(config.initial_volume);
        tracks.audio.set_muted(config.start_muted);

        Self {
            volume: config.initial_volume,
            muted: config.start_muted,
            config,
            resolver: collaborators.resolver,
            history: collaborators.history,
            catalog: collaborators.catalog,
            monitor,
            tracks,
            state: PlaybackState::Idle,
            duration: None,
            buffered_end: 0.0,
            premute_volume: None,
            selection: FormatSelection::default(),
            request: None,
            watch_reported: false,
            last_error: None,
            target_position: None,
            reposition_on_load: TrackPair::default(),
            correcting: false,
            drift_hold: None,
            operations: OperationCounter::default(),
            init: None,
            transaction: None,
            resolver_tasks: Vec::new(),
            timers: Timers::default(),
            commands,
            signals,
            resolutions_tx,
            resolutions,
            snapshot_tx,
            events: EventBus::default(),
            outbox: Vec::new(),
        }
    }

    /// Process commands, track signals, resolver completions and deadlines
    /// one at a time until the player is torn down or dropped
    pub(crate) async fn run(mut self) {
        info!("▶️ Playback session started");
        loop {
            let deadline = self.timers.next(self.config.stall_timeout);
            let sleep = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        self.publish();
                        break;
                    }
                },
                Some(signal) = self.signals.recv() => self.dispatch(signal),
                Some(resolution) = self.resolutions.recv() => self.on_resolved(resolution),
                _ = sleep, if deadline.is_some() => self.on_deadline(),
            }

            self.publish();
        }
        info!("⏹️ Playback session stopped");
    }

    /// Returns `false` once the session must stop
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Initialize { request, reply } => self.initialize(request, reply),
            Command::Retry { reply } => self.retry(reply),
            Command::Play { reply } => self.play(reply),
            Command::Pause { reply } => self.pause(reply),
            Command::Seek { position, reply } => self.seek(position, reply),
            Command::SetFormat {
                track,
                format_id,
                reply,
            } => self.set_format(track, format_id, reply),
            Command::SetVolume { volume, reply } => {
                self.set_volume(volume);
                self.respond(reply, Ok(()));
            }
            Command::ToggleMute { reply } => {
                self.toggle_mute();
                self.respond(reply, Ok(()));
            }
            Command::Subscribe { tx } => self.events.subscribe(tx),
            Command::Teardown { ack } => {
                self.shutdown();
                self.publish();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn initialize(&mut self, request: MediaRequest, reply: Reply) {
        if !matches!(self.state, PlaybackState::Idle | PlaybackState::Errored) {
            let error = self.invalid_state("Idle or Errored");
            self.respond(reply, Err(error));
            return;
        }
        self.begin_initialize(request, reply);
    }

    fn retry(&mut self, reply: Reply) {
        let Some(request) = self.request.clone() else {
            let error = self.invalid_state("a previously initialized item");
            self.respond(reply, Err(error));
            return;
        };
        info!("🔄 Retrying {}", request.media_ref);
        self.operations.next();
        self.abort_resolutions();
        self.supersede_pending();
        self.timers = Timers::default();
        self.release_tracks();
        self.set_state(PlaybackState::Idle);
        self.begin_initialize(request, reply);
    }

    fn begin_initialize(&mut self, request: MediaRequest, reply: Reply) {
        let mut selection = self.config.default_formats.clone();
        for track in TrackKind::ALL {
            let preferred = match track {
                TrackKind::Video => request.preferred_video_format.as_deref(),
                TrackKind::Audio => request.preferred_audio_format.as_deref(),
            };
            let Some(preferred) = preferred else {
                continue;
            };
            match self
                .catalog
                .resolve(track, preferred, request.available_formats.as_ref())
            {
                Some(id) => selection.set(track, Some(id)),
                None => {
                    let error = PlayerError::UnknownFormat {
                        track,
                        format_id: preferred.to_string(),
                    };
                    self.respond(reply, Err(error));
                    return;
                }
            }
        }

        self.release_tracks();
        if self.request.as_ref().map(|r| &r.media_ref) != Some(&request.media_ref) {
            self.watch_reported = false;
        }
        self.last_error = None;
        self.duration = request
            .duration_hint
            .filter(|d| d.is_finite() && *d > 0.0);
        self.buffered_end = 0.0;
        self.request = Some(request);

        let token = self.operations.next();
        info!(
            "🚀 Initializing {} (video: {}, audio: {})",
            self.request
                .as_ref()
                .map(|r| r.media_ref.to_string())
                .unwrap_or_default(),
            selection.get(TrackKind::Video).unwrap_or("default"),
            selection.get(TrackKind::Audio).unwrap_or("default"),
        );
        self.set_state(PlaybackState::Initializing);
        for track in TrackKind::ALL {
            let format_id = selection.get(track).map(str::to_string);
            self.spawn_resolution(token, track, format_id);
        }
        self.init = Some(InitTransaction::new(
            token,
            selection,
            self.config.autoplay,
            Some(reply),
        ));
        self.arm_transaction_deadline();
    }

    fn play(&mut self, reply: Reply) {
        match self.state {
            PlaybackState::Playing | PlaybackState::Stalled => self.respond(reply, Ok(())),
            PlaybackState::Initializing => {
                if let Some(init) = self.init.as_mut() {
                    init.follow(reply);
                }
            }
            PlaybackState::Seeking | PlaybackState::Switching => {
                if let Some(transaction) = self.transaction.as_mut() {
                    transaction.resume = true;
                    transaction.follow(reply);
                }
            }
            PlaybackState::Ready | PlaybackState::Paused => {
                if self.transaction.as_ref().is_some_and(Transaction::is_play) {
                    if let Some(transaction) = self.transaction.as_mut() {
                        transaction.follow(reply);
                    }
                } else {
                    self.start_play(Some(reply), Vec::new());
                }
            }
            PlaybackState::Idle | PlaybackState::Errored => {
                let error = self.invalid_state("Ready, Paused or Playing");
                self.respond(reply, Err(error));
            }
        }
    }

    fn start_play(&mut self, caller: Option<Reply>, followers: Vec<Reply>) {
        let token = self.operations.next();
        let mut transaction = Transaction::play(token, caller);
        transaction.adopt(followers);
        debug!("⏳ Waiting for both tracks before playing ({})", token);
        self.transaction = Some(transaction);
        self.arm_transaction_deadline();
        self.advance();
    }

    fn pause(&mut self, reply: Reply) {
        match self.state {
            PlaybackState::Playing | PlaybackState::Stalled => {
                self.pause_tracks();
                self.timers.stall = TrackPair::default();
                self.set_state(PlaybackState::Paused);
            }
            PlaybackState::Ready | PlaybackState::Paused => {
                if self.transaction.as_ref().is_some_and(Transaction::is_play) {
                    if let Some(transaction) = self.transaction.take() {
                        debug!("✋ Pending play cancelled by pause");
                        self.timers.transaction = None;
                        self.monitor.record_superseded();
                        for waiting in transaction.into_replies() {
                            self.respond(waiting, Err(superseded("play")));
                        }
                    }
                }
                self.set_state(PlaybackState::Paused);
            }
            PlaybackState::Seeking | PlaybackState::Switching => {
                let waiting = self
                    .transaction
                    .as_mut()
                    .map(Transaction::cancel_resume)
                    .unwrap_or_default();
                for waiting in waiting {
                    self.respond(waiting, Err(superseded("play")));
                }
            }
            PlaybackState::Initializing => {
                let waiting = self
                    .init
                    .as_mut()
                    .map(InitTransaction::cancel_play)
                    .unwrap_or_default();
                for waiting in waiting {
                    self.respond(waiting, Err(superseded("play")));
                }
            }
            PlaybackState::Idle | PlaybackState::Errored => {}
        }
        self.respond(reply, Ok(()));
    }

    fn seek(&mut self, position: f64, reply: Reply) {
        if !self.state.has_media() {
            let error = self.invalid_state("a loaded item");
            self.respond(reply, Err(error));
            return;
        }
        if !position.is_finite() {
            let error = PlayerError::InvalidState {
                expected: "a finite position".to_string(),
                actual: position.to_string(),
            };
            self.respond(reply, Err(error));
            return;
        }

        let target = self.clamp_position(position);
        let (resume, carried) = self.supersede_transaction();
        info!(
            "⏩ Seeking to {} ({:.3}s, resume: {})",
            format_timestamp(target),
            target,
            resume
        );

        self.pause_tracks();
        self.timers.stall = TrackPair::default();
        self.target_position = Some(target);
        let token = self.operations.next();
        let mut transaction = Transaction::seek(token, target, resume, reply);
        transaction.adopt(carried);
        self.transaction = Some(transaction);
        self.arm_transaction_deadline();
        self.set_state(PlaybackState::Seeking);

        for track in TrackKind::ALL {
            *self.reposition_on_load.get_mut(track) = false;
            self.tracks.get_mut(track).seek(target);
        }
        self.advance();
    }

    fn set_format(&mut self, track: TrackKind, requested: String, reply: Reply) {
        if !self.state.has_media() {
            let error = self.invalid_state("a loaded item");
            self.respond(reply, Err(error));
            return;
        }
        let available = self
            .request
            .as_ref()
            .and_then(|r| r.available_formats.as_ref());
        let Some(format_id) = self.catalog.resolve(track, &requested, available) else {
            self.respond(
                reply,
                Err(PlayerError::UnknownFormat {
                    track,
                    format_id: requested,
                }),
            );
            return;
        };

        let switching_this_track = self
            .transaction
            .as_ref()
            .and_then(Transaction::switch_phase)
            .is_some_and(|(switching, _)| switching == track);
        if self.selection.get(track) == Some(format_id.as_str()) && !switching_this_track {
            debug!("{} format {} already active", track, format_id);
            self.respond(reply, Ok(()));
            return;
        }

        let target = self
            .transaction
            .as_ref()
            .and_then(|t| t.target)
            .unwrap_or_else(|| self.master_position());
        let (resume, carried) = self.supersede_transaction();
        info!(
            "🎞️ Switching {} format to {} at {} (resume: {})",
            track,
            format_id,
            format_timestamp(target),
            resume
        );

        self.pause_tracks();
        self.timers.stall = TrackPair::default();
        self.target_position = Some(target);
        let token = self.operations.next();
        let mut transaction =
            Transaction::switch(token, track, format_id.clone(), target, resume, reply);
        transaction.adopt(carried);
        self.transaction = Some(transaction);
        self.arm_transaction_deadline();
        self.set_state(PlaybackState::Switching);
        self.spawn_resolution(token, track, Some(format_id));
    }

    fn set_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        self.volume = volume.clamp(0.0, 1.0);
        self.tracks.audio.set_volume(self.volume);
        debug!("🔊 Volume set to {:.0}%", self.volume * 100.0);
        self.events.emit(PlayerEvent::VolumeChanged {
            volume: self.volume,
            muted: self.muted,
        });
    }

    fn toggle_mute(&mut self) {
        if self.muted {
            self.muted = false;
            if self.volume == 0.0 {
                self.volume = self.premute_volume.filter(|v| *v > 0.0).unwrap_or(0.5);
                self.tracks.audio.set_volume(self.volume);
            }
        } else {
            self.premute_volume = Some(self.volume);
            self.muted = true;
        }
        self.tracks.audio.set_muted(self.muted);
        debug!("🔇 Muted: {}", self.muted);
        self.events.emit(PlayerEvent::VolumeChanged {
            volume: self.volume,
            muted: self.muted,
        });
    }

    fn shutdown(&mut self) {
        info!("🧹 Tearing down session");
        self.operations.next();
        self.abort_resolutions();
        for waiting in self.take_pending_replies() {
            self.respond(waiting, Err(PlayerError::TornDown));
        }
        self.timers = Timers::default();
        self.release_tracks();
        self.set_state(PlaybackState::Idle);
        self.events.clear();
    }

    // ------------------------------------------------------------------
    // Track signals
    // ------------------------------------------------------------------

    /// Single entry point for element events, keyed by track and event kind
    fn dispatch(&mut self, signal: TrackSignal) {
        let track = signal.track;
        if !self.tracks.get(track).accepts(&signal) {
            debug!(
                "🗑️ Dropping stale {} {:?} (epoch {}, current {})",
                track,
                signal.event.kind(),
                signal.epoch,
                self.tracks.get(track).epoch()
            );
            return;
        }

        match (track, signal.event) {
            (TrackKind::Video, TrackEvent::LoadedMetadata { duration }) => {
                self.on_duration(duration)
            }
            (TrackKind::Audio, TrackEvent::LoadedMetadata { duration }) => {
                if self.duration.is_none() {
                    self.on_duration(duration);
                }
            }
            (_, TrackEvent::LoadedData) => self.on_loaded_data(track),
            (_, TrackEvent::CanPlay) => self.on_can_play(track),
            (_, TrackEvent::Seeked { position }) => {
                debug!("📍 {} track seeked to {:.3}", track, position);
                self.advance();
            }
            (TrackKind::Video, TrackEvent::Progress { buffered_end }) => {
                self.buffered_end = buffered_end;
            }
            (TrackKind::Audio, TrackEvent::Progress { .. }) => {}
            (_, TrackEvent::TimeUpdate { .. }) => {}
            (TrackKind::Video, TrackEvent::Waiting) => self.on_master_waiting(),
            (TrackKind::Audio, TrackEvent::Waiting) => self.on_follower_waiting(),
            (TrackKind::Video, TrackEvent::Ended) => self.on_master_ended(),
            (TrackKind::Audio, TrackEvent::Ended) => {
                debug!("Audio track ended before video");
            }
            (_, TrackEvent::Error { reason }) => self.on_track_error(track, reason),
        }
    }

    fn on_duration(&mut self, duration: f64) {
        if !duration.is_finite() || duration <= 0.0 || self.duration == Some(duration) {
            return;
        }
        debug!("⏱️ Duration: {}", format_timestamp(duration));
        self.duration = Some(duration);
        self.events.emit(PlayerEvent::DurationChanged { duration });
    }

    fn on_loaded_data(&mut self, track: TrackKind) {
        debug!("📦 {} track has data", track);
        if !std::mem::take(self.reposition_on_load.get_mut(track)) {
            return;
        }
        let target = self
            .target_position
            .unwrap_or_else(|| self.master_position());
        debug!("📍 Positioning reloaded {} track at {:.3}", track, target);
        self.tracks.get_mut(track).seek(target);
        if let Some(transaction) = self.transaction.as_mut() {
            if transaction.switch_phase() == Some((track, SwitchPhase::Reloading)) {
                transaction.set_switch_phase(SwitchPhase::Buffering);
            }
        }
    }

    fn on_can_play(&mut self, track: TrackKind) {
        let handle = self.tracks.get_mut(track);
        if !handle.confirm_ready() {
            debug!("🗑️ Ignoring outdated {} readiness", track);
            return;
        }
        let was = handle.ready_state();
        handle.set_ready_state(ReadyState::CanPlay);
        let corrected = track == TrackKind::Audio && std::mem::take(&mut self.correcting);

        if self.timers.stall.get_mut(track).take().is_some() {
            info!("✅ {} track recovered", track);
            self.events.emit(PlayerEvent::TrackRecovered { track });
        }

        match (track, self.state) {
            (TrackKind::Video, PlaybackState::Stalled) => {
                self.tracks.audio.play();
                self.enter_playing();
                self.reconcile();
            }
            (TrackKind::Audio, PlaybackState::Playing) if corrected => {
                self.drift_hold = Some(Instant::now() + self.config.reconcile_interval);
            }
            (TrackKind::Audio, PlaybackState::Playing) if was != ReadyState::CanPlay => {
                self.reconcile();
            }
            _ => {}
        }
        self.advance();
    }

    fn on_master_waiting(&mut self) {
        if self.tracks.video.ready_state() == ReadyState::Errored {
            return;
        }
        self.tracks.video.set_ready_state(ReadyState::Stalled);
        if self.state == PlaybackState::Playing {
            warn!("⏸️ Video stalled, holding audio");
            self.tracks.audio.pause();
            self.note_stall(TrackKind::Video);
            self.set_state(PlaybackState::Stalled);
        }
    }

    fn on_follower_waiting(&mut self) {
        if self.tracks.audio.ready_state() == ReadyState::Errored {
            return;
        }
        self.tracks.audio.set_ready_state(ReadyState::Stalled);
        if self.state.is_playing() {
            warn!("⏸️ Audio stalled, video keeps the clock");
            self.note_stall(TrackKind::Audio);
        }
    }

    fn note_stall(&mut self, track: TrackKind) {
        let since = self.timers.stall.get_mut(track);
        if since.is_none() {
            *since = Some(Instant::now());
            self.monitor.record_stall(track);
            self.events.emit(PlayerEvent::TrackStalled { track });
        }
    }

    fn on_master_ended(&mut self) {
        info!("🏁 Reached end of media");
        if self.state.is_playing() {
            self.pause_tracks();
            self.timers.stall = TrackPair::default();
            self.set_state(PlaybackState::Paused);
        }
        self.events.emit(PlayerEvent::Ended);
    }

    fn on_track_error(&mut self, track: TrackKind, reason: String) {
        self.tracks.get_mut(track).set_ready_state(ReadyState::Errored);
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Errored) {
            warn!("{} track error while inactive: {}", track, reason);
            return;
        }
        self.fail(PlayerError::TrackFatalError { track, reason });
    }

    // ------------------------------------------------------------------
    // Resolver completions
    // ------------------------------------------------------------------

    fn spawn_resolution(&mut self, token: OperationToken, track: TrackKind, format_id: Option<String>) {
        let Some(media_ref) = self.request.as_ref().map(|r| r.media_ref.clone()) else {
            return;
        };
        let resolver = self.resolver.clone();
        let results = self.resolutions_tx.clone();
        debug!(
            "🔎 Resolving {} locator ({}) for {}",
            track,
            format_id.as_deref().unwrap_or("default"),
            token
        );
        self.resolver_tasks.retain(|task| !task.is_finished());
        self.resolver_tasks.push(tokio::spawn(async move {
            let result = resolver.resolve(&media_ref, format_id.as_deref()).await;
            let _ = results.send(Resolution {
                token,
                track,
                result,
            });
        }));
    }

    fn on_resolved(&mut self, resolution: Resolution) {
        if self
            .init
            .as_ref()
            .is_some_and(|init| init.token == resolution.token)
        {
            self.on_init_resolved(resolution);
        } else if self.transaction.as_ref().is_some_and(|t| {
            t.token == resolution.token && t.switch_phase().is_some()
        }) && self.operations.is_current(resolution.token)
        {
            self.on_switch_resolved(resolution);
        } else {
            debug!(
                "🗑️ Discarding stale {} resolution ({})",
                resolution.track, resolution.token
            );
        }
    }

    fn on_init_resolved(&mut self, resolution: Resolution) {
        let locator = match resolution.result {
            Ok(locator) => locator,
            Err(source) => {
                warn!(
                    "❌ Could not resolve {} locator: {}",
                    resolution.track, source
                );
                self.fail(PlayerError::ResolutionFailed {
                    track: resolution.track,
                    source,
                });
                self.release_tracks();
                return;
            }
        };
        debug!("🔗 {} locator resolved: {}", resolution.track, locator.url);

        let Some(init) = self.init.as_mut() else {
            return;
        };
        *init.resolved.get_mut(resolution.track) = Some(locator);
        let Some(locators) = init.take_locators() else {
            return;
        };
        let Some(init) = self.init.take() else {
            return;
        };

        self.timers.transaction = None;
        self.selection = init.selection.clone();
        let play_after = init.play_after;
        let (caller, followers) = init.into_parts();

        self.tracks.video.load(locators.video);
        self.tracks.audio.load(locators.audio);
        self.set_state(PlaybackState::Ready);
        if let Some(duration) = self.duration {
            self.events.emit(PlayerEvent::DurationChanged { duration });
        }
        info!("✅ Session ready");

        if let Some(caller) = caller {
            self.respond(caller, Ok(()));
        }
        if play_after {
            self.start_play(None, followers);
        } else {
            for waiting in followers {
                self.respond(waiting, Err(superseded("play")));
            }
        }
    }

    fn on_switch_resolved(&mut self, resolution: Resolution) {
        let Some(format_id) = self.transaction.as_ref().and_then(|t| match &t.kind {
            TransactionKind::Switch { format_id, .. } => Some(format_id.clone()),
            _ => None,
        }) else {
            return;
        };

        match resolution.result {
            Ok(locator) => {
                let track = resolution.track;
                info!("🔁 Replacing {} locator with format {}", track, format_id);
                self.tracks.get_mut(track).load(locator);
                *self.reposition_on_load.get_mut(track) = true;
                self.selection.set(track, Some(format_id.clone()));
                if let Some(transaction) = self.transaction.as_mut() {
                    transaction.set_switch_phase(SwitchPhase::Reloading);
                }
                self.events.emit(PlayerEvent::FormatChanged {
                    track,
                    format_id: Some(format_id),
                });
            }
            Err(source) => {
                warn!(
                    "❌ Could not resolve {} format {}: {}",
                    resolution.track, format_id, source
                );
                self.fail(PlayerError::ResolutionFailed {
                    track: resolution.track,
                    source,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Deadlines and reconciliation
    // ------------------------------------------------------------------

    fn on_deadline(&mut self) {
        let now = Instant::now();

        if self.timers.transaction.is_some_and(|at| at <= now) {
            self.timers.transaction = None;
            let operation = match (&self.init, &self.transaction) {
                (Some(_), _) => "initialize",
                (None, Some(transaction)) => transaction.name(),
                (None, None) => return,
            };
            warn!("⏱️ {} did not complete in time", operation);
            self.fail(PlayerError::Timeout {
                operation: operation.to_string(),
                duration: self.config.transaction_timeout,
            });
            return;
        }

        for track in TrackKind::ALL {
            let Some(since) = *self.timers.stall.get(track) else {
                continue;
            };
            if since + self.config.stall_timeout <= now {
                let stall = PlayerError::TrackStall {
                    track,
                    waited: now - since,
                };
                warn!("🧊 {}, giving up", stall);
                self.monitor.record_stall_escalation();
                self.fail(PlayerError::TrackFatalError {
                    track,
                    reason: stall.to_string(),
                });
                return;
            }
        }

        if self.timers.reconcile.is_some_and(|at| at <= now) {
            self.timers.reconcile = Some(now + self.config.reconcile_interval);
            self.reconcile();
        }
    }

    /// Pull audio back to the master clock when it drifted too far
    ///
    /// The correction aims where video will be once the audio seek lands,
    /// and a corrected track gets one full interval of playback before it
    /// is judged again.
    fn reconcile(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if !self.tracks.video.can_play() || !self.tracks.audio.can_play() {
            return;
        }
        if self.drift_hold.is_some_and(|until| Instant::now() < until) {
            return;
        }
        self.drift_hold = None;
        let video = self.tracks.video.current_position();
        let audio = self.tracks.audio.current_position();
        let drift = audio - video;
        self.monitor.record_drift(drift);
        if drift.abs() <= self.config.drift_threshold {
            return;
        }

        let lead = self.tracks.audio.seek_latency();
        let target = self.clamp_position(video + lead.as_secs_f64());
        debug!(
            "🎚️ Drift {:+.3}s exceeds {:.3}s, re-aligning audio to {:.3} ({:?} ahead)",
            drift, self.config.drift_threshold, target, lead
        );
        self.tracks.audio.seek(target);
        self.correcting = true;
        self.monitor.record_correction(drift);
        self.events.emit(PlayerEvent::DriftCorrected {
            drift,
            position: target,
        });
    }

    /// Move the pending transaction forward if the tracks allow it
    fn advance(&mut self) {
        let Some(transaction) = self.transaction.as_ref() else {
            return;
        };
        let is_play = transaction.is_play();
        let target = transaction.target;
        let aligned = transaction.aligned;
        let awaiting_reload = matches!(
            transaction.switch_phase(),
            Some((_, phase)) if phase != SwitchPhase::Buffering
        );

        if is_play {
            if self.tracks_ready() {
                self.complete_transaction();
            }
            return;
        }
        if awaiting_reload {
            return;
        }
        let Some(target) = target else {
            return;
        };
        if !self.ready_at(target) {
            return;
        }

        let video = self.tracks.video.current_position();
        let audio = self.tracks.audio.current_position();
        if !aligned && (audio - video).abs() > ALIGN_EPSILON {
            debug!("🎯 Final re-align of audio to {:.3}", video);
            if let Some(transaction) = self.transaction.as_mut() {
                transaction.aligned = true;
            }
            self.tracks.audio.seek(video);
            return;
        }
        self.complete_transaction();
    }

    fn complete_transaction(&mut self) {
        let Some(transaction) = self.transaction.take() else {
            return;
        };
        self.timers.transaction = None;
        self.target_position = None;
        self.correcting = false;
        self.drift_hold = None;
        match &transaction.kind {
            TransactionKind::Play => {}
            TransactionKind::Seek => self.monitor.record_seek(),
            TransactionKind::Switch { .. } => self.monitor.record_format_switch(),
        }
        info!(
            "✅ {} completed in {:?} ({})",
            transaction.name(),
            transaction.started.elapsed(),
            transaction.token
        );

        if transaction.resume {
            self.tracks.video.play();
            self.tracks.audio.play();
            self.enter_playing();
        } else {
            self.set_state(PlaybackState::Paused);
        }
        for waiting in transaction.into_replies() {
            self.respond(waiting, Ok(()));
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn tracks_ready(&self) -> bool {
        self.tracks
            .both(|handle| handle.can_play() && handle.confirm_ready())
    }

    fn ready_at(&self, target: f64) -> bool {
        self.tracks_ready()
            && (self.tracks.video.current_position() - target).abs() <= self.config.seek_tolerance
    }

    fn master_position(&self) -> f64 {
        self.tracks.video.current_position()
    }

    fn clamp_position(&self, position: f64) -> f64 {
        let position = position.max(0.0);
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn enter_playing(&mut self) {
        self.set_state(PlaybackState::Playing);
        self.timers.reconcile = Some(Instant::now() + self.config.reconcile_interval);
        self.report_watch_started();
    }

    fn report_watch_started(&mut self) {
        if self.watch_reported {
            return;
        }
        let Some(request) = self.request.as_ref() else {
            return;
        };
        self.watch_reported = true;
        let entry = WatchEntry {
            media_ref: request.media_ref.clone(),
            title_hint: request.title_hint.clone(),
            channel_hint: request.channel_hint.clone(),
            timestamp: Utc::now(),
        };
        info!("👀 Watch started: {}", entry.media_ref);
        let media_ref = entry.media_ref.clone();
        if let Some(history) = &self.history {
            history.watch_started(entry);
        }
        self.events.emit(PlayerEvent::WatchStarted { media_ref });
    }

    fn set_state(&mut self, next: PlaybackState) {
        if self.state == next {
            return;
        }
        info!("🎬 Playback state: {} -> {}", self.state, next);
        let from = std::mem::replace(&mut self.state, next);
        if next != PlaybackState::Playing {
            self.timers.reconcile = None;
        }
        self.events.emit(PlayerEvent::StateChanged { from, to: next });
    }

    fn fail(&mut self, error: PlayerError) {
        error!("💥 {}", error);
        self.operations.next();
        self.abort_resolutions();
        self.pause_tracks();
        self.timers = Timers::default();
        self.target_position = None;
        for waiting in self.take_pending_replies() {
            self.respond(waiting, Err(error.clone()));
        }
        self.last_error = Some(error.to_string());
        self.events.emit(PlayerEvent::Error {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
        self.set_state(PlaybackState::Errored);
    }

    fn supersede_transaction(&mut self) -> (bool, Vec<Reply>) {
        let Some(transaction) = self.transaction.take() else {
            return (self.state.is_playing(), Vec::new());
        };
        let resume = transaction.resume;
        let name = transaction.name();
        debug!("🔀 Superseding in-flight {} ({})", name, transaction.token);
        self.monitor.record_superseded();
        let (replaced, carried) = transaction.supersede();
        if let Some(replaced) = replaced {
            self.respond(replaced, Err(superseded(name)));
        }
        (resume, carried)
    }

    fn supersede_pending(&mut self) {
        if let Some(init) = self.init.take() {
            let (caller, followers) = init.into_parts();
            for waiting in caller.into_iter().chain(followers) {
                self.respond(waiting, Err(superseded("initialize")));
            }
        }
        if let Some(transaction) = self.transaction.take() {
            let name = transaction.name();
            for waiting in transaction.into_replies() {
                self.respond(waiting, Err(superseded(name)));
            }
        }
    }

    fn take_pending_replies(&mut self) -> Vec<Reply> {
        let mut replies = Vec::new();
        if let Some(init) = self.init.take() {
            let (caller, followers) = init.into_parts();
            replies.extend(caller);
            replies.extend(followers);
        }
        if let Some(transaction) = self.transaction.take() {
            replies.extend(transaction.into_replies());
        }
        replies
    }

    fn pause_tracks(&mut self) {
        self.tracks.video.pause();
        self.tracks.audio.pause();
    }

    fn release_tracks(&mut self) {
        self.tracks.video.release();
        self.tracks.audio.release();
        self.reposition_on_load = TrackPair::default();
        self.target_position = None;
    }

    fn abort_resolutions(&mut self) {
        for task in self.resolver_tasks.drain(..) {
            task.abort();
        }
    }

    fn arm_transaction_deadline(&mut self) {
        self.timers.transaction = Some(Instant::now() + self.config.transaction_timeout);
    }

    fn invalid_state(&self, expected: &str) -> PlayerError {
        PlayerError::InvalidState {
            expected: expected.to_string(),
            actual: self.state.to_string(),
        }
    }

    fn respond(&mut self, reply: Reply, result: PlayerResult<()>) {
        self.outbox.push((reply, result));
    }

    /// Publish the current snapshot, then release the replies it reflects
    fn publish(&mut self) {
        self.snapshot_tx.send_replace(self.snapshot());
        for (reply, result) in self.outbox.drain(..) {
            let _ = reply.send(result);
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        let current_time = match self.state {
            PlaybackState::Seeking | PlaybackState::Switching => {
                self.target_position.unwrap_or_default()
            }
            _ if self.tracks.video.source_locator().is_some() => self.master_position(),
            _ => 0.0,
        };
        let duration = self.duration.unwrap_or_default();
        let buffered_fraction = if duration > 0.0 {
            (self.buffered_end / duration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let is_loading = matches!(
            self.state,
            PlaybackState::Initializing
                | PlaybackState::Seeking
                | PlaybackState::Switching
                | PlaybackState::Stalled
        ) || self.transaction.is_some()
            || self.timers.stall.audio.is_some();

        PlayerSnapshot {
            state: self.state,
            current_time,
            duration,
            buffered_fraction,
            volume: self.volume,
            is_muted: self.muted,
            active_formats: self.selection.clone(),
            is_loading,
            error: self.last_error.clone(),
            media_ref: self.request.as_ref().map(|r| r.media_ref.clone()),
            sources: TrackPair::new(
                self.tracks.video.source_locator().map(|l| l.url.clone()),
                self.tracks.audio.source_locator().map(|l| l.url.clone()),
            ),
            stats: self.monitor.snapshot(),
        }
    }
}
