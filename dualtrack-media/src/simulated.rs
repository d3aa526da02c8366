//! Simulated media element
//!
//! Models the observable behaviour of a browser-style media element without
//! decoding anything: loads and seeks complete after configurable latencies,
//! the playhead advances with the (tokio) clock while playing and ready, and
//! stalls, faults and clock drift can be injected through a
//! [`SimulatedControl`]. Used for tests, demos and headless sessions.

use crate::element::{MediaElement, TrackEvent, TrackEventSink};
use dualtrack_core::PlayableLocator;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Timing characteristics of a simulated element
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Time from `load` to first data
    pub load_latency: Duration,
    /// Time from `seek` to data at the new playhead
    pub seek_latency: Duration,
    /// Media duration in seconds
    pub duration: f64,
    /// Playhead speed relative to the clock
    pub playback_rate: f64,
    /// Seconds buffered ahead of the playhead once ready
    pub buffer_ahead: f64,
}

impl SimulationProfile {
    /// Fast local resource
    pub fn instant() -> Self {
        Self {
            load_latency: Duration::from_millis(10),
            seek_latency: Duration::from_millis(5),
            ..Self::default()
        }
    }

    /// Slow remote resource
    pub fn slow_network() -> Self {
        Self {
            load_latency: Duration::from_millis(1500),
            seek_latency: Duration::from_millis(600),
            buffer_ahead: 5.0,
            ..Self::default()
        }
    }

    /// Override duration
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// Override seek latency
    pub fn with_seek_latency(mut self, latency: Duration) -> Self {
        self.seek_latency = latency;
        self
    }

    /// Override load latency
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            load_latency: Duration::from_millis(200),
            seek_latency: Duration::from_millis(80),
            duration: 300.0,
            playback_rate: 1.0,
            buffer_ahead: 30.0,
        }
    }
}

#[derive(Debug)]
struct SimState {
    profile: SimulationProfile,
    locator: Option<PlayableLocator>,
    sink: Option<TrackEventSink>,
    playing: bool,
    /// First data arrived for the current locator
    loaded: bool,
    ready: bool,
    stalled: bool,
    failed: bool,
    base_position: f64,
    anchor: Option<Instant>,
    volume: f64,
    muted: bool,
    token: u64,
    load_count: u32,
    seek_count: u32,
    play_count: u32,
}

impl SimState {
    fn advancing(&self) -> bool {
        self.playing && self.ready && !self.stalled && !self.failed && self.locator.is_some()
    }

    fn position(&self) -> f64 {
        match self.anchor {
            Some(anchor) => {
                let elapsed = anchor.elapsed().as_secs_f64() * self.profile.playback_rate;
                (self.base_position + elapsed).min(self.profile.duration)
            }
            None => self.base_position,
        }
    }

    /// Fold elapsed time into the base and restart the clock if still advancing
    fn settle(&mut self) {
        self.base_position = self.position();
        self.anchor = if self.advancing() {
            Some(Instant::now())
        } else {
            None
        };
    }

    fn emit(&self, event: TrackEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    fn buffered_end(&self) -> f64 {
        (self.base_position + self.profile.buffer_ahead).min(self.profile.duration)
    }
}

/// Media element whose behaviour is driven by a [`SimulationProfile`]
#[derive(Debug)]
pub struct SimulatedElement {
    shared: Arc<Mutex<SimState>>,
}

/// Test-side handle to inspect a [`SimulatedElement`] and inject faults
#[derive(Debug, Clone)]
pub struct SimulatedControl {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedElement {
    /// Create an element and its control handle
    pub fn new(profile: SimulationProfile) -> (Self, SimulatedControl) {
        let shared = Arc::new(Mutex::new(SimState {
            profile,
            locator: None,
            sink: None,
            playing: false,
            loaded: false,
            ready: false,
            stalled: false,
            failed: false,
            base_position: 0.0,
            anchor: None,
            volume: 1.0,
            muted: false,
            token: 0,
            load_count: 0,
            seek_count: 0,
            play_count: 0,
        }));
        (
            Self {
                shared: shared.clone(),
            },
            SimulatedControl { shared },
        )
    }

    /// Complete a pending load or seek after `delay`, unless superseded
    fn schedule_ready(&self, delay: Duration, on_load: bool) {
        let shared = self.shared.clone();
        let token = shared.lock().token;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = shared.lock();
            if state.token != token || state.failed {
                return;
            }
            if on_load {
                let duration = state.profile.duration;
                state.emit(TrackEvent::LoadedMetadata { duration });
                state.emit(TrackEvent::LoadedData);
                state.loaded = true;
            }
            state.ready = true;
            state.settle();
            if !on_load {
                let position = state.base_position;
                state.emit(TrackEvent::Seeked { position });
            }
            let buffered_end = state.buffered_end();
            state.emit(TrackEvent::Progress { buffered_end });
            if !state.stalled {
                state.emit(TrackEvent::CanPlay);
            }
        });
    }
}

impl MediaElement for SimulatedElement {
    fn load(&mut self, locator: &PlayableLocator, sink: TrackEventSink) {
        let delay = {
            let mut state = self.shared.lock();
            state.settle();
            state.locator = Some(locator.clone());
            state.sink = Some(sink);
            state.loaded = false;
            state.ready = false;
            state.failed = false;
            state.base_position = 0.0;
            state.anchor = None;
            state.token += 1;
            state.load_count += 1;
            state.profile.load_latency
        };
        self.schedule_ready(delay, true);
    }

    fn unload(&mut self) {
        let mut state = self.shared.lock();
        state.settle();
        state.locator = None;
        state.sink = None;
        state.loaded = false;
        state.ready = false;
        state.playing = false;
        state.anchor = None;
        state.token += 1;
    }

    fn play(&mut self) {
        let mut state = self.shared.lock();
        if !state.playing {
            state.settle();
            state.playing = true;
            state.play_count += 1;
            state.settle();
        }
    }

    fn pause(&mut self) {
        let mut state = self.shared.lock();
        state.settle();
        state.playing = false;
        state.settle();
    }

    fn seek(&mut self, position: f64) {
        let (delay, on_load) = {
            let mut state = self.shared.lock();
            state.settle();
            state.base_position = position.clamp(0.0, state.profile.duration);
            state.ready = false;
            state.anchor = None;
            state.token += 1;
            state.seek_count += 1;
            // A seek issued mid-load still owes the load's metadata
            (state.profile.seek_latency, !state.loaded)
        };
        if self.shared.lock().locator.is_some() {
            self.schedule_ready(delay, on_load);
        }
    }

    fn position(&self) -> f64 {
        self.shared.lock().position()
    }

    fn is_ready(&self) -> bool {
        let state = self.shared.lock();
        state.ready && !state.stalled && !state.failed
    }

    fn set_volume(&mut self, volume: f64) {
        self.shared.lock().volume = volume;
    }

    fn set_muted(&mut self, muted: bool) {
        self.shared.lock().muted = muted;
    }
}

impl SimulatedControl {
    /// Current playhead
    pub fn position(&self) -> f64 {
        self.shared.lock().position()
    }

    /// Whether the playhead is moving
    pub fn is_advancing(&self) -> bool {
        self.shared.lock().advancing()
    }

    /// Whether playback was requested (regardless of buffering)
    pub fn is_playing(&self) -> bool {
        self.shared.lock().playing
    }

    /// URL of the loaded locator
    pub fn locator_url(&self) -> Option<String> {
        self.shared.lock().locator.as_ref().map(|l| l.url.clone())
    }

    /// Number of `load` calls
    pub fn load_count(&self) -> u32 {
        self.shared.lock().load_count
    }

    /// Number of `seek` calls
    pub fn seek_count(&self) -> u32 {
        self.shared.lock().seek_count
    }

    /// Number of pause→play transitions
    pub fn play_count(&self) -> u32 {
        self.shared.lock().play_count
    }

    /// Output volume
    pub fn volume(&self) -> f64 {
        self.shared.lock().volume
    }

    /// Output mute
    pub fn is_muted(&self) -> bool {
        self.shared.lock().muted
    }

    /// Change playhead speed, e.g. to produce drift against the other track
    pub fn set_playback_rate(&self, rate: f64) {
        let mut state = self.shared.lock();
        state.settle();
        state.profile.playback_rate = rate;
    }

    /// Change seek latency for subsequent seeks
    pub fn set_seek_latency(&self, latency: Duration) {
        self.shared.lock().profile.seek_latency = latency;
    }

    /// Change load latency for subsequent loads
    pub fn set_load_latency(&self, latency: Duration) {
        self.shared.lock().profile.load_latency = latency;
    }

    /// Jump the playhead without a seek, as a buffering hiccup would
    pub fn nudge(&self, delta: f64) {
        let mut state = self.shared.lock();
        state.settle();
        state.base_position = (state.base_position + delta).clamp(0.0, state.profile.duration);
        debug!("🧪 Nudged simulated playhead by {:+.3}s", delta);
    }

    /// Run out of data: the playhead freezes and `Waiting` is reported
    pub fn stall(&self) {
        let mut state = self.shared.lock();
        state.settle();
        state.stalled = true;
        state.anchor = None;
        state.emit(TrackEvent::Waiting);
    }

    /// Data arrives again after a stall
    pub fn recover(&self) {
        let mut state = self.shared.lock();
        state.stalled = false;
        state.settle();
        if state.ready {
            state.emit(TrackEvent::CanPlay);
        }
    }

    /// Report a fatal fault, e.g. an expired locator answering 403
    pub fn fail(&self, reason: &str) {
        let mut state = self.shared.lock();
        state.settle();
        state.failed = true;
        state.anchor = None;
        state.emit(TrackEvent::Error {
            reason: reason.to_string(),
        });
    }

    /// Jump to the end and report `Ended`
    pub fn finish(&self) {
        let mut state = self.shared.lock();
        state.base_position = state.profile.duration;
        state.playing = false;
        state.anchor = None;
        state.emit(TrackEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::TrackSignal;
    use dualtrack_core::TrackKind;
    use tokio::sync::mpsc;

    fn loaded(profile: SimulationProfile) -> (
        SimulatedElement,
        SimulatedControl,
        mpsc::UnboundedReceiver<TrackSignal>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (mut element, control) = SimulatedElement::new(profile);
        element.load(
            &PlayableLocator::new("https://cdn/sim", None),
            TrackEventSink::new(TrackKind::Video, 1, tx),
        );
        (element, control, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TrackSignal>) -> TrackEvent {
        rx.recv().await.unwrap().event
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_reports_metadata_then_ready() {
        let (element, _control, mut rx) = loaded(SimulationProfile::default().with_duration(120.0));
        assert!(!element.is_ready());

        assert_eq!(
            next_event(&mut rx).await,
            TrackEvent::LoadedMetadata { duration: 120.0 }
        );
        assert_eq!(next_event(&mut rx).await, TrackEvent::LoadedData);
        assert!(matches!(next_event(&mut rx).await, TrackEvent::Progress { .. }));
        assert_eq!(next_event(&mut rx).await, TrackEvent::CanPlay);
        assert!(element.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_playhead_advances_only_when_ready() {
        let (mut element, control, _rx) = loaded(SimulationProfile::default());
        element.play();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(element.position(), 0.0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let position = element.position();
        assert!((position - 1.0).abs() < 0.01, "position {}", position);
        assert!(control.is_advancing());

        element.pause();
        let paused_at = element.position();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(element.position(), paused_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_seek_cancels_older_completion() {
        let (mut element, control, mut rx) = loaded(SimulationProfile::default());
        while next_event(&mut rx).await != TrackEvent::CanPlay {}

        element.seek(5.0);
        element.seek(50.0);
        let mut seeked = Vec::new();
        loop {
            match next_event(&mut rx).await {
                TrackEvent::Seeked { position } => seeked.push(position),
                TrackEvent::CanPlay => break,
                _ => {}
            }
        }
        assert_eq!(seeked, vec![50.0]);
        assert_eq!(control.seek_count(), 2);
        assert_eq!(element.position(), 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_during_load_still_reports_metadata() {
        let (mut element, _control, mut rx) = loaded(SimulationProfile::default());
        element.seek(30.0);
        assert_eq!(
            next_event(&mut rx).await,
            TrackEvent::LoadedMetadata { duration: 300.0 }
        );
        assert_eq!(next_event(&mut rx).await, TrackEvent::LoadedData);
        while next_event(&mut rx).await != TrackEvent::CanPlay {}
        assert_eq!(element.position(), 30.0);
        assert!(element.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_freezes_playhead() {
        let (mut element, control, mut rx) = loaded(SimulationProfile::instant());
        while next_event(&mut rx).await != TrackEvent::CanPlay {}
        element.play();
        tokio::time::sleep(Duration::from_secs(2)).await;

        control.stall();
        assert_eq!(next_event(&mut rx).await, TrackEvent::Waiting);
        let frozen = element.position();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(element.position(), frozen);
        assert!(!element.is_ready());

        control.recover();
        assert_eq!(next_event(&mut rx).await, TrackEvent::CanPlay);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(element.position() > frozen + 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_is_reported() {
        let (element, control, mut rx) = loaded(SimulationProfile::instant());
        control.fail("HTTP 403");
        assert_eq!(
            next_event(&mut rx).await,
            TrackEvent::Error {
                reason: "HTTP 403".to_string()
            }
        );
        assert!(!element.is_ready());
    }
}
