//! Unit tests for track handles driving simulated elements
//!
//! This module covers handle lifecycle, epoch tagging of element events and
//! the control surface used to inject stalls, faults and drift.

use dualtrack_core::{PlayableLocator, ReadyState, TrackKind};
use dualtrack_media::*;
use std::time::Duration;
use tokio::sync::mpsc;

fn simulated_handle(
    kind: TrackKind,
    profile: SimulationProfile,
) -> (
    MediaTrackHandle,
    SimulatedControl,
    mpsc::UnboundedReceiver<TrackSignal>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (element, control) = SimulatedElement::new(profile);
    (MediaTrackHandle::new(kind, Box::new(element), tx), control, rx)
}

async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<TrackSignal>,
    kind: TrackEventKind,
) -> TrackSignal {
    loop {
        let signal = rx.recv().await.expect("session channel closed");
        if signal.event.kind() == kind {
            return signal;
        }
    }
}

// ============================================================================
// LIFECYCLE TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_handle_becomes_ready_after_load() {
    let (mut handle, control, mut rx) =
        simulated_handle(TrackKind::Video, SimulationProfile::default());
    assert_eq!(handle.ready_state(), ReadyState::Empty);

    handle.load(PlayableLocator::new("https://cdn/video-137", Some("137".into())));
    assert!(!handle.confirm_ready());

    let signal = wait_for(&mut rx, TrackEventKind::CanPlay).await;
    assert!(handle.accepts(&signal));
    assert!(handle.confirm_ready());
    assert_eq!(control.load_count(), 1);
    assert_eq!(control.locator_url().as_deref(), Some("https://cdn/video-137"));
}

#[tokio::test(start_paused = true)]
async fn test_stale_load_events_are_rejected() {
    let (mut handle, _control, mut rx) = simulated_handle(
        TrackKind::Audio,
        SimulationProfile::default().with_load_latency(Duration::from_millis(50)),
    );
    handle.load(PlayableLocator::new("https://cdn/audio-140", None));
    let stale_epoch = handle.epoch();
    handle.load(PlayableLocator::new("https://cdn/audio-251", None));

    let signal = wait_for(&mut rx, TrackEventKind::CanPlay).await;
    assert_ne!(signal.epoch, stale_epoch);
    assert!(handle.accepts(&signal));

    let forged = TrackSignal {
        track: TrackKind::Audio,
        epoch: stale_epoch,
        event: TrackEvent::CanPlay,
    };
    assert!(!handle.accepts(&forged));
}

#[tokio::test(start_paused = true)]
async fn test_signal_from_other_track_is_rejected() {
    let (mut handle, _control, mut rx) =
        simulated_handle(TrackKind::Video, SimulationProfile::instant());
    handle.load(PlayableLocator::new("https://cdn/v", None));
    let signal = wait_for(&mut rx, TrackEventKind::CanPlay).await;

    let foreign = TrackSignal {
        track: TrackKind::Audio,
        ..signal
    };
    assert!(!handle.accepts(&foreign));
}

// ============================================================================
// PLAYBACK CONTROL TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_playhead_follows_clock_and_rate() {
    let (mut handle, control, mut rx) =
        simulated_handle(TrackKind::Audio, SimulationProfile::instant());
    handle.load(PlayableLocator::new("https://cdn/a", None));
    wait_for(&mut rx, TrackEventKind::CanPlay).await;

    handle.play();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!((handle.current_position() - 2.0).abs() < 0.01);

    control.set_playback_rate(1.5);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!((handle.current_position() - 5.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn test_seek_reports_seeked_then_can_play() {
    let (mut handle, control, mut rx) =
        simulated_handle(TrackKind::Video, SimulationProfile::instant());
    handle.load(PlayableLocator::new("https://cdn/v", None));
    wait_for(&mut rx, TrackEventKind::CanPlay).await;
    handle.set_ready_state(ReadyState::CanPlay);

    handle.seek(42.0);
    assert_eq!(handle.ready_state(), ReadyState::Loading);
    assert!(!handle.confirm_ready());

    let seeked = wait_for(&mut rx, TrackEventKind::Seeked).await;
    assert_eq!(seeked.event, TrackEvent::Seeked { position: 42.0 });
    wait_for(&mut rx, TrackEventKind::CanPlay).await;
    assert!(handle.confirm_ready());
    assert_eq!(control.seek_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nudge_creates_drift() {
    let (mut handle, control, mut rx) =
        simulated_handle(TrackKind::Audio, SimulationProfile::instant());
    handle.load(PlayableLocator::new("https://cdn/a", None));
    wait_for(&mut rx, TrackEventKind::CanPlay).await;

    handle.seek(10.0);
    wait_for(&mut rx, TrackEventKind::CanPlay).await;
    control.nudge(0.4);
    assert!((handle.current_position() - 10.4).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_audio_volume_and_mute_reach_element() {
    let (mut audio, control, _rx) =
        simulated_handle(TrackKind::Audio, SimulationProfile::instant());
    audio.set_volume(1.7);
    assert_eq!(control.volume(), 1.0);
    audio.set_volume(0.25);
    assert_eq!(control.volume(), 0.25);
    audio.set_muted(true);
    assert!(control.is_muted());
}

#[tokio::test(start_paused = true)]
async fn test_video_element_stays_muted() {
    let (mut video, control, _rx) =
        simulated_handle(TrackKind::Video, SimulationProfile::instant());
    assert!(control.is_muted());
    video.set_muted(false);
    video.set_volume(0.3);
    assert!(control.is_muted());
    assert_eq!(control.volume(), 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_fault_and_end_are_reported() {
    let (mut handle, control, mut rx) =
        simulated_handle(TrackKind::Video, SimulationProfile::instant().with_duration(20.0));
    handle.load(PlayableLocator::new("https://cdn/v", None));
    wait_for(&mut rx, TrackEventKind::CanPlay).await;

    control.finish();
    wait_for(&mut rx, TrackEventKind::Ended).await;
    assert_eq!(handle.current_position(), 20.0);

    control.fail("decode error");
    let signal = wait_for(&mut rx, TrackEventKind::Error).await;
    assert!(handle.accepts(&signal));
    assert!(!handle.confirm_ready());
}
