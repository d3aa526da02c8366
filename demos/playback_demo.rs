//! Playback Demo
//!
//! Drives a full session over simulated elements:
//! - Initialization with a title and channel for history
//! - Play, pause and seek transactions
//! - Drift injection and automatic re-alignment
//! - A video stall the audio waits out
//! - Snapshot and sync statistics as JSON

use async_trait::async_trait;
use dualtrack::{
    DebugLogger, FormatResolver, HistoryLog, MediaRef, MediaRequest, PlayableLocator, Player,
    PlayerEvent, ResolveError, SimulationProfile,
};
use std::sync::Arc;
use std::time::Duration;

/// Resolver standing in for the extraction backend
struct DemoResolver;

#[async_trait]
impl FormatResolver for DemoResolver {
    async fn resolve(
        &self,
        media_ref: &MediaRef,
        format_id: Option<&str>,
    ) -> Result<PlayableLocator, ResolveError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let format = format_id.unwrap_or("best");
        Ok(PlayableLocator::new(
            format!("https://media.example/{}/{}.mp4", media_ref, format),
            format_id.map(str::to_string),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    DebugLogger::init_logging();

    println!("🚀 Dual-Track Playback Demo");
    println!("===========================");

    let history = Arc::new(HistoryLog::new());
    let (builder, controls) = Player::builder()
        .resolver(Arc::new(DemoResolver))
        .history(history.clone())
        .volume(0.8)
        .with_simulated_elements(SimulationProfile::default());
    let player = builder.build()?;
    println!("✅ Session {} started", player.session_id());

    let mut events = player.events();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                PlayerEvent::StateChanged { from, to } => println!("   🎬 {} -> {}", from, to),
                PlayerEvent::DriftCorrected { drift, position } => {
                    println!("   🎚️ corrected {:+.3}s drift at {:.2}s", drift, position)
                }
                other if other.is_sync_event() => println!("   🔔 {:?}", other),
                _ => {}
            }
        }
    });

    // ============================================================================
    // Demo 1: Initialize and play
    // ============================================================================
    println!("\n📋 Demo 1: Initialize and play");

    let request = MediaRequest::new("aqz-KE-bpKQ")
        .hints("Big Buck Bunny", "Blender")
        .duration_hint(596.0);
    player.initialize(request).await?;
    println!("✅ Ready: {}", player.snapshot());

    player.play().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("✅ Playing: {}", player.snapshot());

    // ============================================================================
    // Demo 2: Seek and pause
    // ============================================================================
    println!("\n📋 Demo 2: Seek and pause");

    player.seek(120.0).await?;
    println!("✅ After seek: {}", player.snapshot());
    player.pause().await?;
    println!("✅ Paused: {}", player.snapshot());
    player.play().await?;

    // ============================================================================
    // Demo 3: Drift and stalls
    // ============================================================================
    println!("\n📋 Demo 3: Drift and stalls");

    controls.audio.nudge(0.4);
    tokio::time::sleep(Duration::from_millis(600)).await;
    println!(
        "✅ Audio {:.2}s / video {:.2}s after correction",
        controls.audio.position(),
        controls.video.position()
    );

    controls.video.stall();
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("⏸️ During stall: {}", player.snapshot());
    controls.video.recover();
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("✅ Recovered: {}", player.snapshot());

    // ============================================================================
    // Demo 4: Reporting
    // ============================================================================
    println!("\n📋 Demo 4: Reporting");

    println!("📊 Sync stats: {}", player.stats().to_json()?);
    println!("📸 Snapshot: {}", serde_json::to_string_pretty(&player.snapshot())?);
    for entry in history.entries() {
        println!(
            "👀 Watched {} ({}) at {}",
            entry.media_ref,
            entry.title_hint.as_deref().unwrap_or("untitled"),
            entry.timestamp
        );
    }

    player.teardown().await?;
    println!("\n🎉 Demo complete");
    Ok(())
}
