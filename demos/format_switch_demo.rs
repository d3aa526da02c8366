//! Format Switch Demo
//!
//! Shows per-track quality changes during playback:
//! - Choosing variants from the formats a backend lists for an item
//! - Switching video quality without touching the audio source
//! - A newer seek superseding a switch still in flight
//! - Recovering with `retry` after a variant fails to resolve

use async_trait::async_trait;
use dualtrack::{
    AvailableFormats, DebugLogger, FormatCatalog, FormatResolver, MediaRef, MediaRequest,
    PlayableLocator, Player, PlayerConfig, ResolveError, SimulationProfile, TrackKind,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const INFO_JSON: &str = r#"{
    "title": "Sintel",
    "duration": "14:48",
    "formats": [
        {"format_id": "140", "ext": "m4a", "quality": "medium"},
        {"format_id": "251", "ext": "webm", "quality": "medium"},
        {"format_id": "137", "ext": "mp4", "quality": "1080p"},
        {"format_id": "136", "ext": "mp4", "quality": "720p"},
        {"format_id": "299", "ext": "mp4", "quality": "1080p60"},
        {"format_id": "303", "ext": "webm", "quality": "1080p60"}
    ]
}"#;

/// Resolver that refuses a configurable set of variants
#[derive(Default)]
struct FlakyResolver {
    refused: Mutex<HashSet<String>>,
}

#[async_trait]
impl FormatResolver for FlakyResolver {
    async fn resolve(
        &self,
        media_ref: &MediaRef,
        format_id: Option<&str>,
    ) -> Result<PlayableLocator, ResolveError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let format = format_id.unwrap_or("best");
        if self.refused.lock().contains(format) {
            return Err(ResolveError::Unavailable {
                reason: format!("variant {} refused", format),
            });
        }
        Ok(PlayableLocator::new(
            format!("https://media.example/{}/{}", media_ref, format),
            format_id.map(str::to_string),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    DebugLogger::new().with_filter("dualtrack=debug").install();

    println!("🚀 Format Switch Demo");
    println!("=====================");

    let available = AvailableFormats::from_info_json(INFO_JSON)?;
    let catalog = FormatCatalog::standard();
    println!("📋 Offered video variants:");
    for format in catalog.offered(TrackKind::Video, &available) {
        println!("   {} -> {} ({})", format.id, format.label(), format.codec);
    }

    let resolver = Arc::new(FlakyResolver::default());
    let (builder, controls) = Player::builder()
        .config(PlayerConfig::responsive())
        .resolver(resolver.clone())
        .catalog(catalog)
        .with_simulated_elements(SimulationProfile::default().with_duration(888.0));
    let player = builder.build()?;

    // ============================================================================
    // Demo 1: Start at 720p
    // ============================================================================
    println!("\n📋 Demo 1: Start at 720p");

    let request = MediaRequest::new("eRsGyueVLvQ")
        .video_format("720p")
        .audio_format("251")
        .available_formats(available);
    player.initialize(request).await?;
    player.play().await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("✅ {} with {:?}", player.snapshot(), player.snapshot().active_formats);

    // ============================================================================
    // Demo 2: Upgrade video in place
    // ============================================================================
    println!("\n📋 Demo 2: Upgrade video to 1080p60");

    player.set_format(TrackKind::Video, "1080p60").await?;
    println!(
        "✅ Video now {:?}, audio still {:?}",
        controls.video.locator_url(),
        controls.audio.locator_url()
    );

    // ============================================================================
    // Demo 3: Seek supersedes an in-flight switch
    // ============================================================================
    println!("\n📋 Demo 3: Seek during a switch");

    let (switch, seek) = tokio::join!(
        player.set_format(TrackKind::Video, "303"),
        player.seek(300.0)
    );
    match switch {
        Ok(()) => println!("⚠️ Switch completed before the seek arrived"),
        Err(e) => println!("✅ Switch gave way: {}", e),
    }
    seek?;
    println!("✅ {}", player.snapshot());

    // ============================================================================
    // Demo 4: Failed variant and retry
    // ============================================================================
    println!("\n📋 Demo 4: Failed variant and retry");

    resolver.refused.lock().insert("137".to_string());
    if let Err(e) = player.set_format(TrackKind::Video, "1080p").await {
        println!("❌ {} (recoverable: {})", e, e.is_recoverable());
    }
    println!("📸 {}", player.snapshot());
    player.retry().await?;
    player.play().await?;
    println!("✅ Back to {}", player.snapshot());

    println!("\n📊 {}", player.stats().to_json()?);
    player.teardown().await?;
    println!("\n🎉 Demo complete");
    Ok(())
}
