//! Unit tests for the resolver contract and format selection
//!
//! This module exercises the collaborator contracts the way the player uses
//! them: an async resolver behind a trait object, label selection against
//! the formats the backend offers, and request construction from backend
//! metadata.

use async_trait::async_trait;
use dualtrack_core::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Resolver serving a fixed table of `(media_ref, format)` pairs
struct TableResolver {
    table: HashMap<(String, String), String>,
    delay: Duration,
}

#[async_trait]
impl FormatResolver for TableResolver {
    async fn resolve(
        &self,
        media_ref: &MediaRef,
        format_id: Option<&str>,
    ) -> Result<PlayableLocator, ResolveError> {
        tokio::time::sleep(self.delay).await;
        let format = format_id.unwrap_or("default");
        self.table
            .get(&(media_ref.as_str().to_string(), format.to_string()))
            .map(|url| PlayableLocator::new(url.clone(), format_id.map(str::to_string)))
            .ok_or_else(|| ResolveError::NotFound {
                reference: format!("{}#{}", media_ref, format),
            })
    }
}

fn table_resolver() -> Arc<dyn FormatResolver> {
    let mut table = HashMap::new();
    table.insert(
        ("watch?v=abc".to_string(), "137".to_string()),
        "https://cdn/abc/137".to_string(),
    );
    table.insert(
        ("watch?v=abc".to_string(), "140".to_string()),
        "https://cdn/abc/140".to_string(),
    );
    table.insert(
        ("watch?v=abc".to_string(), "default".to_string()),
        "https://cdn/abc/best".to_string(),
    );
    Arc::new(TableResolver {
        table,
        delay: Duration::from_millis(300),
    })
}

// ============================================================================
// RESOLVER CONTRACT TESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_resolver_through_trait_object() {
    let resolver = table_resolver();
    let media_ref = MediaRef::from("watch?v=abc");

    let (video, audio) = tokio::join!(
        resolver.resolve(&media_ref, Some("137")),
        resolver.resolve(&media_ref, Some("140")),
    );
    let video = video.unwrap();
    assert_eq!(video.url, "https://cdn/abc/137");
    assert_eq!(video.format_id.as_deref(), Some("137"));
    assert_eq!(audio.unwrap().url, "https://cdn/abc/140");
}

#[tokio::test(start_paused = true)]
async fn test_resolver_default_format() {
    let resolver = table_resolver();
    let locator = resolver
        .resolve(&MediaRef::from("watch?v=abc"), None)
        .await
        .unwrap();
    assert_eq!(locator.url, "https://cdn/abc/best");
    assert!(locator.format_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resolver_failure_wraps_into_player_error() {
    let resolver = table_resolver();
    let error = resolver
        .resolve(&MediaRef::from("watch?v=missing"), Some("137"))
        .await
        .unwrap_err();
    assert!(!error.is_transient());

    let player_error = PlayerError::ResolutionFailed {
        track: TrackKind::Video,
        source: error,
    };
    assert_eq!(
        player_error.to_string(),
        "Could not resolve video stream: media not found: watch?v=missing#137"
    );
    assert!(!player_error.is_recoverable());
    assert!(player_error.is_user_facing());
}

#[test]
fn test_resolve_future_is_pending_until_delay() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let _guard = runtime.enter();
    let resolver = table_resolver();
    let media_ref = MediaRef::from("watch?v=abc");
    let mut task = tokio_test::task::spawn(resolver.resolve(&media_ref, Some("140")));
    tokio_test::assert_pending!(task.poll());
}

// ============================================================================
// FORMAT SELECTION TESTS
// ============================================================================

#[test]
fn test_menu_label_picks_offered_variant() {
    let catalog = FormatCatalog::standard();
    let offered = AvailableFormats::from_ids(["140", "251", "248", "303"]);

    assert_eq!(
        catalog.resolve(TrackKind::Video, "1080p", Some(&offered)),
        Some("248".to_string())
    );
    assert_eq!(
        catalog.resolve(TrackKind::Video, "1080p60", Some(&offered)),
        Some("303".to_string())
    );
    assert_eq!(catalog.resolve(TrackKind::Video, "2160p", Some(&offered)), None);
}

#[test]
fn test_id_of_wrong_kind_is_rejected() {
    let catalog = FormatCatalog::standard();
    assert_eq!(catalog.resolve(TrackKind::Audio, "137", None), None);
    assert_eq!(
        catalog.resolve(TrackKind::Audio, "251", None),
        Some("251".to_string())
    );
}

#[test]
fn test_offered_variants_in_preference_order() {
    let catalog = FormatCatalog::standard();
    let offered = AvailableFormats::from_ids(["251", "140", "137", "136"]);
    let video: Vec<_> = catalog
        .offered(TrackKind::Video, &offered)
        .map(|f| f.id.as_str())
        .collect();
    assert_eq!(video, vec!["136", "137"]);
    let audio: Vec<_> = catalog
        .offered(TrackKind::Audio, &offered)
        .map(|f| f.label())
        .collect();
    assert_eq!(audio, vec!["128kbps", "128kbps"]);
}

#[test]
fn test_request_from_backend_metadata() {
    let json = r#"{
        "title": "Big Buck Bunny",
        "duration": "9:56",
        "formats": [
            {"format_id": "137", "ext": "mp4", "quality": "1080p"},
            {"format_id": "140", "ext": "m4a", "quality": "128k"},
            {"format_id": "251", "ext": "webm", "quality": "160k"},
            {"format_id": "sb0", "ext": "mhtml"}
        ]
    }"#;
    let available = AvailableFormats::from_info_json(json).unwrap();
    assert_eq!(available.duration, Some(596.0));
    assert!(available.contains("137"));
    assert!(!available.contains("140"));
    assert!(!available.contains("sb0"));

    let request = MediaRequest::new("watch?v=bbb")
        .video_format("137")
        .audio_format("251")
        .available_formats(available);
    assert_eq!(request.title_hint.as_deref(), Some("Big Buck Bunny"));
    assert_eq!(request.duration_hint, Some(596.0));
    assert_eq!(request.preferred_video_format.as_deref(), Some("137"));
    assert_eq!(format_timestamp(596.0), "9:56");
}
