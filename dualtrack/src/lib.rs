//! # Dualtrack - Synchronized Dual-Track Playback
//!
//! Dualtrack plays media delivered as two independent streams, one video
//! and one audio, as a single item. Video is the master clock; audio
//! follows it and is pulled back whenever it drifts.
//!
//! ## Key Features
//!
//! - **Transactional transport**: play, seek and format switches wait for
//!   both tracks before resuming, and newer operations supersede older ones
//! - **Per-track format switching**: change video or audio quality without
//!   reloading the other track
//! - **Stall handling**: the audio follows video stalls, and stalls that
//!   never recover are surfaced as errors
//! - **Pluggable backends**: locator resolution and media elements are
//!   traits; simulated elements ship for tests and headless use
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dualtrack::{MediaRequest, Player, SimulationProfile, TrackKind};
//! # use dualtrack::{FormatResolver, MediaRef, PlayableLocator, ResolveError};
//! # use std::sync::Arc;
//! # struct Cdn;
//! # #[async_trait::async_trait]
//! # impl FormatResolver for Cdn {
//! #     async fn resolve(&self, media_ref: &MediaRef, format_id: Option<&str>)
//! #         -> Result<PlayableLocator, ResolveError> {
//! #         Ok(PlayableLocator::new(format!("https://cdn/{}", media_ref), format_id.map(String::from)))
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (builder, _controls) = Player::builder()
//!         .resolver(Arc::new(Cdn))
//!         .with_simulated_elements(SimulationProfile::default());
//!     let player = builder.build()?;
//!
//!     // Load an item and start playing
//!     player.initialize(MediaRequest::new("dQw4w9WgXcQ").video_format("1080p")).await?;
//!     player.play().await?;
//!
//!     // Jump ahead, then switch video quality in place
//!     player.seek(42.0).await?;
//!     player.set_format(TrackKind::Video, "720p").await?;
//!
//!     println!("{}", player.snapshot());
//!     player.teardown().await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use dualtrack_core::{
    format_timestamp, AvailableFormat, AvailableFormats, Codec, ErrorCategory, FormatCatalog,
    FormatDescriptor, FormatResolver, FormatSelection, HistoryLog, HistorySink, MediaRef,
    MediaRequest, PlayableLocator, PlaybackState, PlayerError, PlayerResult, ReadyState,
    ResolveError, TrackKind, TrackPair, WatchEntry,
};

pub use dualtrack_media::{
    MediaElement, SimulatedControl, SimulatedElement, SimulationProfile, TrackEvent,
    TrackEventKind, TrackEventSink, TrackSignal,
};

pub use dualtrack_diagnostics::{DebugLogger, SyncStats};

// Public API modules
pub mod config;
pub mod event;
pub mod player;
pub mod snapshot;

mod session;
mod transaction;

// Re-export main API types
pub use config::PlayerConfig;
pub use event::{PlayerEvent, PlayerEventStream};
pub use player::{Player, PlayerBuilder};
pub use snapshot::PlayerSnapshot;
pub use transaction::OperationToken;
