//! Format resolver contract and media requests

use crate::error::ResolveError;
use crate::format::AvailableFormats;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Logical reference to one playable item (typically the item's page URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef(String);

impl MediaRef {
    /// Wrap a reference
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Borrow the reference string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MediaRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Resolved, directly fetchable reference to one track's media data
///
/// Locators are time-limited upstream; expiry is only observed when the
/// element fails to fetch from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableLocator {
    /// Fetchable URL
    pub url: String,
    /// Format the locator serves, `None` if the resolver picked its default
    pub format_id: Option<String>,
    /// When the resolver produced it
    pub resolved_at: Instant,
}

impl PlayableLocator {
    /// Create a locator resolved now
    pub fn new(url: impl Into<String>, format_id: Option<String>) -> Self {
        Self {
            url: url.into(),
            format_id,
            resolved_at: Instant::now(),
        }
    }

    /// Age of the locator
    pub fn age(&self) -> std::time::Duration {
        self.resolved_at.elapsed()
    }
}

/// Maps a media reference and format id to a playable locator
///
/// Implementations typically shell out to the extraction backend. A `None`
/// format asks for the resolver's default (highest) quality.
#[async_trait]
pub trait FormatResolver: Send + Sync {
    /// Resolve one track's locator
    async fn resolve(
        &self,
        media_ref: &MediaRef,
        format_id: Option<&str>,
    ) -> Result<PlayableLocator, ResolveError>;
}

/// Everything the player needs to start a session for one item
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRequest {
    /// Item to play
    pub media_ref: MediaRef,
    /// Preferred video variant (id or label)
    pub preferred_video_format: Option<String>,
    /// Preferred audio variant (id or label)
    pub preferred_audio_format: Option<String>,
    /// Title passed through to the history collaborator
    pub title_hint: Option<String>,
    /// Channel passed through to the history collaborator
    pub channel_hint: Option<String>,
    /// Duration known from metadata before the element reports one
    pub duration_hint: Option<f64>,
    /// Variants the backend offers for this item
    pub available_formats: Option<AvailableFormats>,
}

impl MediaRequest {
    /// Request with resolver-default formats and no hints
    pub fn new(media_ref: impl Into<MediaRef>) -> Self {
        Self {
            media_ref: media_ref.into(),
            preferred_video_format: None,
            preferred_audio_format: None,
            title_hint: None,
            channel_hint: None,
            duration_hint: None,
            available_formats: None,
        }
    }

    /// Set preferred video variant
    pub fn video_format(mut self, id: &str) -> Self {
        self.preferred_video_format = Some(id.to_string());
        self
    }

    /// Set preferred audio variant
    pub fn audio_format(mut self, id: &str) -> Self {
        self.preferred_audio_format = Some(id.to_string());
        self
    }

    /// Set title and channel hints for history
    pub fn hints(mut self, title: &str, channel: &str) -> Self {
        self.title_hint = Some(title.to_string());
        self.channel_hint = Some(channel.to_string());
        self
    }

    /// Set duration hint in seconds
    pub fn duration_hint(mut self, seconds: f64) -> Self {
        self.duration_hint = Some(seconds);
        self
    }

    /// Attach the backend's format list; its title and duration fill unset hints
    pub fn available_formats(mut self, available: AvailableFormats) -> Self {
        if self.title_hint.is_none() {
            self.title_hint = available.title.clone();
        }
        if self.duration_hint.is_none() {
            self.duration_hint = available.duration;
        }
        self.available_formats = Some(available);
        self
    }
}
