//! Format catalog and per-track format selection
//!
//! The extraction backend identifies every stream variant by a numeric
//! format id. Adaptive variants are either video-only or audio-only, which is
//! why playback needs two tracks in the first place. The catalog below maps
//! the ids the player understands to a track kind, codec and quality label.

use crate::track::TrackKind;
use serde::{Deserialize, Serialize};

/// Codec of a stream variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 / AVC
    H264,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// Opus audio
    Opus,
    /// AAC audio
    Aac,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::H264 => write!(f, "h264"),
            Codec::Vp9 => write!(f, "vp9"),
            Codec::Av1 => write!(f, "av1"),
            Codec::Opus => write!(f, "opus"),
            Codec::Aac => write!(f, "aac"),
        }
    }
}

/// One known stream variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Backend format id
    pub id: String,
    /// Track the variant belongs to
    pub kind: TrackKind,
    /// Quality string (`"1080p"`, `"128kbps"`)
    pub quality: String,
    /// Codec
    pub codec: Codec,
    /// High frame rate variant (video only)
    pub hfr: bool,
}

impl FormatDescriptor {
    fn video(id: &str, quality: &str, codec: Codec, hfr: bool) -> Self {
        Self {
            id: id.to_string(),
            kind: TrackKind::Video,
            quality: quality.to_string(),
            codec,
            hfr,
        }
    }

    fn audio(id: &str, quality: &str, codec: Codec) -> Self {
        Self {
            id: id.to_string(),
            kind: TrackKind::Audio,
            quality: quality.to_string(),
            codec,
            hfr: false,
        }
    }

    /// Menu label, `"1080p60"` for high frame rate variants
    pub fn label(&self) -> String {
        if self.hfr {
            format!("{}60", self.quality)
        } else {
            self.quality.clone()
        }
    }
}

/// Table of stream variants the player can select
#[derive(Debug, Clone)]
pub struct FormatCatalog {
    formats: Vec<FormatDescriptor>,
}

impl FormatCatalog {
    /// Catalog of the adaptive variants served by the upstream platform
    pub fn standard() -> Self {
        use Codec::*;
        let formats = vec![
            // Audio
            FormatDescriptor::audio("249", "50kbps", Opus),
            FormatDescriptor::audio("250", "70kbps", Opus),
            FormatDescriptor::audio("251", "128kbps", Opus),
            FormatDescriptor::audio("140", "128kbps", Aac),
            // H.264
            FormatDescriptor::video("135", "480p", H264, false),
            FormatDescriptor::video("136", "720p", H264, false),
            FormatDescriptor::video("137", "1080p", H264, false),
            FormatDescriptor::video("298", "720p", H264, true),
            FormatDescriptor::video("299", "1080p", H264, true),
            FormatDescriptor::video("304", "1440p", H264, true),
            FormatDescriptor::video("305", "2160p", H264, true),
            // VP9
            FormatDescriptor::video("244", "480p", Vp9, false),
            FormatDescriptor::video("247", "720p", Vp9, false),
            FormatDescriptor::video("248", "1080p", Vp9, false),
            FormatDescriptor::video("271", "1440p", Vp9, false),
            FormatDescriptor::video("313", "2160p", Vp9, false),
            FormatDescriptor::video("333", "480p", Vp9, true),
            FormatDescriptor::video("302", "720p", Vp9, true),
            FormatDescriptor::video("303", "1080p", Vp9, true),
            FormatDescriptor::video("308", "1440p", Vp9, true),
            FormatDescriptor::video("315", "2160p", Vp9, true),
            // AV1
            FormatDescriptor::video("397", "480p", Av1, false),
            FormatDescriptor::video("398", "720p", Av1, false),
            FormatDescriptor::video("399", "1080p", Av1, false),
            FormatDescriptor::video("401", "2160p", Av1, false),
            FormatDescriptor::video("698", "720p", Av1, true),
            FormatDescriptor::video("699", "1080p", Av1, true),
            FormatDescriptor::video("700", "1440p", Av1, true),
            FormatDescriptor::video("701", "2160p", Av1, true),
        ];
        Self { formats }
    }

    /// Look a variant up by id
    pub fn lookup(&self, id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.id == id)
    }

    /// Variants of one track kind, in preference order
    pub fn formats(&self, kind: TrackKind) -> impl Iterator<Item = &FormatDescriptor> {
        self.formats.iter().filter(move |f| f.kind == kind)
    }

    /// Variants of one kind that the backend offers for a given item
    pub fn offered<'a>(
        &'a self,
        kind: TrackKind,
        available: &'a AvailableFormats,
    ) -> impl Iterator<Item = &'a FormatDescriptor> {
        self.formats(kind).filter(move |f| available.contains(&f.id))
    }

    /// Resolve an id or a menu label (`"1080p60"`) to a format id for a track
    ///
    /// Ids are accepted when the catalog knows them for `kind`, or when the
    /// backend listed them in `available`. Labels pick the first matching
    /// variant in preference order, restricted to `available` when given.
    pub fn resolve(
        &self,
        kind: TrackKind,
        id_or_label: &str,
        available: Option<&AvailableFormats>,
    ) -> Option<String> {
        if let Some(descriptor) = self.lookup(id_or_label) {
            let offered = available.map_or(true, |a| a.contains(&descriptor.id));
            if descriptor.kind == kind && offered {
                return Some(descriptor.id.clone());
            }
            return None;
        }
        if let Some(available) = available {
            if available.contains(id_or_label) {
                return Some(id_or_label.to_string());
            }
        }
        self.formats(kind)
            .filter(|f| f.label().eq_ignore_ascii_case(id_or_label))
            .find(|f| available.map_or(true, |a| a.contains(&f.id)))
            .map(|f| f.id.clone())
    }
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Which variant is active on each track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSelection {
    /// Active video variant, `None` for the resolver default
    pub video_format_id: Option<String>,
    /// Active audio variant, `None` for the resolver default
    pub audio_format_id: Option<String>,
}

impl FormatSelection {
    /// Create a selection from explicit ids
    pub fn new(video: Option<String>, audio: Option<String>) -> Self {
        Self {
            video_format_id: video,
            audio_format_id: audio,
        }
    }

    /// 1080p H.264 video with 128 kbps AAC audio
    pub fn platform_defaults() -> Self {
        Self::new(Some("137".to_string()), Some("140".to_string()))
    }

    /// Active id for a track
    pub fn get(&self, kind: TrackKind) -> Option<&str> {
        match kind {
            TrackKind::Video => self.video_format_id.as_deref(),
            TrackKind::Audio => self.audio_format_id.as_deref(),
        }
    }

    /// Replace the id for one track
    pub fn set(&mut self, kind: TrackKind, id: Option<String>) {
        match kind {
            TrackKind::Video => self.video_format_id = id,
            TrackKind::Audio => self.audio_format_id = id,
        }
    }
}

/// Format entry as listed by the extraction backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableFormat {
    /// Backend format id
    pub format_id: String,
    /// Container extension
    pub ext: String,
    /// Quality string reported by the backend
    #[serde(default)]
    pub quality: String,
}

/// Format list and hints the backend reports for one item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailableFormats {
    /// Title reported by the backend
    pub title: Option<String>,
    /// Duration in seconds, when known
    pub duration: Option<f64>,
    /// Offered variants
    pub formats: Vec<AvailableFormat>,
}

#[derive(Deserialize)]
struct InfoPayload {
    title: Option<String>,
    #[serde(default)]
    duration: Option<serde_json::Value>,
    #[serde(default)]
    formats: Vec<AvailableFormat>,
}

impl AvailableFormats {
    /// Build from a plain list of ids
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: None,
            duration: None,
            formats: ids
                .into_iter()
                .map(|id| AvailableFormat {
                    format_id: id.into(),
                    ext: String::new(),
                    quality: String::new(),
                })
                .collect(),
        }
    }

    /// Parse the backend's video info payload
    ///
    /// Only `mp4` and `webm` containers are kept; `duration` may be a number
    /// of seconds or a `M:SS` clock string.
    pub fn from_info_json(json: &str) -> Result<Self, serde_json::Error> {
        let payload: InfoPayload = serde_json::from_str(json)?;
        let duration = payload.duration.and_then(|value| match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => parse_clock(&s),
            _ => None,
        });
        let formats = payload
            .formats
            .into_iter()
            .filter(|f| f.ext == "mp4" || f.ext == "webm")
            .collect();
        Ok(Self {
            title: payload.title,
            duration,
            formats,
        })
    }

    /// Whether the backend offers a variant
    pub fn contains(&self, id: &str) -> bool {
        self.formats.iter().any(|f| f.format_id == id)
    }
}

/// Parse `M:SS` or `H:MM:SS` into seconds
fn parse_clock(clock: &str) -> Option<f64> {
    clock
        .split(':')
        .try_fold(0.0, |acc, part| part.trim().parse::<f64>().ok().map(|v| acc * 60.0 + v))
}
