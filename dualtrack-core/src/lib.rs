//! # dualtrack core
//!
//! Track model, format catalog, error types and the contracts of the
//! collaborators the player talks to (format resolver, watch history).

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod history;
pub mod resolver;
pub mod track;

// Re-export main types
pub use error::{ErrorCategory, PlayerError, PlayerResult, ResolveError};
pub use format::{AvailableFormat, AvailableFormats, Codec, FormatCatalog, FormatDescriptor, FormatSelection};
pub use history::{HistoryLog, HistorySink, WatchEntry};
pub use resolver::{FormatResolver, MediaRef, MediaRequest, PlayableLocator};
pub use track::{format_timestamp, PlaybackState, ReadyState, TrackKind, TrackPair};
