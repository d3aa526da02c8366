//! # Dualtrack Media
//!
//! Media element contract, per-track handles and simulated elements for
//! dualtrack. Elements report their lifecycle asynchronously through a
//! [`TrackEventSink`]; handles tag every load with an epoch so the session
//! can ignore events from resources it already replaced.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod element;
pub mod handle;
pub mod simulated;

// Re-export main types
pub use element::{MediaElement, TrackEvent, TrackEventKind, TrackEventSink, TrackSignal};
pub use handle::MediaTrackHandle;
pub use simulated::{SimulatedControl, SimulatedElement, SimulationProfile};
