//! Error types for dualtrack

use crate::track::TrackKind;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`FormatResolver`](crate::FormatResolver)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The media reference or format does not exist upstream
    #[error("media not found: {reference}")]
    NotFound {
        /// Reference (or reference/format pair) that was not found
        reference: String,
    },

    /// A previously issued locator is no longer valid
    #[error("locator expired")]
    Expired,

    /// The resolver backend could not answer right now
    #[error("resolver unavailable: {reason}")]
    Unavailable {
        /// Reason reported by the backend
        reason: String,
    },
}

impl ResolveError {
    /// Whether asking again later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolveError::Expired | ResolveError::Unavailable { .. })
    }
}

/// Main error type for player operations
#[derive(Error, Debug, Clone)]
pub enum PlayerError {
    /// The format resolver could not produce a locator for a track
    #[error("Could not resolve {track} stream: {source}")]
    ResolutionFailed {
        /// Track whose locator failed to resolve
        track: TrackKind,
        /// Underlying resolver failure
        #[source]
        source: ResolveError,
    },

    /// A media element reported a non-recoverable decode or network fault
    #[error("Fatal {track} track error: {reason}")]
    TrackFatalError {
        /// Affected track
        track: TrackKind,
        /// Reason reported by the element
        reason: String,
    },

    /// A track stopped delivering data
    #[error("{track} track stalled for {waited:?}")]
    TrackStall {
        /// Affected track
        track: TrackKind,
        /// How long the stall has lasted so far
        waited: Duration,
    },

    /// A newer operation replaced this one before it completed
    #[error("Operation superseded: {operation}")]
    Superseded {
        /// Operation that was superseded
        operation: String,
    },

    /// The player was torn down while the operation was pending
    #[error("Player has been torn down")]
    TornDown,

    /// Operation not valid in the current playback state
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// States in which the operation is accepted
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Format id (or quality label) not available for a track
    #[error("Unknown {track} format: {format_id}")]
    UnknownFormat {
        /// Track the format was requested for
        track: TrackKind,
        /// Requested id or label
        format_id: String,
    },

    /// A transaction did not complete in time
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },
}

/// Result type alias for player operations
pub type PlayerResult<T> = Result<T, PlayerError>;

impl PlayerError {
    /// Check whether the session can continue (or be retried) after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::ResolutionFailed { source, .. } => source.is_transient(),
            PlayerError::TrackStall { .. } => true,
            PlayerError::Superseded { .. } => true,
            PlayerError::InvalidState { .. } => true,
            PlayerError::UnknownFormat { .. } => true,
            PlayerError::Timeout { .. } => true,
            PlayerError::TrackFatalError { .. } => false,
            PlayerError::TornDown => false,
            PlayerError::MissingConfiguration { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            PlayerError::ResolutionFailed { .. } => ErrorCategory::Resolution,
            PlayerError::TrackFatalError { .. } => ErrorCategory::Track,
            PlayerError::TrackStall { .. } => ErrorCategory::Track,
            PlayerError::Superseded { .. } => ErrorCategory::Transaction,
            PlayerError::Timeout { .. } => ErrorCategory::Transaction,
            PlayerError::TornDown => ErrorCategory::State,
            PlayerError::InvalidState { .. } => ErrorCategory::State,
            PlayerError::UnknownFormat { .. } => ErrorCategory::Configuration,
            PlayerError::MissingConfiguration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Track the error is attributed to, if any
    pub fn track(&self) -> Option<TrackKind> {
        match self {
            PlayerError::ResolutionFailed { track, .. }
            | PlayerError::TrackFatalError { track, .. }
            | PlayerError::TrackStall { track, .. }
            | PlayerError::UnknownFormat { track, .. } => Some(*track),
            _ => None,
        }
    }

    /// Whether the transport UI should show a blocking message with a retry action
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            PlayerError::ResolutionFailed { .. }
                | PlayerError::TrackFatalError { .. }
                | PlayerError::Timeout { .. }
        )
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Locator resolution failures
    Resolution,
    /// Track-level playback faults
    Track,
    /// Seek/switch/play transaction outcomes
    Transaction,
    /// Session lifecycle errors
    State,
    /// Configuration and parameter errors
    Configuration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let resolution = PlayerError::ResolutionFailed {
            track: TrackKind::Audio,
            source: ResolveError::Unavailable {
                reason: "backend busy".to_string(),
            },
        };
        assert_eq!(resolution.category(), ErrorCategory::Resolution);
        assert!(resolution.is_recoverable());
        assert!(resolution.is_user_facing());
        assert_eq!(resolution.track(), Some(TrackKind::Audio));

        let fatal = PlayerError::TrackFatalError {
            track: TrackKind::Video,
            reason: "decode error".to_string(),
        };
        assert_eq!(fatal.category(), ErrorCategory::Track);
        assert!(!fatal.is_recoverable());

        let superseded = PlayerError::Superseded {
            operation: "seek".to_string(),
        };
        assert!(!superseded.is_user_facing());
        assert_eq!(superseded.track(), None);
    }

    #[test]
    fn test_not_found_is_not_transient() {
        let error = PlayerError::ResolutionFailed {
            track: TrackKind::Video,
            source: ResolveError::NotFound {
                reference: "abc".to_string(),
            },
        };
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = PlayerError::ResolutionFailed {
            track: TrackKind::Video,
            source: ResolveError::Expired,
        };
        assert_eq!(
            error.to_string(),
            "Could not resolve video stream: locator expired"
        );

        let error = PlayerError::InvalidState {
            expected: "Idle or Errored".to_string(),
            actual: "Playing".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid state: expected Idle or Errored, got Playing"
        );
    }
}
