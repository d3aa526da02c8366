//! Configuration types and defaults

use dualtrack_core::FormatSelection;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Player configuration
///
/// Passed to the player at construction; nothing is read from global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Period of the drift check while playing
    pub reconcile_interval: Duration,
    /// Audio/video distance (seconds) above which audio is re-aligned
    pub drift_threshold: f64,
    /// Distance (seconds) from the target at which a seek counts as arrived
    pub seek_tolerance: f64,
    /// How long a track may stall before the session gives up on it
    pub stall_timeout: Duration,
    /// How long initialization, play, seek and switch transactions may take
    pub transaction_timeout: Duration,
    /// Start playing as soon as initialization completes
    pub autoplay: bool,
    /// Audio volume in `[0, 1]`
    pub initial_volume: f64,
    /// Start with audio muted
    pub start_muted: bool,
    /// Formats used when a request names none
    pub default_formats: FormatSelection,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_millis(250),
            drift_threshold: 0.15,
            seek_tolerance: 0.1,
            stall_timeout: Duration::from_secs(15),
            transaction_timeout: Duration::from_secs(20),
            autoplay: false,
            initial_volume: 1.0,
            start_muted: false,
            default_formats: FormatSelection::platform_defaults(),
        }
    }
}

impl PlayerConfig {
    /// Tight sync and short timeouts, for fast local networks
    pub fn responsive() -> Self {
        Self {
            reconcile_interval: Duration::from_millis(200),
            drift_threshold: 0.1,
            stall_timeout: Duration::from_secs(10),
            transaction_timeout: Duration::from_secs(15),
            ..Self::default()
        }
    }

    /// Looser sync and patient timeouts, for slow or lossy networks
    pub fn conservative() -> Self {
        Self {
            reconcile_interval: Duration::from_millis(250),
            drift_threshold: 0.2,
            stall_timeout: Duration::from_secs(30),
            transaction_timeout: Duration::from_secs(45),
            ..Self::default()
        }
    }

    /// Set the initial volume from a stored 0-100 setting
    pub fn with_volume_percent(mut self, percent: u8) -> Self {
        self.initial_volume = f64::from(percent.min(100)) / 100.0;
        self
    }

    /// Clamp values into usable ranges
    pub(crate) fn normalized(mut self) -> Self {
        self.initial_volume = self.initial_volume.clamp(0.0, 1.0);
        self.drift_threshold = self.drift_threshold.max(0.0);
        self.seek_tolerance = self.seek_tolerance.max(0.0);
        if self.reconcile_interval.is_zero() {
            self.reconcile_interval = Self::default().reconcile_interval;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.reconcile_interval, Duration::from_millis(250));
        assert_eq!(config.drift_threshold, 0.15);
        assert_eq!(config.seek_tolerance, 0.1);
        assert_eq!(config.stall_timeout, Duration::from_secs(15));
        assert!(!config.autoplay);
        assert_eq!(config.default_formats.video_format_id.as_deref(), Some("137"));
        assert_eq!(config.default_formats.audio_format_id.as_deref(), Some("140"));
    }

    #[test]
    fn test_presets() {
        let responsive = PlayerConfig::responsive();
        let conservative = PlayerConfig::conservative();
        assert!(responsive.drift_threshold < conservative.drift_threshold);
        assert!(responsive.stall_timeout < conservative.stall_timeout);
        assert!(responsive.reconcile_interval <= conservative.reconcile_interval);
    }

    #[test]
    fn test_volume_percent() {
        assert_eq!(PlayerConfig::default().with_volume_percent(80).initial_volume, 0.8);
        assert_eq!(PlayerConfig::default().with_volume_percent(250).initial_volume, 1.0);
    }

    #[test]
    fn test_normalized_clamps() {
        let config = PlayerConfig {
            initial_volume: 3.0,
            reconcile_interval: Duration::ZERO,
            drift_threshold: -1.0,
            ..PlayerConfig::default()
        }
        .normalized();
        assert_eq!(config.initial_volume, 1.0);
        assert_eq!(config.drift_threshold, 0.0);
        assert_eq!(config.reconcile_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = PlayerConfig::conservative().with_volume_percent(40);
        let json = serde_json::to_string(&config).unwrap();
        let restored: PlayerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
