//! Structured debug logging setup

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "dualtrack=info,dualtrack_media=info,dualtrack_core=warn";

/// Debug logger for structured logging
#[derive(Debug, Clone)]
pub struct DebugLogger {
    filter: String,
    with_target: bool,
}

impl DebugLogger {
    /// Create a logger with the default filter
    pub fn new() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            with_target: false,
        }
    }

    /// Use a custom filter directive, e.g. `"dualtrack=trace"`
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Include the module path in every line
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Directive the logger will install when `RUST_LOG` is absent
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Build the env filter: `RUST_LOG` wins, then the configured directive
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }

    /// Install the global subscriber
    ///
    /// Returns `false` when a subscriber was already installed (for example
    /// by the embedding application or a previous call).
    pub fn install(&self) -> bool {
        tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_target(self.with_target)
            .try_init()
            .is_ok()
    }

    /// Initialize logging with the default configuration
    pub fn init_logging() -> bool {
        Self::new().install()
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_builder() {
        let logger = DebugLogger::new().with_filter("dualtrack=trace").with_target(true);
        assert_eq!(logger.filter(), "dualtrack=trace");
        assert!(logger.with_target);
        assert_eq!(DebugLogger::default().filter(), DEFAULT_FILTER);
    }

    #[test]
    fn test_second_install_is_rejected() {
        let logger = DebugLogger::new();
        logger.install();
        assert!(!logger.install());
    }
}
