//! # Dualtrack Diagnostics
//!
//! Logging setup and synchronization statistics for dualtrack sessions.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod sync_monitor;

// Re-export main types
pub use debug_logger::{DebugLogger, DEFAULT_FILTER};
pub use sync_monitor::{SyncMonitor, SyncStats};
