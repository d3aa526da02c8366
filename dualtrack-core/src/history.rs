//! Watch history collaborator

use crate::resolver::MediaRef;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Notification emitted once when a session's playback genuinely starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    /// Item being watched
    pub media_ref: MediaRef,
    /// Title, when the caller knew it
    pub title_hint: Option<String>,
    /// Channel, when the caller knew it
    pub channel_hint: Option<String>,
    /// When playback started
    pub timestamp: DateTime<Utc>,
}

/// Receives watch-started notifications
///
/// A session reports each media item once, the first time it reaches
/// `Playing`. Pausing, seeking, switching formats and retrying the same item
/// never report again. Initializing a different item in the same session
/// starts a new report, so a session that plays several items in turn emits
/// one notification per item.
///
/// Called from the session task; implementations must not block.
pub trait HistorySink: Send + Sync {
    /// Record that playback of an item started
    fn watch_started(&self, entry: WatchEntry);
}

/// In-memory history, newest first, one entry per title
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Mutex<Vec<WatchEntry>>,
}

impl HistoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entries, newest first
    pub fn entries(&self) -> Vec<WatchEntry> {
        self.entries.lock().clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl HistorySink for HistoryLog {
    fn watch_started(&self, entry: WatchEntry) {
        let mut entries = self.entries.lock();
        let key = entry.title_hint.clone();
        entries.retain(|existing| match (&key, &existing.title_hint) {
            (Some(title), Some(other)) => title != other,
            _ => existing.media_ref != entry.media_ref,
        });
        debug!("📜 Recording watch start: {}", entry.media_ref);
        entries.insert(0, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(reference: &str, title: Option<&str>) -> WatchEntry {
        WatchEntry {
            media_ref: MediaRef::new(reference),
            title_hint: title.map(str::to_string),
            channel_hint: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_history_newest_first() {
        let log = HistoryLog::new();
        log.watch_started(entry("a", Some("First")));
        log.watch_started(entry("b", Some("Second")));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].media_ref.as_str(), "b");
        assert_eq!(entries[1].media_ref.as_str(), "a");
    }

    #[test]
    fn test_history_dedupes_by_title() {
        let log = HistoryLog::new();
        log.watch_started(entry("a", Some("Same")));
        log.watch_started(entry("b", Some("Other")));
        log.watch_started(entry("c", Some("Same")));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].media_ref.as_str(), "c");
        assert_eq!(entries[1].media_ref.as_str(), "b");
    }

    #[test]
    fn test_history_untitled_dedupes_by_reference() {
        let log = HistoryLog::new();
        log.watch_started(entry("a", None));
        log.watch_started(entry("a", None));
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }
}
