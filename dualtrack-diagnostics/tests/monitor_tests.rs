//! Unit tests for session statistics shared across tasks

use dualtrack_core::TrackKind;
use dualtrack_diagnostics::*;
use std::sync::Arc;

#[tokio::test]
async fn test_monitor_shared_between_tasks() {
    let monitor = Arc::new(SyncMonitor::new());

    let writer = {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                monitor.record_drift(0.2);
                monitor.record_correction(0.2);
                tokio::task::yield_now().await;
            }
            monitor.record_stall(TrackKind::Audio);
            monitor.record_stall_escalation();
        })
    };
    writer.await.unwrap();

    let stats = monitor.snapshot();
    assert_eq!(stats.drift_corrections, 10);
    assert_eq!(stats.audio_stalls, 1);
    assert_eq!(stats.video_stalls, 0);
    assert_eq!(stats.stall_escalations, 1);
}

#[test]
fn test_stats_serialize_for_overlay() {
    let monitor = SyncMonitor::new();
    monitor.record_seek();
    monitor.record_format_switch();
    monitor.record_superseded();

    let json = monitor.snapshot().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["seeks"], 1);
    assert_eq!(value["format_switches"], 1);
    assert_eq!(value["superseded_operations"], 1);
}

#[test]
fn test_monitor_records_from_blocking_context() {
    let monitor = SyncMonitor::default();
    tokio_test::block_on(async {
        monitor.record_drift(0.5);
    });
    assert_eq!(monitor.snapshot().last_drift, 0.5);
}

#[test]
fn test_logger_uses_default_filter() {
    let logger = DebugLogger::new();
    assert_eq!(logger.filter(), DEFAULT_FILTER);
}
