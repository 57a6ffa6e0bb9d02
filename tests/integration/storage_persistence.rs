//! Persistence tests for the SQLite alarm store
//!
//! These tests verify that:
//! - Alarm state (counts, status, history) survives a daemon restart
//! - A fresh engine keeps deduplicating and correlating against records
//!   written before the restart
//! - Heartbeats stay one-record-per-origin across restarts
//! - The history cap holds no matter how often the store is reopened
//! - Operator actions land on persisted records by id

use std::sync::Arc;

use klaxon::alarm::History;
use klaxon::bus::memory::InProcessBus;
use klaxon::engine::{AlertProcessor, Outcome};
use klaxon::event::{InboundEvent, parse_event};
use klaxon::lifecycle;
use klaxon::severity::{Severity, Trend};
use klaxon::status::{Action, Status};
use klaxon::store::AlarmStore;
use klaxon::store::sqlite::SqliteStore;
use tempfile::tempdir;

use crate::helpers::*;

/// Engine wired over an already-open store, the way the daemon does it
fn engine_over(store: Arc<SqliteStore>) -> AlertProcessor {
    AlertProcessor::new(
        store,
        lifecycle::from_name("standard").unwrap(),
        Arc::new(InProcessBus::new(64)),
        NOTIFY.to_string(),
        AUDIT.to_string(),
        None,
        86_400,
        86_400,
    )
}

fn event(body: &str) -> InboundEvent {
    parse_event(body, chrono::Utc::now()).unwrap()
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_alarm_state_survives_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("alarms.db");

    // First daemon run: a creation and one repeat
    let store = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let engine = engine_over(store.clone());
    engine
        .process(&event(&plain_alert("a1", "web01", "CpuHigh", "major")))
        .await
        .unwrap();
    engine
        .process(&event(&plain_alert("a2", "web01", "CpuHigh", "major")))
        .await
        .unwrap();
    store.close().await.unwrap();

    // Second run sees exactly what the first one left behind
    let reopened = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let alarm = reopened.find_by_id("a1").await.unwrap().unwrap();
    assert_eq!(alarm.duplicate_count, 1, "the repeat count must persist");
    assert!(alarm.repeat);
    assert_eq!(alarm.last_receive_id, "a2");
    assert_eq!(alarm.severity, Severity::Major);
    assert_eq!(alarm.status, Status::Open);
    assert_eq!(alarm.history.len(), 1);

    // And the fresh engine folds further repeats into the same record
    let engine = engine_over(reopened.clone());
    let outcome = engine
        .process(&event(&plain_alert("a3", "web01", "CpuHigh", "major")))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Deduplicated(_)));
    let alarm = reopened.find_by_id("a1").await.unwrap().unwrap();
    assert_eq!(alarm.duplicate_count, 2);

    reopened.close().await.unwrap();
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_fresh_engine_correlates_against_persisted_records() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("alarms.db");

    let store = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let engine = engine_over(store.clone());
    engine
        .process(&event(&node_alert("a1", "router55", "NodeDown", "critical")))
        .await
        .unwrap();
    store.close().await.unwrap();

    // The clearing event arrives after a restart
    let reopened = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let engine = engine_over(reopened.clone());
    let outcome = engine
        .process(&event(&node_alert("a2", "router55", "NodeUp", "normal")))
        .await
        .unwrap();
    let Outcome::Correlated(alarm) = outcome else {
        panic!("expected the persisted group to absorb the clearing event");
    };

    assert_eq!(alarm.id, "a2");
    assert_eq!(alarm.event, "NodeUp");
    assert_eq!(alarm.previous_severity, Severity::Critical);
    assert_eq!(alarm.trend_indication, Trend::LessSevere);
    assert_eq!(alarm.status, Status::Closed);
    // Opening episode, clearing episode, status change
    assert_eq!(alarm.history.len(), 3);

    reopened.close().await.unwrap();
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_heartbeats_stay_one_record_per_origin_across_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("alarms.db");

    let store = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let engine = engine_over(store.clone());
    engine
        .process(&event(&heartbeat_body("pinger/web01", 300)))
        .await
        .unwrap();
    store.close().await.unwrap();

    let reopened = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let beat = reopened.latest_heartbeat("pinger/web01").await.unwrap().unwrap();
    assert_eq!(beat.timeout, 300);

    // A post-restart beat overwrites the persisted one, never adds a second
    let engine = engine_over(reopened.clone());
    engine
        .process(&event(&heartbeat_body("pinger/web01", 600)))
        .await
        .unwrap();
    let beat = reopened.latest_heartbeat("pinger/web01").await.unwrap().unwrap();
    assert_eq!(beat.timeout, 600);

    reopened.close().await.unwrap();
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_history_cap_holds_across_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("alarms.db");

    let store = Arc::new(SqliteStore::new(&db_path, 4).await.unwrap());
    let engine = engine_over(store.clone());
    engine
        .process(&event(&node_alert("s1", "router55", "NodeDown", "critical")))
        .await
        .unwrap();
    // Clearing the alarm appends an episode and a status change
    engine
        .process(&event(&node_alert("a2", "router55", "NodeUp", "normal")))
        .await
        .unwrap();
    store.close().await.unwrap();

    // Reopening does not reset the cap accounting; the next flap trims the
    // oldest entry out
    let reopened = Arc::new(SqliteStore::new(&db_path, 4).await.unwrap());
    let engine = engine_over(reopened.clone());
    engine
        .process(&event(&node_alert("a3", "router55", "NodeDown", "critical")))
        .await
        .unwrap();

    let alarm = reopened.find_by_id("a3").await.unwrap().unwrap();
    assert_eq!(alarm.history.len(), 4, "history must not grow past the cap");
    assert!(
        matches!(&alarm.history[0], History::Episode { id, .. } if id == "a2"),
        "the opening episode is the entry that gets dropped"
    );

    reopened.close().await.unwrap();
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_operator_action_lands_after_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("alarms.db");

    let store = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let engine = engine_over(store.clone());
    engine
        .process(&event(&plain_alert("a1", "web01", "CpuHigh", "major")))
        .await
        .unwrap();
    store.close().await.unwrap();

    // The operator acks long after the record was written
    let reopened = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let engine = engine_over(reopened.clone());
    let alarm = engine
        .apply_action("a1", Action::Ack, Some("on it".into()))
        .await
        .unwrap();
    assert_eq!(alarm.status, Status::Ack);
    reopened.close().await.unwrap();

    // The ack itself persists too
    let reopened = Arc::new(SqliteStore::new(&db_path, 100).await.unwrap());
    let alarm = reopened.find_by_id("a1").await.unwrap().unwrap();
    assert_eq!(alarm.status, Status::Ack);
    assert_eq!(alarm.history.len(), 2);

    reopened.close().await.unwrap();
}
