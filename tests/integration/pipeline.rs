//! Integration tests for the full ingestion pipeline
//!
//! These tests verify that the pieces work correctly together:
//! - Bus → listener → workers → alarm store
//! - Duplicate collapse, correlation and the status lifecycle end to end
//! - Forwarding to the notify and audit destinations

use klaxon::bus::MessageBus;
use klaxon::status::{Action, Status};
use klaxon::store::AlarmStore;

use crate::helpers::*;

#[tokio::test]
async fn test_new_alert_reaches_store_and_both_sinks() {
    let stack = spawn_stack(2);
    let mut notify = stack.bus.subscribe(NOTIFY).await.unwrap();
    let mut audit = stack.bus.subscribe(AUDIT).await.unwrap();

    stack
        .bus
        .publish(INBOUND, node_alert("a1", "web01", "NodeDown", "critical"))
        .await
        .unwrap();

    let body = expect_delivery(&mut notify).await;
    assert_eq!(body["id"], "a1");
    assert_eq!(body["severity"], "critical");
    assert_eq!(body["status"], "open");
    assert_eq!(body["previousSeverity"], "unknown");
    assert_eq!(body["trendIndication"], "noChange");
    assert_eq!(body["duplicateCount"], 0);
    assert_eq!(body["repeat"], false);
    assert!(
        body.get("history").is_none(),
        "forwarded records carry no history"
    );

    let audited = expect_delivery(&mut audit).await;
    assert_eq!(audited["id"], "a1");

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move { store.find_by_id("a1").await.unwrap().is_some() }
        })
        .await,
        "alarm should land in the store"
    );

    // Cleanup
    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_duplicates_collapse_and_stay_quiet() {
    let stack = spawn_stack(2);
    let mut notify = stack.bus.subscribe(NOTIFY).await.unwrap();
    let mut audit = stack.bus.subscribe(AUDIT).await.unwrap();

    stack
        .bus
        .publish(INBOUND, node_alert("a1", "web01", "NodeDown", "critical"))
        .await
        .unwrap();
    expect_delivery(&mut notify).await;
    expect_delivery(&mut audit).await;

    // Same environment, resource, event and severity: an exact repeat
    stack
        .bus
        .publish(INBOUND, node_alert("a2", "web01", "NodeDown", "critical"))
        .await
        .unwrap();

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                match store.find_by_id("a1").await.unwrap() {
                    Some(alarm) => alarm.duplicate_count == 1,
                    None => false,
                }
            }
        })
        .await,
        "repeat should fold into the stored record"
    );

    let alarm = stack.store.find_by_id("a1").await.unwrap().unwrap();
    assert!(alarm.repeat);
    assert_eq!(alarm.last_receive_id, "a2");
    assert_eq!(alarm.status, Status::Open, "duplicates never touch status");

    // The repeat is not forwarded anywhere
    expect_silence(&mut notify).await;
    expect_silence(&mut audit).await;

    // Both events were consumed either way
    assert_eq!(stack.bus.acked_count(), 2);

    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_correlation_replaces_the_episode() {
    let stack = spawn_stack(2);
    let mut notify = stack.bus.subscribe(NOTIFY).await.unwrap();

    stack
        .bus
        .publish(INBOUND, node_alert("a1", "web01", "NodeDown", "critical"))
        .await
        .unwrap();
    expect_delivery(&mut notify).await;

    stack
        .bus
        .publish(INBOUND, node_alert("a2", "web01", "NodeUp", "normal"))
        .await
        .unwrap();

    let body = expect_delivery(&mut notify).await;
    assert_eq!(body["id"], "a2");
    assert_eq!(body["event"], "NodeUp");
    assert_eq!(body["severity"], "normal");
    assert_eq!(body["previousSeverity"], "critical");
    assert_eq!(body["trendIndication"], "lessSevere");
    assert_eq!(body["status"], "closed");
    assert_eq!(body["duplicateCount"], 0);

    // The record is reachable under the latest event id only
    assert!(stack.store.find_by_id("a1").await.unwrap().is_none());
    let alarm = stack.store.find_by_id("a2").await.unwrap().unwrap();

    // Opening episode, clearing episode, status change to closed
    assert_eq!(alarm.history.len(), 3);
    assert_eq!(alarm.correlated_events, vec!["NodeUp", "NodeDown"]);

    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_closed_alarm_reopens_on_related_event() {
    let stack = spawn_stack(2);
    let mut notify = stack.bus.subscribe(NOTIFY).await.unwrap();

    for body in [
        node_alert("a1", "web01", "NodeDown", "critical"),
        node_alert("a2", "web01", "NodeUp", "normal"),
    ] {
        stack.bus.publish(INBOUND, body).await.unwrap();
        expect_delivery(&mut notify).await;
    }

    // The closed record correlates the new NodeDown and reopens
    stack
        .bus
        .publish(INBOUND, node_alert("a3", "web01", "NodeDown", "major"))
        .await
        .unwrap();

    let body = expect_delivery(&mut notify).await;
    assert_eq!(body["id"], "a3");
    assert_eq!(body["status"], "open");
    assert_eq!(body["previousSeverity"], "normal");
    assert_eq!(body["trendIndication"], "moreSevere");

    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_operator_ack_holds_until_escalation() {
    let stack = spawn_stack(2);
    let mut notify = stack.bus.subscribe(NOTIFY).await.unwrap();

    stack
        .bus
        .publish(INBOUND, node_alert("a1", "web01", "NodeDown", "major"))
        .await
        .unwrap();
    expect_delivery(&mut notify).await;

    let acked = stack
        .processor
        .apply_action("a1", Action::Ack, Some("looking into it".to_string()))
        .await
        .unwrap();
    assert_eq!(acked.status, Status::Ack);

    // A repeat at the same severity leaves the ack in place
    stack
        .bus
        .publish(INBOUND, node_alert("a2", "web01", "NodeDown", "major"))
        .await
        .unwrap();

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                match store.find_by_id("a1").await.unwrap() {
                    Some(alarm) => alarm.duplicate_count == 1,
                    None => false,
                }
            }
        })
        .await
    );
    let alarm = stack.store.find_by_id("a1").await.unwrap().unwrap();
    assert_eq!(alarm.status, Status::Ack);

    // An escalation reopens the acked alarm
    stack
        .bus
        .publish(INBOUND, node_alert("a3", "web01", "NodeDown", "critical"))
        .await
        .unwrap();

    let body = expect_delivery(&mut notify).await;
    assert_eq!(body["id"], "a3");
    assert_eq!(body["status"], "open");
    assert_eq!(body["previousSeverity"], "major");

    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_heartbeats_upsert_and_stay_private() {
    // One worker, so the two upserts for the same origin apply in order
    let stack = spawn_stack(1);
    let mut notify = stack.bus.subscribe(NOTIFY).await.unwrap();

    stack
        .bus
        .publish(INBOUND, heartbeat_body("pinger/01", 300))
        .await
        .unwrap();
    stack
        .bus
        .publish(INBOUND, heartbeat_body("pinger/01", 600))
        .await
        .unwrap();

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                match store.latest_heartbeat("pinger/01").await.unwrap() {
                    Some(hb) => hb.timeout == 600,
                    None => false,
                }
            }
        })
        .await,
        "second heartbeat should replace the first"
    );

    // Heartbeats are liveness records, not alarms: nothing is forwarded
    expect_silence(&mut notify).await;
    assert_eq!(stack.bus.acked_count(), 2);

    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_environment_scopes_do_not_cross() {
    let stack = spawn_stack(2);
    let mut notify = stack.bus.subscribe(NOTIFY).await.unwrap();

    stack
        .bus
        .publish(
            INBOUND,
            alert_in_env("a1", "web01", "NodeDown", "critical", "production"),
        )
        .await
        .unwrap();
    stack
        .bus
        .publish(
            INBOUND,
            alert_in_env("a2", "web01", "NodeDown", "critical", "staging"),
        )
        .await
        .unwrap();

    // Two separate alarms, both forwarded as creations
    expect_delivery(&mut notify).await;
    expect_delivery(&mut notify).await;

    let prod = stack.store.find_by_id("a1").await.unwrap().unwrap();
    let staging = stack.store.find_by_id("a2").await.unwrap().unwrap();
    assert_eq!(prod.duplicate_count, 0);
    assert_eq!(staging.duplicate_count, 0);
    assert_eq!(prod.environment, vec!["production"]);
    assert_eq!(staging.environment, vec!["staging"]);

    stack.dispatcher.shutdown().await;
}
