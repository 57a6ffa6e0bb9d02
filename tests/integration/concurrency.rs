//! Concurrency tests for the worker pool and the alarm store
//!
//! These tests verify that:
//! - Racing creations of one alarm group converge to a single record
//! - Parallel duplicates are all counted, none lost
//! - Unrelated alarm scopes do not interfere under load

use futures::future::join_all;
use klaxon::bus::MessageBus;
use klaxon::store::AlarmStore;

use crate::helpers::*;

#[tokio::test]
async fn test_racing_creations_converge_to_one_alarm() {
    let stack = spawn_stack(4);

    // All events share one id and one identity, so whichever worker wins the
    // insert race, the record stays reachable under "r1"
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let bus = stack.bus.clone();
        tasks.push(tokio::spawn(async move {
            bus.publish(INBOUND, plain_alert("r1", "db01", "DiskFull", "major"))
                .await
                .unwrap();
        }));
    }
    join_all(tasks).await;

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                match store.find_by_id("r1").await.unwrap() {
                    Some(alarm) => alarm.duplicate_count == 7,
                    None => false,
                }
            }
        })
        .await,
        "exactly one creation should win; the rest fold in as repeats"
    );

    let bus = stack.bus.clone();
    assert!(
        eventually(|| {
            let bus = bus.clone();
            async move { bus.acked_count() == 8 }
        })
        .await,
        "every event should be acked"
    );

    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_parallel_duplicates_are_all_counted() {
    let stack = spawn_stack(4);

    // Seed the record first so the storm below is pure duplicates
    stack
        .bus
        .publish(INBOUND, plain_alert("c1", "db01", "DiskFull", "major"))
        .await
        .unwrap();

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move { store.find_by_id("c1").await.unwrap().is_some() }
        })
        .await
    );

    let mut tasks = Vec::new();
    for i in 0..16 {
        let bus = stack.bus.clone();
        tasks.push(tokio::spawn(async move {
            bus.publish(
                INBOUND,
                plain_alert(&format!("d{i}"), "db01", "DiskFull", "major"),
            )
            .await
            .unwrap();
        }));
    }
    join_all(tasks).await;

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                match store.find_by_id("c1").await.unwrap() {
                    Some(alarm) => alarm.duplicate_count == 16,
                    None => false,
                }
            }
        })
        .await,
        "all 16 repeats should be counted, none lost"
    );

    stack.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_scopes_process_independently_under_load() {
    let stack = spawn_stack(4);

    // One seed record per resource scope
    for i in 0..3 {
        stack
            .bus
            .publish(
                INBOUND,
                plain_alert(&format!("seed{i}"), &format!("host{i}"), "CpuHigh", "warning"),
            )
            .await
            .unwrap();
    }
    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                for i in 0..3 {
                    if store
                        .find_by_id(&format!("seed{i}"))
                        .await
                        .unwrap()
                        .is_none()
                    {
                        return false;
                    }
                }
                true
            }
        })
        .await
    );

    // Interleaved repeats across all three scopes
    let mut tasks = Vec::new();
    for i in 0..3 {
        for j in 0..10 {
            let bus = stack.bus.clone();
            tasks.push(tokio::spawn(async move {
                bus.publish(
                    INBOUND,
                    plain_alert(
                        &format!("rep{i}-{j}"),
                        &format!("host{i}"),
                        "CpuHigh",
                        "warning",
                    ),
                )
                .await
                .unwrap();
            }));
        }
    }
    join_all(tasks).await;

    let store = stack.store.clone();
    assert!(
        eventually(|| {
            let store = store.clone();
            async move {
                for i in 0..3 {
                    match store.find_by_id(&format!("seed{i}")).await.unwrap() {
                        Some(alarm) => {
                            if alarm.duplicate_count != 10 {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                true
            }
        })
        .await,
        "each scope should count exactly its own repeats"
    );

    let bus = stack.bus.clone();
    assert!(
        eventually(|| {
            let bus = bus.clone();
            async move { bus.acked_count() == 33 }
        })
        .await
    );

    stack.dispatcher.shutdown().await;
}
