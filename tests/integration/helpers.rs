//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use klaxon::bus::MessageStream;
use klaxon::bus::memory::InProcessBus;
use klaxon::engine::{AlertProcessor, DispatcherHandle};
use klaxon::lifecycle;
use klaxon::store::memory::MemoryStore;
use klaxon::throttle::TokenGate;

pub const INBOUND: &str = "alerts";
pub const NOTIFY: &str = "notify";
pub const AUDIT: &str = "logger";

/// A fully wired engine on in-memory backends
pub struct TestStack {
    pub bus: Arc<InProcessBus>,
    pub store: Arc<MemoryStore>,
    pub processor: Arc<AlertProcessor>,
    pub dispatcher: DispatcherHandle,
}

pub fn spawn_stack(workers: usize) -> TestStack {
    spawn_stack_with_gate(workers, None)
}

pub fn spawn_stack_with_gate(workers: usize, notify_gate: Option<Arc<TokenGate>>) -> TestStack {
    let bus = Arc::new(InProcessBus::new(64));
    let store = Arc::new(MemoryStore::new(100));
    let model = lifecycle::from_name("standard").unwrap();

    let processor = Arc::new(AlertProcessor::new(
        store.clone(),
        model,
        bus.clone(),
        NOTIFY.to_string(),
        AUDIT.to_string(),
        notify_gate,
        86_400,
        86_400,
    ));

    let dispatcher = DispatcherHandle::spawn(
        bus.clone(),
        processor.clone(),
        INBOUND.to_string(),
        workers,
        64,
    );

    TestStack {
        bus,
        store,
        processor,
        dispatcher,
    }
}

/// Alert body with no correlated events
pub fn plain_alert(id: &str, resource: &str, event: &str, severity: &str) -> String {
    serde_json::json!({
        "id": id,
        "resource": resource,
        "event": event,
        "severity": severity,
        "environment": ["production"],
        "service": ["network"],
    })
    .to_string()
}

/// Alert body correlating the NodeUp/NodeDown pair
pub fn node_alert(id: &str, resource: &str, event: &str, severity: &str) -> String {
    serde_json::json!({
        "id": id,
        "resource": resource,
        "event": event,
        "severity": severity,
        "environment": ["production"],
        "service": ["network"],
        "correlatedEvents": ["NodeUp", "NodeDown"],
    })
    .to_string()
}

pub fn alert_in_env(id: &str, resource: &str, event: &str, severity: &str, env: &str) -> String {
    serde_json::json!({
        "id": id,
        "resource": resource,
        "event": event,
        "severity": severity,
        "environment": [env],
        "service": ["network"],
    })
    .to_string()
}

pub fn heartbeat_body(origin: &str, timeout: i64) -> String {
    serde_json::json!({
        "type": "Heartbeat",
        "origin": origin,
        "timeout": timeout,
    })
    .to_string()
}

/// Next delivery on a subscribed destination, parsed as JSON
pub async fn expect_delivery(stream: &mut Box<dyn MessageStream>) -> serde_json::Value {
    let delivery = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for a delivery")
        .expect("stream closed");
    serde_json::from_str(&delivery.body).expect("delivery body should be JSON")
}

/// Assert nothing arrives on a destination within a short window
pub async fn expect_silence(stream: &mut Box<dyn MessageStream>) {
    let result = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
    assert!(result.is_err(), "expected no delivery on this destination");
}

/// Poll an async condition until it holds (or a few seconds pass)
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}
