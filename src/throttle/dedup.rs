//! Repeat suppression for event producers
//!
//! A producer that polls the same resource keeps generating the same event.
//! The gate tracks one value per identity key and lets a repeat through only
//! every `threshold`th occurrence, or when `duration` has passed since the
//! key last sent. Any *change* of the tracked value passes immediately.
//!
//! The tracked value depends on the mode:
//!
//! - [`GateMode::Severity`]: key is `(environment, resource, event)` and
//!   the severity is the tracked value, so severity flips always send
//! - [`GateMode::Value`]: severity joins the key and the event value is
//!   tracked, for sources whose value carries the signal (e.g. check output)
//!
//! Counters are shared across all producer threads behind one mutex; the
//! volume is low enough that coarse locking is fine.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::trace;

use crate::event::{AlertEvent, InboundEvent};
use crate::severity::Severity;

/// Which part of an event the gate watches for change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    Severity,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GateKey {
    environment: Vec<String>,
    resource: String,
    event: String,
    /// Only set in value mode
    severity: Option<Severity>,
}

#[derive(Debug)]
struct GateEntry {
    current: String,
    previous: Option<String>,
    counter: u64,
    last_sent: DateTime<Utc>,
}

/// Keyed repeat-suppression gate
#[derive(Debug)]
pub struct DedupGate {
    mode: GateMode,
    threshold: u64,
    duration: Duration,
    entries: Mutex<HashMap<GateKey, GateEntry>>,
}

impl DedupGate {
    pub fn new(mode: GateMode, threshold: u64, duration: Duration) -> Self {
        Self {
            mode,
            threshold: threshold.max(1),
            duration,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Gate decision for the next candidate event
    ///
    /// Side-effects the internal counters regardless of the returned value.
    /// Heartbeats always pass.
    pub fn should_send(&self, event: &InboundEvent) -> bool {
        match event {
            InboundEvent::Heartbeat(_) => true,
            InboundEvent::Alert(alert) => self.decide(alert, Utc::now()),
        }
    }

    /// Previously tracked value for an event's key, if the value ever changed
    pub fn previous_value(&self, alert: &AlertEvent) -> Option<String> {
        let (key, _) = self.key_and_value(alert);
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(&key).and_then(|entry| entry.previous.clone())
    }

    fn key_and_value(&self, alert: &AlertEvent) -> (GateKey, String) {
        let severity = alert.severity.unwrap_or(Severity::Indeterminate);
        match self.mode {
            GateMode::Severity => (
                GateKey {
                    environment: alert.environment.clone(),
                    resource: alert.resource.clone(),
                    event: alert.event.clone(),
                    severity: None,
                },
                severity.as_str().to_string(),
            ),
            GateMode::Value => (
                GateKey {
                    environment: alert.environment.clone(),
                    resource: alert.resource.clone(),
                    event: alert.event.clone(),
                    severity: Some(severity),
                },
                alert.value.clone().unwrap_or_default(),
            ),
        }
    }

    fn decide(&self, alert: &AlertEvent, now: DateTime<Utc>) -> bool {
        let (key, value) = self.key_and_value(alert);
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(entry) = entries.get_mut(&key) else {
            entries.insert(
                key,
                GateEntry {
                    current: value,
                    previous: None,
                    counter: 1,
                    last_sent: now,
                },
            );
            return true;
        };

        if entry.current != value {
            entry.previous = Some(std::mem::replace(&mut entry.current, value));
            entry.counter = 1;
            entry.last_sent = now;
            return true;
        }

        entry.counter += 1;
        let send = entry.counter % self.threshold == 0
            || now.signed_duration_since(entry.last_sent) > self.duration;
        if send {
            entry.last_sent = now;
        } else {
            trace!(
                resource = %alert.resource,
                event = %alert.event,
                counter = entry.counter,
                "suppressing repeat"
            );
        }
        send
    }
}
