//! Inbound wire types
//!
//! Producers publish JSON bodies onto the inbound destination. A body is
//! either an alert or a heartbeat, distinguished by its `type` key
//! (`"Heartbeat"` for heartbeats, anything else is an alert event type such
//! as `"exceptionAlert"`). Keys are camelCase; timestamps use the shared
//! millisecond `Z` format from [`crate::util`].
//!
//! Parsing is strict where it matters: missing `resource`/`event` (alerts)
//! or `origin` (heartbeats), invalid severities, invalid statuses and
//! invalid timestamps are all rejected as malformed. `receiveTime` is
//! stamped server-side at receipt; a producer-supplied value is discarded.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::severity::Severity;
use crate::status::Status;

/// Value of the `type` key that marks a heartbeat body
pub const HEARTBEAT_TYPE: &str = "Heartbeat";

/// A message body that failed validation and will never be retried
#[derive(Debug)]
pub enum MalformedEvent {
    /// Body is not valid JSON or a field has the wrong shape
    Json(serde_json::Error),

    /// A mandatory field is missing or empty
    MissingField(&'static str),
}

impl fmt::Display for MalformedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedEvent::Json(err) => write!(f, "malformed event body: {}", err),
            MalformedEvent::MissingField(field) => {
                write!(f, "malformed event: missing mandatory field '{}'", field)
            }
        }
    }
}

impl std::error::Error for MalformedEvent {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MalformedEvent::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MalformedEvent {
    fn from(err: serde_json::Error) -> Self {
        MalformedEvent::Json(err)
    }
}

/// A parsed inbound alert, as published by a producer
///
/// Only `resource` and `event` are mandatory. Bookkeeping fields the engine
/// computes itself (`repeat`, `duplicateCount`, `previousSeverity`,
/// `trendIndication`, `lastReceive*`) are accepted on the wire for shape
/// compatibility but ignored during processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertEvent {
    pub id: String,
    pub resource: String,
    pub event: String,
    pub correlated_events: Vec<String>,
    pub group: Option<String>,
    pub value: Option<String>,
    pub severity: Option<Severity>,
    pub previous_severity: Option<Severity>,
    pub environment: Vec<String>,
    pub service: Vec<String>,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub tags: Vec<String>,
    pub origin: Option<String>,
    pub repeat: Option<bool>,
    pub duplicate_count: Option<u64>,
    pub threshold_info: Option<String>,
    pub summary: Option<String>,
    /// Seconds until the alarm episode expires; 0 disables expiry
    pub timeout: Option<i64>,
    #[serde(with = "crate::util::timestamp_opt")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(with = "crate::util::timestamp_opt")]
    pub receive_time: Option<DateTime<Utc>>,
    #[serde(with = "crate::util::timestamp_opt")]
    pub last_receive_time: Option<DateTime<Utc>>,
    pub last_receive_id: Option<String>,
    pub trend_indication: Option<crate::severity::Trend>,
    pub raw_data: Option<String>,
    pub more_info: Option<String>,
    pub graph_urls: Vec<String>,
    pub status: Option<Status>,
}

/// A parsed inbound heartbeat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatEvent {
    pub id: String,
    pub origin: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    #[serde(with = "crate::util::timestamp_opt")]
    pub create_time: Option<DateTime<Utc>>,
    pub timeout: Option<i64>,
    pub version: Option<String>,
    #[serde(with = "crate::util::timestamp_opt")]
    pub receive_time: Option<DateTime<Utc>>,
}

/// A validated inbound message, ready for classification
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Alert(AlertEvent),
    Heartbeat(HeartbeatEvent),
}

impl InboundEvent {
    /// Identity summary for log lines
    pub fn describe(&self) -> String {
        match self {
            InboundEvent::Alert(alert) => {
                format!("alert {} ({}:{})", alert.id, alert.resource, alert.event)
            }
            InboundEvent::Heartbeat(hb) => format!("heartbeat {} ({})", hb.id, hb.origin),
        }
    }
}

/// Parse and validate a raw message body received at `received_at`
///
/// The server receipt time overwrites any producer-supplied `receiveTime`,
/// and a missing event id is filled in (matching what producers that use
/// the client library generate themselves).
pub fn parse_event(body: &str, received_at: DateTime<Utc>) -> Result<InboundEvent, MalformedEvent> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    let is_heartbeat = value
        .get("type")
        .and_then(|t| t.as_str())
        .is_some_and(|t| t == HEARTBEAT_TYPE);

    if is_heartbeat {
        let mut hb: HeartbeatEvent = serde_json::from_value(value)?;
        if hb.origin.is_empty() {
            return Err(MalformedEvent::MissingField("origin"));
        }
        if hb.id.is_empty() {
            hb.id = Uuid::new_v4().to_string();
        }
        hb.receive_time = Some(received_at);
        Ok(InboundEvent::Heartbeat(hb))
    } else {
        let mut alert: AlertEvent = serde_json::from_value(value)?;
        if alert.resource.is_empty() {
            return Err(MalformedEvent::MissingField("resource"));
        }
        if alert.event.is_empty() {
            return Err(MalformedEvent::MissingField("event"));
        }
        if alert.id.is_empty() {
            alert.id = Uuid::new_v4().to_string();
        }
        alert.receive_time = Some(received_at);
        Ok(InboundEvent::Alert(alert))
    }
}
