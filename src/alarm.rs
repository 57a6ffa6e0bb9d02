//! Canonical alarm records and per-alarm history
//!
//! An alarm record is the mutable unit the engine maintains: one record per
//! `(environment, resource)` pair per logical alarm group, created by the
//! first contributing event and mutated in place by every later duplicate or
//! correlated event. The serialized shape mirrors the inbound alert keys
//! (camelCase, millisecond `Z` timestamps) so downstream consumers see one
//! consistent document format.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::AlertEvent;
use crate::severity::{Severity, Trend};
use crate::status::Status;

/// One entry in an alarm's bounded history list
///
/// Episode entries mark a severity/event change, status-change entries mark
/// a lifecycle transition. The two shapes share no mandatory keys, so the
/// untagged representation is unambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum History {
    Episode {
        id: String,
        event: String,
        severity: Severity,
        value: Option<String>,
        text: Option<String>,
        #[serde(rename = "createTime", with = "crate::util::timestamp")]
        create_time: DateTime<Utc>,
        #[serde(rename = "receiveTime", with = "crate::util::timestamp")]
        receive_time: DateTime<Utc>,
    },
    StatusChange {
        id: String,
        status: Status,
        text: Option<String>,
        #[serde(rename = "updateTime", with = "crate::util::timestamp")]
        update_time: DateTime<Utc>,
    },
}

/// The canonical, mutable alarm state document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    pub resource: String,
    pub event: String,
    pub correlated_events: Vec<String>,
    pub group: Option<String>,
    pub value: Option<String>,
    pub severity: Severity,
    pub previous_severity: Severity,
    pub environment: Vec<String>,
    pub service: Vec<String>,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub tags: Vec<String>,
    pub origin: Option<String>,
    pub repeat: bool,
    pub duplicate_count: u64,
    pub threshold_info: Option<String>,
    pub summary: Option<String>,
    pub timeout: i64,
    #[serde(with = "crate::util::timestamp")]
    pub create_time: DateTime<Utc>,
    #[serde(with = "crate::util::timestamp")]
    pub receive_time: DateTime<Utc>,
    #[serde(with = "crate::util::timestamp")]
    pub last_receive_time: DateTime<Utc>,
    pub last_receive_id: String,
    #[serde(with = "crate::util::timestamp_opt")]
    pub expire_time: Option<DateTime<Utc>>,
    pub trend_indication: Trend,
    pub raw_data: Option<String>,
    pub more_info: Option<String>,
    pub graph_urls: Vec<String>,
    pub status: Status,
    pub history: Vec<History>,
}

/// Expiry for an episode starting at `create_time`; a zero (or negative)
/// timeout disables expiry
pub fn expire_time_for(create_time: DateTime<Utc>, timeout: i64) -> Option<DateTime<Utc>> {
    if timeout > 0 {
        Some(create_time + Duration::seconds(timeout))
    } else {
        None
    }
}

impl Alarm {
    /// Build a fresh record from the first contributing event
    ///
    /// The caller has already resolved severity defaulting, the initial
    /// status and the episode times; this assembles the document and its
    /// single opening episode history entry.
    pub fn from_event(
        alert: &AlertEvent,
        severity: Severity,
        previous_severity: Severity,
        status: Status,
        create_time: DateTime<Utc>,
        receive_time: DateTime<Utc>,
        timeout: i64,
    ) -> Self {
        let episode = History::Episode {
            id: alert.id.clone(),
            event: alert.event.clone(),
            severity,
            value: alert.value.clone(),
            text: alert.text.clone(),
            create_time,
            receive_time,
        };

        Self {
            id: alert.id.clone(),
            resource: alert.resource.clone(),
            event: alert.event.clone(),
            correlated_events: alert.correlated_events.clone(),
            group: alert.group.clone(),
            value: alert.value.clone(),
            severity,
            previous_severity,
            environment: alert.environment.clone(),
            service: alert.service.clone(),
            text: alert.text.clone(),
            event_type: alert.event_type.clone(),
            tags: alert.tags.clone(),
            origin: alert.origin.clone(),
            repeat: false,
            duplicate_count: 0,
            threshold_info: alert.threshold_info.clone(),
            summary: alert.summary.clone(),
            timeout,
            create_time,
            receive_time,
            last_receive_time: receive_time,
            last_receive_id: alert.id.clone(),
            expire_time: expire_time_for(create_time, timeout),
            trend_indication: Trend::NoChange,
            raw_data: alert.raw_data.clone(),
            more_info: alert.more_info.clone(),
            graph_urls: alert.graph_urls.clone(),
            status,
            history: vec![episode],
        }
    }

    /// Append a history entry, dropping the oldest beyond `limit`
    pub fn push_history(&mut self, entry: History, limit: usize) {
        self.history.push(entry);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    /// Document published to the downstream sinks: the record without its
    /// history list (consumers that need history query the store)
    pub fn wire_body(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("history");
        }
        Ok(value)
    }
}

/// Producer liveness record, upserted per origin and never historized
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub id: String,
    pub origin: String,
    pub tags: Vec<String>,
    pub version: Option<String>,
    #[serde(with = "crate::util::timestamp")]
    pub create_time: DateTime<Utc>,
    #[serde(with = "crate::util::timestamp")]
    pub receive_time: DateTime<Utc>,
    pub timeout: i64,
}
