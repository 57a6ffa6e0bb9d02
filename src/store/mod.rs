//! Canonical alarm store
//!
//! The store is the single serialization point for alarm mutations. The
//! ingestion loop runs several workers in parallel, and two events for the
//! same alarm group can reach two workers at nearly the same time, so every
//! mutation here is a conditional *find matching record, apply mutation,
//! return new value* executed atomically per identity key. A plain read
//! followed by a write would lose updates (two racing inserts, or a
//! duplicate increment racing a correlated replace).
//!
//! ## Contract
//!
//! - [`AlarmStore::insert_new`] fails with [`StoreError::AlreadyExists`]
//!   when a concurrent writer won the race for the group; the caller
//!   re-classifies and will then see a duplicate or correlated match.
//! - [`AlarmStore::apply_duplicate`] / [`AlarmStore::apply_correlated`]
//!   fail with [`StoreError::NotFound`] when the match set changed
//!   underneath the caller; same recovery.
//! - Decisions that depend on the stored record (previous severity, status
//!   transitions) run as closures *inside* the atomic section, so they can
//!   never observe raced state.
//!
//! ## Backends
//!
//! - **Memory** (default): a single async mutex over the alarm map
//! - **SQLite**: persistent, single-writer pool, same semantics

pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alarm::{Alarm, Heartbeat, History};
use crate::severity::{Severity, Trend};
use crate::status::Status;

/// Exact identity of a repeat event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
    pub environment: Vec<String>,
    pub resource: String,
    pub event: String,
    pub severity: Severity,
}

impl DuplicateKey {
    pub fn matches(&self, alarm: &Alarm) -> bool {
        alarm.environment == self.environment
            && alarm.resource == self.resource
            && alarm.event == self.event
            && alarm.severity == self.severity
    }
}

/// Identity used for correlation lookups within an `(environment, resource)`
/// scope. Carries the event severity so an exact duplicate is never treated
/// as correlated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationKey {
    pub environment: Vec<String>,
    pub resource: String,
    pub event: String,
    pub severity: Severity,
}

impl CorrelationKey {
    /// Same event with a different severity, or the event appears in the
    /// record's correlated list
    pub fn matches(&self, alarm: &Alarm) -> bool {
        if alarm.environment != self.environment || alarm.resource != self.resource {
            return false;
        }
        (alarm.event == self.event && alarm.severity != self.severity)
            || (alarm.event != self.event && alarm.correlated_events.contains(&self.event))
    }

    /// Whether the event belongs to this record's alarm group at all
    /// (duplicate or correlated); used by the insert race check
    pub fn in_group(&self, alarm: &Alarm) -> bool {
        alarm.environment == self.environment
            && alarm.resource == self.resource
            && (alarm.event == self.event || alarm.correlated_events.contains(&self.event))
    }
}

/// In-place update for an exact repeat of the stored episode
///
/// Status is deliberately absent: only operator actions change status on a
/// duplicate, never the update itself.
#[derive(Debug, Clone)]
pub struct DuplicateUpdate {
    pub last_receive_time: DateTime<Utc>,
    pub last_receive_id: String,
    pub expire_time: Option<DateTime<Utc>>,
    pub timeout: i64,
    pub group: Option<String>,
    pub value: Option<String>,
    pub text: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub origin: Option<String>,
    pub event_type: Option<String>,
    pub service: Vec<String>,
    pub threshold_info: Option<String>,
    pub raw_data: Option<String>,
    pub more_info: Option<String>,
    pub graph_urls: Vec<String>,
}

impl DuplicateUpdate {
    pub fn apply(self, alarm: &mut Alarm) {
        alarm.repeat = true;
        alarm.duplicate_count += 1;
        alarm.trend_indication = Trend::NoChange;
        alarm.last_receive_time = self.last_receive_time;
        alarm.last_receive_id = self.last_receive_id;
        alarm.expire_time = self.expire_time;
        alarm.timeout = self.timeout;
        alarm.group = self.group;
        alarm.value = self.value;
        alarm.text = self.text;
        alarm.summary = self.summary;
        alarm.tags = self.tags;
        alarm.origin = self.origin;
        alarm.event_type = self.event_type;
        alarm.service = self.service;
        alarm.threshold_info = self.threshold_info;
        alarm.raw_data = self.raw_data;
        alarm.more_info = self.more_info;
        alarm.graph_urls = self.graph_urls;
    }
}

/// Full episode replacement for a correlated event
///
/// Built by a decision closure that sees the matched record inside the
/// atomic section, so `previous_severity`, `trend_indication`, `status` and
/// the history entries are always derived from un-raced state.
#[derive(Debug, Clone)]
pub struct CorrelatedUpdate {
    pub id: String,
    pub event: String,
    pub severity: Severity,
    pub previous_severity: Severity,
    pub trend_indication: Trend,
    pub status: Status,
    pub create_time: DateTime<Utc>,
    pub receive_time: DateTime<Utc>,
    pub last_receive_time: DateTime<Utc>,
    pub last_receive_id: String,
    pub timeout: i64,
    pub expire_time: Option<DateTime<Utc>>,
    pub group: Option<String>,
    pub value: Option<String>,
    pub text: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub origin: Option<String>,
    pub event_type: Option<String>,
    pub service: Vec<String>,
    pub threshold_info: Option<String>,
    pub raw_data: Option<String>,
    pub more_info: Option<String>,
    pub graph_urls: Vec<String>,
    /// Episode entry, plus a status-change entry when status changed
    pub history: Vec<History>,
}

impl CorrelatedUpdate {
    pub fn apply(self, alarm: &mut Alarm, history_limit: usize) {
        alarm.id = self.id;
        alarm.event = self.event;
        alarm.severity = self.severity;
        alarm.previous_severity = self.previous_severity;
        alarm.trend_indication = self.trend_indication;
        alarm.status = self.status;
        alarm.create_time = self.create_time;
        alarm.receive_time = self.receive_time;
        alarm.last_receive_time = self.last_receive_time;
        alarm.last_receive_id = self.last_receive_id;
        alarm.timeout = self.timeout;
        alarm.expire_time = self.expire_time;
        alarm.repeat = false;
        alarm.duplicate_count = 0;
        alarm.group = self.group;
        alarm.value = self.value;
        alarm.text = self.text;
        alarm.summary = self.summary;
        alarm.tags = self.tags;
        alarm.origin = self.origin;
        alarm.event_type = self.event_type;
        alarm.service = self.service;
        alarm.threshold_info = self.threshold_info;
        alarm.raw_data = self.raw_data;
        alarm.more_info = self.more_info;
        alarm.graph_urls = self.graph_urls;
        for entry in self.history {
            alarm.push_history(entry, history_limit);
        }
    }
}

/// Severity/status change from an operator action
#[derive(Debug, Clone)]
pub struct ActionUpdate {
    pub severity: Severity,
    pub status: Status,
    /// Status-change entry when the status actually changed
    pub history: Option<History>,
}

impl ActionUpdate {
    pub fn apply(self, alarm: &mut Alarm, history_limit: usize) {
        alarm.severity = self.severity;
        alarm.status = self.status;
        if let Some(entry) = self.history {
            alarm.push_history(entry, history_limit);
        }
    }
}

/// Persistent (or in-memory) home of alarm and heartbeat records
///
/// Implementations must be `Send + Sync`; every mutation method must be
/// atomic with respect to the identity key it targets. No global locking is
/// required beyond that.
#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// Insert the first record of an alarm group
    ///
    /// Fails with [`StoreError::AlreadyExists`] if any stored record already
    /// matches the new record's group (exact event or correlated), which
    /// happens when a concurrent writer won the insert race.
    async fn insert_new(&self, alarm: Alarm) -> StoreResult<Alarm>;

    /// Apply a duplicate update to the record matching `key` exactly,
    /// returning the updated record
    async fn apply_duplicate(
        &self,
        key: &DuplicateKey,
        update: DuplicateUpdate,
    ) -> StoreResult<Alarm>;

    /// Apply a correlated replacement to the record matching `key`
    ///
    /// `decide` runs against the matched record inside the atomic section
    /// and produces the replacement; the updated record is returned.
    async fn apply_correlated(
        &self,
        key: &CorrelationKey,
        decide: &(dyn for<'a> Fn(&'a Alarm) -> CorrelatedUpdate + Send + Sync),
    ) -> StoreResult<Alarm>;

    /// Apply an operator action to the record with the given id
    async fn apply_action(
        &self,
        id: &str,
        decide: &(dyn for<'a> Fn(&'a Alarm) -> ActionUpdate + Send + Sync),
    ) -> StoreResult<Alarm>;

    /// Fetch a record by id
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Alarm>>;

    /// Overwrite the heartbeat record for its origin
    async fn upsert_heartbeat(&self, heartbeat: Heartbeat) -> StoreResult<()>;

    /// Fetch the current heartbeat record for an origin
    async fn latest_heartbeat(&self, origin: &str) -> StoreResult<Option<Heartbeat>>;

    /// Close the backend and release resources
    async fn close(&self) -> StoreResult<()>;
}
