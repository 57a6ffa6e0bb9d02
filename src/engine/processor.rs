//! Per-event processing logic
//!
//! One [`AlertProcessor`] instance is shared by all workers. It holds no
//! per-event state of its own; everything an event changes goes through the
//! store's atomic mutations, which is what makes concurrent workers safe.
//!
//! ## Classification cascade
//!
//! An alert is classified by *attempting* the three mutations in strict
//! order and letting the store decide:
//!
//! 1. duplicate update, matched on `(environment, resource, event,
//!    severity)` exactly
//! 2. correlated replacement, matched on the alarm group within
//!    `(environment, resource)`
//! 3. insert of a fresh record
//!
//! `NotFound` from 1 or 2 falls through to the next attempt; `AlreadyExists`
//! from 3 means a concurrent worker created the group between our attempts,
//! so the whole cascade restarts and will now match 1 or 2. The restart
//! count is bounded to keep pathological contention from looping forever.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::alarm::{Alarm, Heartbeat, History, expire_time_for};
use crate::bus::MessageBus;
use crate::event::{AlertEvent, HeartbeatEvent, InboundEvent};
use crate::lifecycle::AlarmModel;
use crate::severity::Severity;
use crate::status::Action;
use crate::store::{
    AlarmStore, CorrelatedUpdate, CorrelationKey, DuplicateKey, DuplicateUpdate, StoreError,
};
use crate::throttle::TokenGate;

/// Upper bound on cascade restarts after lost store races
pub const MAX_CLASSIFY_ATTEMPTS: u32 = 5;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors the processing of one event can fail with
///
/// Lost races never surface here; they are absorbed by the cascade until
/// the attempt bound runs out.
#[derive(Debug)]
pub enum EngineError {
    /// The store could not complete a mutation
    Store(StoreError),

    /// The classification cascade kept losing races until the bound
    ContentionExhausted { attempts: u32 },
}

impl EngineError {
    /// Whether redelivering the event later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(err) => err.is_retryable(),
            EngineError::ContentionExhausted { .. } => false,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Store(err) => write!(f, "store mutation failed: {err}"),
            EngineError::ContentionExhausted { attempts } => {
                write!(f, "classification still racing after {attempts} attempts")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err)
    }
}

/// How one event ended up being applied
#[derive(Debug)]
pub enum Outcome {
    /// First event of its alarm group; forwarded
    Created(Alarm),
    /// Episode replacement on an existing group; forwarded
    Correlated(Alarm),
    /// Exact repeat absorbed in place; not forwarded
    Deduplicated(Alarm),
    /// Liveness record upserted; not forwarded
    Heartbeat,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created(_) => "created",
            Outcome::Correlated(_) => "correlated",
            Outcome::Deduplicated(_) => "deduplicated",
            Outcome::Heartbeat => "heartbeat",
        }
    }
}

/// Stateless event processor shared by all workers
pub struct AlertProcessor {
    store: Arc<dyn AlarmStore>,
    model: Arc<dyn AlarmModel>,
    bus: Arc<dyn MessageBus>,
    notify_destination: String,
    audit_destination: String,
    /// Optional notification volume cap; audit copies are never capped
    notify_gate: Option<Arc<TokenGate>>,
    alert_timeout: i64,
    heartbeat_timeout: i64,
}

impl AlertProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn AlarmStore>,
        model: Arc<dyn AlarmModel>,
        bus: Arc<dyn MessageBus>,
        notify_destination: String,
        audit_destination: String,
        notify_gate: Option<Arc<TokenGate>>,
        alert_timeout: i64,
        heartbeat_timeout: i64,
    ) -> Self {
        info!(
            model = model.name(),
            "processor using alarm model '{}'",
            model.name()
        );
        Self {
            store,
            model,
            bus,
            notify_destination,
            audit_destination,
            notify_gate,
            alert_timeout,
            heartbeat_timeout,
        }
    }

    /// Apply one parsed event to the alarm state
    #[instrument(skip_all, fields(event = %event.describe()))]
    pub async fn process(&self, event: &InboundEvent) -> EngineResult<Outcome> {
        match event {
            InboundEvent::Heartbeat(heartbeat) => self.process_heartbeat(heartbeat).await,
            InboundEvent::Alert(alert) => self.process_alert(alert).await,
        }
    }

    async fn process_heartbeat(&self, heartbeat: &HeartbeatEvent) -> EngineResult<Outcome> {
        let receive_time = heartbeat.receive_time.unwrap_or_else(Utc::now);
        let record = Heartbeat {
            id: heartbeat.id.clone(),
            origin: heartbeat.origin.clone(),
            tags: heartbeat.tags.clone(),
            version: heartbeat.version.clone(),
            create_time: heartbeat.create_time.unwrap_or(receive_time),
            receive_time,
            timeout: heartbeat.timeout.unwrap_or(self.heartbeat_timeout),
        };

        self.store.upsert_heartbeat(record).await?;
        debug!(origin = %heartbeat.origin, "heartbeat upserted");
        Ok(Outcome::Heartbeat)
    }

    async fn process_alert(&self, alert: &AlertEvent) -> EngineResult<Outcome> {
        let receive_time = alert.receive_time.unwrap_or_else(Utc::now);
        let create_time = alert.create_time.unwrap_or(receive_time);
        let severity = alert.severity.unwrap_or(Severity::Indeterminate);
        let timeout = alert.timeout.unwrap_or(self.alert_timeout);
        let expire_time = expire_time_for(create_time, timeout);

        for attempt in 1..=MAX_CLASSIFY_ATTEMPTS {
            if attempt > 1 {
                debug!(attempt, "re-classifying after lost store race");
            }

            let duplicate_key = DuplicateKey {
                environment: alert.environment.clone(),
                resource: alert.resource.clone(),
                event: alert.event.clone(),
                severity,
            };
            let update = self.duplicate_update(alert, receive_time, expire_time, timeout);
            match self.store.apply_duplicate(&duplicate_key, update).await {
                Ok(alarm) => {
                    debug!(
                        id = %alarm.id,
                        count = alarm.duplicate_count,
                        "duplicate absorbed, not forwarded"
                    );
                    return Ok(Outcome::Deduplicated(alarm));
                }
                Err(StoreError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }

            let correlation_key = CorrelationKey {
                environment: alert.environment.clone(),
                resource: alert.resource.clone(),
                event: alert.event.clone(),
                severity,
            };
            let decide = |stored: &Alarm| {
                self.correlated_update(
                    stored,
                    alert,
                    severity,
                    create_time,
                    receive_time,
                    timeout,
                    expire_time,
                )
            };
            match self.store.apply_correlated(&correlation_key, &decide).await {
                Ok(alarm) => {
                    debug!(
                        id = %alarm.id,
                        severity = %alarm.severity,
                        status = %alarm.status,
                        "correlated into existing group"
                    );
                    self.forward(&alarm).await;
                    return Ok(Outcome::Correlated(alarm));
                }
                Err(StoreError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }

            // No group matched; open a fresh record. An explicitly supplied
            // status (e.g. an upstream suppression marker) wins over the
            // model's derivation.
            let status = match alert.status {
                Some(status) => status,
                None => {
                    self.model
                        .transition(Severity::Unknown, severity, None, None, None)
                        .1
                }
            };
            let record = Alarm::from_event(
                alert,
                severity,
                Severity::Unknown,
                status,
                create_time,
                receive_time,
                timeout,
            );
            match self.store.insert_new(record).await {
                Ok(alarm) => {
                    debug!(id = %alarm.id, status = %alarm.status, "new alarm created");
                    self.forward(&alarm).await;
                    return Ok(Outcome::Created(alarm));
                }
                Err(StoreError::AlreadyExists) => {
                    // A concurrent worker created the group first; the next
                    // pass will see it as duplicate or correlated
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(
            resource = %alert.resource,
            event = %alert.event,
            "classification contention bound reached"
        );
        Err(EngineError::ContentionExhausted {
            attempts: MAX_CLASSIFY_ATTEMPTS,
        })
    }

    /// Apply an operator action against a stored record
    ///
    /// The severity/status outcome is decided by the alarm model against the
    /// record's stored state, inside the store's atomic section.
    #[instrument(skip(self, text))]
    pub async fn apply_action(
        &self,
        id: &str,
        action: Action,
        text: Option<String>,
    ) -> EngineResult<Alarm> {
        let model = Arc::clone(&self.model);
        let now = Utc::now();
        let decide = move |stored: &Alarm| {
            let (severity, status) = model.transition(
                stored.previous_severity,
                stored.severity,
                Some(stored.status),
                Some(stored.status),
                Some(action),
            );
            let history = (status != stored.status).then(|| History::StatusChange {
                id: stored.id.clone(),
                status,
                text: text.clone(),
                update_time: now,
            });
            crate::store::ActionUpdate {
                severity,
                status,
                history,
            }
        };

        let alarm = self.store.apply_action(id, &decide).await?;
        info!(id = %alarm.id, status = %alarm.status, "action '{action}' applied");
        Ok(alarm)
    }

    fn duplicate_update(
        &self,
        alert: &AlertEvent,
        receive_time: DateTime<Utc>,
        expire_time: Option<DateTime<Utc>>,
        timeout: i64,
    ) -> DuplicateUpdate {
        DuplicateUpdate {
            last_receive_time: receive_time,
            last_receive_id: alert.id.clone(),
            expire_time,
            timeout,
            group: alert.group.clone(),
            value: alert.value.clone(),
            text: alert.text.clone(),
            summary: alert.summary.clone(),
            tags: alert.tags.clone(),
            origin: alert.origin.clone(),
            event_type: alert.event_type.clone(),
            service: alert.service.clone(),
            threshold_info: alert.threshold_info.clone(),
            raw_data: alert.raw_data.clone(),
            more_info: alert.more_info.clone(),
            graph_urls: alert.graph_urls.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn correlated_update(
        &self,
        stored: &Alarm,
        alert: &AlertEvent,
        severity: Severity,
        create_time: DateTime<Utc>,
        receive_time: DateTime<Utc>,
        timeout: i64,
        expire_time: Option<DateTime<Utc>>,
    ) -> CorrelatedUpdate {
        let previous_severity = stored.severity;
        let trend = self.model.trend(previous_severity, severity);
        let (_, status) = self.model.transition(
            previous_severity,
            severity,
            Some(stored.status),
            alert.status,
            None,
        );

        let mut history = vec![History::Episode {
            id: alert.id.clone(),
            event: alert.event.clone(),
            severity,
            value: alert.value.clone(),
            text: alert.text.clone(),
            create_time,
            receive_time,
        }];
        if status != stored.status {
            history.push(History::StatusChange {
                id: alert.id.clone(),
                status,
                text: alert.text.clone(),
                update_time: receive_time,
            });
        }

        CorrelatedUpdate {
            id: alert.id.clone(),
            event: alert.event.clone(),
            severity,
            previous_severity,
            trend_indication: trend,
            status,
            create_time,
            receive_time,
            last_receive_time: receive_time,
            last_receive_id: alert.id.clone(),
            timeout,
            expire_time,
            group: alert.group.clone(),
            value: alert.value.clone(),
            text: alert.text.clone(),
            summary: alert.summary.clone(),
            tags: alert.tags.clone(),
            origin: alert.origin.clone(),
            event_type: alert.event_type.clone(),
            service: alert.service.clone(),
            threshold_info: alert.threshold_info.clone(),
            raw_data: alert.raw_data.clone(),
            more_info: alert.more_info.clone(),
            graph_urls: alert.graph_urls.clone(),
            history,
        }
    }

    /// Publish the record's current state downstream
    ///
    /// The audit copy always goes out; the notify copy is skipped for
    /// suppressed alarms and when the notification gate is empty. Forwarding
    /// failures are logged, never propagated: the record is already stored.
    async fn forward(&self, alarm: &Alarm) {
        let body = match alarm.wire_body() {
            Ok(body) => body.to_string(),
            Err(err) => {
                error!(id = %alarm.id, "outbound record serialization failed: {err}");
                return;
            }
        };

        if let Err(err) = self.bus.publish(&self.audit_destination, body.clone()).await {
            warn!(id = %alarm.id, "audit publish failed: {err}");
        }

        if self.model.is_suppressed(alarm) {
            debug!(id = %alarm.id, status = %alarm.status, "suppressed, notify skipped");
            return;
        }
        if let Some(gate) = &self.notify_gate {
            if !gate.try_acquire() {
                warn!(id = %alarm.id, "notification volume cap hit, notify skipped");
                return;
            }
        }
        if let Err(err) = self.bus.publish(&self.notify_destination, body).await {
            warn!(id = %alarm.id, "notify publish failed: {err}");
        }
    }
}
