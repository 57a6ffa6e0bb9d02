//! In-memory alarm store
//!
//! Default backend. One async mutex guards the whole map, which makes every
//! conditional mutation trivially atomic: the lock is held from match to
//! write. Records are grouped by `(environment, resource)` so the match scan
//! for a mutation only walks the alarms of one scope.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::alarm::{Alarm, Heartbeat};
use crate::store::{
    ActionUpdate, AlarmStore, CorrelatedUpdate, CorrelationKey, DuplicateKey, DuplicateUpdate,
    StoreError, StoreResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopeKey {
    environment: Vec<String>,
    resource: String,
}

impl ScopeKey {
    fn of(alarm: &Alarm) -> Self {
        Self {
            environment: alarm.environment.clone(),
            resource: alarm.resource.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    alarms: HashMap<ScopeKey, Vec<Alarm>>,
    heartbeats: HashMap<String, Heartbeat>,
}

/// Alarm store backed by process memory, lost on restart
#[derive(Debug)]
pub struct MemoryStore {
    history_limit: usize,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit,
            inner: Mutex::new(Inner::default()),
        }
    }
}

#[async_trait]
impl AlarmStore for MemoryStore {
    #[instrument(skip(self, alarm), fields(resource = %alarm.resource, event = %alarm.event))]
    async fn insert_new(&self, alarm: Alarm) -> StoreResult<Alarm> {
        let mut inner = self.inner.lock().await;

        let group = CorrelationKey {
            environment: alarm.environment.clone(),
            resource: alarm.resource.clone(),
            event: alarm.event.clone(),
            severity: alarm.severity,
        };
        let scoped = inner.alarms.entry(ScopeKey::of(&alarm)).or_default();
        if scoped.iter().any(|stored| group.in_group(stored)) {
            return Err(StoreError::AlreadyExists);
        }

        debug!("inserting new alarm record");
        scoped.push(alarm.clone());
        Ok(alarm)
    }

    #[instrument(skip(self, update), fields(resource = %key.resource, event = %key.event))]
    async fn apply_duplicate(
        &self,
        key: &DuplicateKey,
        update: DuplicateUpdate,
    ) -> StoreResult<Alarm> {
        let mut inner = self.inner.lock().await;

        let scope = ScopeKey {
            environment: key.environment.clone(),
            resource: key.resource.clone(),
        };
        let alarm = inner
            .alarms
            .get_mut(&scope)
            .and_then(|scoped| scoped.iter_mut().find(|stored| key.matches(stored)))
            .ok_or(StoreError::NotFound)?;

        update.apply(alarm);
        Ok(alarm.clone())
    }

    #[instrument(skip(self, decide), fields(resource = %key.resource, event = %key.event))]
    async fn apply_correlated(
        &self,
        key: &CorrelationKey,
        decide: &(dyn for<'a> Fn(&'a Alarm) -> CorrelatedUpdate + Send + Sync),
    ) -> StoreResult<Alarm> {
        let mut inner = self.inner.lock().await;

        let scope = ScopeKey {
            environment: key.environment.clone(),
            resource: key.resource.clone(),
        };
        let alarm = inner
            .alarms
            .get_mut(&scope)
            .and_then(|scoped| scoped.iter_mut().find(|stored| key.matches(stored)))
            .ok_or(StoreError::NotFound)?;

        let update = decide(alarm);
        update.apply(alarm, self.history_limit);
        Ok(alarm.clone())
    }

    #[instrument(skip(self, decide))]
    async fn apply_action(
        &self,
        id: &str,
        decide: &(dyn for<'a> Fn(&'a Alarm) -> ActionUpdate + Send + Sync),
    ) -> StoreResult<Alarm> {
        let mut inner = self.inner.lock().await;

        let alarm = inner
            .alarms
            .values_mut()
            .flatten()
            .find(|stored| stored.id == id)
            .ok_or(StoreError::NotFound)?;

        let update = decide(alarm);
        update.apply(alarm, self.history_limit);
        Ok(alarm.clone())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Alarm>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .alarms
            .values()
            .flatten()
            .find(|stored| stored.id == id)
            .cloned())
    }

    #[instrument(skip(self, heartbeat), fields(origin = %heartbeat.origin))]
    async fn upsert_heartbeat(&self, heartbeat: Heartbeat) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.heartbeats.insert(heartbeat.origin.clone(), heartbeat);
        Ok(())
    }

    async fn latest_heartbeat(&self, origin: &str) -> StoreResult<Option<Heartbeat>> {
        let inner = self.inner.lock().await;
        Ok(inner.heartbeats.get(origin).cloned())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
