//! SQLite alarm store
//!
//! Persistent backend behind the `storage-sqlite` feature. Records survive a
//! daemon restart, so open alarms keep their duplicate counts and history.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers stay unblocked during writes
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Atomicity
//!
//! The pool is capped at a single connection and every conditional mutation
//! runs in a transaction on it, so the match-then-write sequence of one
//! mutation can never interleave with another. Match predicates and decision
//! closures run in process against the deserialized document, identical to
//! the in-memory backend; the table only carries denormalized identity
//! columns for the scope lookup.
//!
//! ## Limitations
//!
//! - **Concurrency**: One writer at a time (plenty for a single daemon)
//! - **Distributed**: Single-machine only

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use crate::alarm::{Alarm, Heartbeat};
use crate::store::{
    ActionUpdate, AlarmStore, CorrelatedUpdate, CorrelationKey, DuplicateKey, DuplicateUpdate,
    StoreError, StoreResult,
};

/// Alarm store backed by a local SQLite database file
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
    history_limit: usize,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>, history_limit: usize) -> StoreResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {db_path_str}");

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30)); // Retry on lock contention

        // A single connection serializes mutations; each transaction owns the
        // connection from begin to commit
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
            history_limit,
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Canonical environment encoding for the scope column
    fn encode_environment(environment: &[String]) -> StoreResult<String> {
        Ok(serde_json::to_string(environment)?)
    }

    fn decode_alarm(document: &str) -> StoreResult<Alarm> {
        Ok(serde_json::from_str(document)?)
    }

    /// Load all records of one `(environment, resource)` scope inside the
    /// caller's transaction
    async fn scope_rows(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        environment: &str,
        resource: &str,
    ) -> StoreResult<Vec<(i64, Alarm)>> {
        let rows = sqlx::query(
            "SELECT rowid, document FROM alarms WHERE environment = ? AND resource = ?",
        )
        .bind(environment)
        .bind(resource)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter()
            .map(|row| {
                let document: String = row.get("document");
                Ok((row.get("rowid"), Self::decode_alarm(&document)?))
            })
            .collect()
    }

    /// Rewrite one row from its updated document
    async fn store_row(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        rowid: i64,
        alarm: &Alarm,
    ) -> StoreResult<()> {
        let document = serde_json::to_string(alarm)?;
        sqlx::query(
            r#"
            UPDATE alarms
            SET alarm_id = ?, event = ?, severity = ?, status = ?, document = ?
            WHERE rowid = ?
            "#,
        )
        .bind(&alarm.id)
        .bind(&alarm.event)
        .bind(alarm.severity.as_str())
        .bind(alarm.status.as_str())
        .bind(document)
        .bind(rowid)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AlarmStore for SqliteStore {
    #[instrument(skip(self, alarm), fields(resource = %alarm.resource, event = %alarm.event))]
    async fn insert_new(&self, alarm: Alarm) -> StoreResult<Alarm> {
        let environment = Self::encode_environment(&alarm.environment)?;
        let mut tx = self.pool.begin().await?;

        let group = CorrelationKey {
            environment: alarm.environment.clone(),
            resource: alarm.resource.clone(),
            event: alarm.event.clone(),
            severity: alarm.severity,
        };
        let scoped = Self::scope_rows(&mut tx, &environment, &alarm.resource).await?;
        if scoped.iter().any(|(_, stored)| group.in_group(stored)) {
            return Err(StoreError::AlreadyExists);
        }

        debug!("inserting new alarm record");
        let document = serde_json::to_string(&alarm)?;
        sqlx::query(
            r#"
            INSERT INTO alarms (alarm_id, environment, resource, event, severity, status, document)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alarm.id)
        .bind(&environment)
        .bind(&alarm.resource)
        .bind(&alarm.event)
        .bind(alarm.severity.as_str())
        .bind(alarm.status.as_str())
        .bind(document)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(alarm)
    }

    #[instrument(skip(self, update), fields(resource = %key.resource, event = %key.event))]
    async fn apply_duplicate(
        &self,
        key: &DuplicateKey,
        update: DuplicateUpdate,
    ) -> StoreResult<Alarm> {
        let environment = Self::encode_environment(&key.environment)?;
        let mut tx = self.pool.begin().await?;

        let scoped = Self::scope_rows(&mut tx, &environment, &key.resource).await?;
        let (rowid, mut alarm) = scoped
            .into_iter()
            .find(|(_, stored)| key.matches(stored))
            .ok_or(StoreError::NotFound)?;

        update.apply(&mut alarm);
        Self::store_row(&mut tx, rowid, &alarm).await?;
        tx.commit().await?;
        Ok(alarm)
    }

    #[instrument(skip(self, decide), fields(resource = %key.resource, event = %key.event))]
    async fn apply_correlated(
        &self,
        key: &CorrelationKey,
        decide: &(dyn for<'a> Fn(&'a Alarm) -> CorrelatedUpdate + Send + Sync),
    ) -> StoreResult<Alarm> {
        let environment = Self::encode_environment(&key.environment)?;
        let mut tx = self.pool.begin().await?;

        let scoped = Self::scope_rows(&mut tx, &environment, &key.resource).await?;
        let (rowid, mut alarm) = scoped
            .into_iter()
            .find(|(_, stored)| key.matches(stored))
            .ok_or(StoreError::NotFound)?;

        let update = decide(&alarm);
        update.apply(&mut alarm, self.history_limit);
        Self::store_row(&mut tx, rowid, &alarm).await?;
        tx.commit().await?;
        Ok(alarm)
    }

    #[instrument(skip(self, decide))]
    async fn apply_action(
        &self,
        id: &str,
        decide: &(dyn for<'a> Fn(&'a Alarm) -> ActionUpdate + Send + Sync),
    ) -> StoreResult<Alarm> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT rowid, document FROM alarms WHERE alarm_id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let rowid: i64 = row.get("rowid");
        let document: String = row.get("document");
        let mut alarm = Self::decode_alarm(&document)?;

        let update = decide(&alarm);
        update.apply(&mut alarm, self.history_limit);
        Self::store_row(&mut tx, rowid, &alarm).await?;
        tx.commit().await?;
        Ok(alarm)
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Alarm>> {
        let row = sqlx::query("SELECT document FROM alarms WHERE alarm_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.get("document");
                Ok(Some(Self::decode_alarm(&document)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, heartbeat), fields(origin = %heartbeat.origin))]
    async fn upsert_heartbeat(&self, heartbeat: Heartbeat) -> StoreResult<()> {
        let document = serde_json::to_string(&heartbeat)?;
        sqlx::query(
            r#"
            INSERT INTO heartbeats (origin, document)
            VALUES (?, ?)
            ON CONFLICT (origin) DO UPDATE SET document = excluded.document
            "#,
        )
        .bind(&heartbeat.origin)
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_heartbeat(&self, origin: &str) -> StoreResult<Option<Heartbeat>> {
        let row = sqlx::query("SELECT document FROM heartbeats WHERE origin = ?")
            .bind(origin)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.get("document");
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn close(&self) -> StoreResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
