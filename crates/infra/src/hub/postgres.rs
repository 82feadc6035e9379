//! Postgres-backed schedule and dead-letter stores.
//!
//! Each collection is a table holding the record document as JSONB, with the
//! indexed fields lifted into their own columns.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / Io / Tls | N/A | `Connection` |
//! | Other | N/A | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, instrument};

use super::config::StorageConfig;
use super::error::StoreError;
use super::store::{
    DeadLetterRecord, DeadLetterStore, HubStores, ScheduleRecord, ScheduleStore, StoreConnector,
};

/// Schedule and dead-letter tables in one database.
#[derive(Debug, Clone)]
pub struct PostgresHubStore {
    pool: Arc<PgPool>,
    schedule_table: String,
    dead_table: String,
}

impl PostgresHubStore {
    /// Table names are reduced to `[A-Za-z0-9_]`; anything else becomes `_`.
    pub fn new(pool: PgPool, storage: &StorageConfig) -> Self {
        Self {
            pool: Arc::new(pool),
            schedule_table: table_name(&storage.schedule),
            dead_table: table_name(&storage.dead),
        }
    }

    pub fn schedule_table(&self) -> &str {
        &self.schedule_table
    }

    pub fn dead_table(&self) -> &str {
        &self.dead_table
    }
}

#[async_trait]
impl ScheduleStore for PostgresHubStore {
    #[instrument(skip(self), fields(table = %self.schedule_table), err)]
    async fn ensure_schedule_indexes(&self) -> Result<(), StoreError> {
        let table = &self.schedule_table;
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{table}" (
                    id BIGSERIAL PRIMARY KEY,
                    scheduled_message_id TEXT NOT NULL,
                    due_time TIMESTAMPTZ NOT NULL,
                    document JSONB NOT NULL
                )
                "#
            ),
            format!(
                r#"CREATE UNIQUE INDEX IF NOT EXISTS "{table}_scheduledMessageId" ON "{table}" (scheduled_message_id)"#
            ),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schedule_indexes", e))?;
        }
        Ok(())
    }

    #[instrument(
        skip(self, record),
        fields(
            table = %self.schedule_table,
            scheduled_message_id = %record.scheduled_message_id,
            message_type = %record.message.message_type
        ),
        err
    )]
    async fn insert_scheduled(&self, record: &ScheduleRecord) -> Result<(), StoreError> {
        let document = serde_json::to_value(record)?;
        let sql = format!(
            r#"INSERT INTO "{}" (scheduled_message_id, due_time, document) VALUES ($1, $2, $3)"#,
            self.schedule_table
        );
        sqlx::query(&sql)
            .bind(record.scheduled_message_id.to_string())
            .bind(record.due_time)
            .bind(document)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_scheduled", e))?;
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for PostgresHubStore {
    #[instrument(skip(self), fields(table = %self.dead_table), err)]
    async fn ensure_dead_letter_indexes(&self) -> Result<(), StoreError> {
        let table = &self.dead_table;
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{table}" (
                    id BIGSERIAL PRIMARY KEY,
                    message_id TEXT,
                    killed_at TIMESTAMPTZ NOT NULL,
                    document JSONB NOT NULL
                )
                "#
            ),
            format!(r#"CREATE INDEX IF NOT EXISTS "{table}_killedAt" ON "{table}" (killed_at)"#),
            format!(r#"CREATE INDEX IF NOT EXISTS "{table}_messageId" ON "{table}" (message_id)"#),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_dead_letter_indexes", e))?;
        }
        Ok(())
    }

    #[instrument(
        skip(self, record),
        fields(table = %self.dead_table, message_type = %record.message.message_type),
        err
    )]
    async fn insert_dead_letter(&self, record: &DeadLetterRecord) -> Result<(), StoreError> {
        let document = serde_json::to_value(record)?;
        let sql = format!(
            r#"INSERT INTO "{}" (message_id, killed_at, document) VALUES ($1, $2, $3)"#,
            self.dead_table
        );
        sqlx::query(&sql)
            .bind(record.message_id())
            .bind(record.killed_at)
            .bind(document)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_dead_letter", e))?;
        Ok(())
    }
}

/// Connects to `storage.host` (a Postgres URL).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

#[async_trait]
impl StoreConnector for PostgresConnector {
    async fn connect(&self, storage: &StorageConfig) -> Result<HubStores, StoreError> {
        let url = storage
            .host
            .as_deref()
            .ok_or_else(|| StoreError::Connection("service.storage.host is not configured".into()))?;
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(schedule = %storage.schedule, dead = %storage.dead, "connected to postgres hub store");

        let store = Arc::new(PostgresHubStore::new(pool, storage));
        Ok(HubStores {
            schedule: store.clone(),
            dead_letter: store,
        })
    }
}

fn table_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Duplicate(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Connection(format!("{} in {}", err, operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
