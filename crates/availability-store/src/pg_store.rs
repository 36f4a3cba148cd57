//! `PostgreSQL` implementation of the document repository and outbox store.

use async_trait::async_trait;
use availability_core::error::DomainError;
use availability_core::outbox::{OutboxEntry, OutboxState, OutboxStore};
use availability_core::repository::{DocumentRepository, StoredDocument};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::schema::{CREATE_OUTBOX_TABLE, CREATE_RESOURCE_DOCUMENTS_TABLE};

const OUTBOX_COLUMNS: &str = "message_id, aggregate_id, event_type, payload, correlation_id, \
     span_context, state, attempts, last_error, claimed_by, claimed_until, created_at, \
     dispatched_at";

fn infrastructure(context: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::Infrastructure(format!("{context}: {e}"))
}

/// PostgreSQL-backed document store with a transactional outbox.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_RESOURCE_DOCUMENTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure("create resource_documents"))?;
        sqlx::raw_sql(CREATE_OUTBOX_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure("create outbox_messages"))?;
        Ok(())
    }

    async fn write_document(
        tx: &mut Transaction<'_, Postgres>,
        document: &StoredDocument,
        expected_version: Option<i64>,
    ) -> Result<(), DomainError> {
        let written = match expected_version {
            None => sqlx::query(
                r"
                INSERT INTO resource_documents (id, version, body)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(document.id)
            .bind(document.version)
            .bind(&document.body)
            .execute(&mut **tx)
            .await
            .map_err(infrastructure("insert resource document"))?,
            Some(expected) => sqlx::query(
                r"
                UPDATE resource_documents
                SET version = $2, body = $3, updated_at = NOW()
                WHERE id = $1 AND version = $4
                ",
            )
            .bind(document.id)
            .bind(document.version)
            .bind(&document.body)
            .bind(expected)
            .execute(&mut **tx)
            .await
            .map_err(infrastructure("update resource document"))?,
        };

        if written.rows_affected() == 1 {
            return Ok(());
        }

        let actual: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM resource_documents WHERE id = $1")
                .bind(document.id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(infrastructure("read resource version"))?;
        Err(DomainError::ConcurrencyConflict {
            aggregate_id: document.id,
            expected: expected_version,
            actual: actual.map(|(v,)| v),
        })
    }

    async fn append_outbox(
        tx: &mut Transaction<'_, Postgres>,
        entries: &[OutboxEntry],
    ) -> Result<(), DomainError> {
        for entry in entries {
            sqlx::query(
                r"
                INSERT INTO outbox_messages (
                    message_id, aggregate_id, event_type, payload, correlation_id,
                    span_context, state, attempts, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(entry.message_id)
            .bind(entry.aggregate_id)
            .bind(&entry.event_type)
            .bind(&entry.payload)
            .bind(entry.correlation_id)
            .bind(entry.span_context.as_deref())
            .bind(entry.state.as_str())
            .bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
            .bind(entry.created_at)
            .execute(&mut **tx)
            .await
            .map_err(infrastructure("insert outbox entry"))?;
        }
        Ok(())
    }
}

fn outbox_entry_from_row(row: &PgRow) -> Result<OutboxEntry, DomainError> {
    let decode = infrastructure("decode outbox row");
    let read = || -> Result<OutboxEntry, sqlx::Error> {
        let state: String = row.try_get("state")?;
        let attempts: i32 = row.try_get("attempts")?;
        Ok(OutboxEntry {
            message_id: row.try_get("message_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            correlation_id: row.try_get("correlation_id")?,
            span_context: row.try_get("span_context")?,
            state: OutboxState::parse(&state)
                .map_err(|e| sqlx::Error::Decode(e.to_string().into()))?,
            attempts: u32::try_from(attempts).unwrap_or(0),
            last_error: row.try_get("last_error")?,
            claimed_by: row.try_get("claimed_by")?,
            claimed_until: row.try_get("claimed_until")?,
            created_at: row.try_get("created_at")?,
            dispatched_at: row.try_get("dispatched_at")?,
        })
    };
    read().map_err(decode)
}

#[async_trait]
impl DocumentRepository for PgDocumentStore {
    async fn load(&self, id: Uuid) -> Result<Option<StoredDocument>, DomainError> {
        let row: Option<(Uuid, i64, serde_json::Value)> =
            sqlx::query_as("SELECT id, version, body FROM resource_documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(infrastructure("load resource document"))?;
        Ok(row.map(|(id, version, body)| StoredDocument { id, version, body }))
    }

    async fn list(&self) -> Result<Vec<StoredDocument>, DomainError> {
        let rows: Vec<(Uuid, i64, serde_json::Value)> =
            sqlx::query_as("SELECT id, version, body FROM resource_documents ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(infrastructure("list resource documents"))?;
        Ok(rows
            .into_iter()
            .map(|(id, version, body)| StoredDocument { id, version, body })
            .collect())
    }

    #[instrument(skip(self, document, outbox), fields(document_id = %document.id))]
    async fn save(
        &self,
        document: StoredDocument,
        expected_version: Option<i64>,
        outbox: &[OutboxEntry],
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(infrastructure("begin transaction"))?;

        // Dropping `tx` on an early return rolls back.
        Self::write_document(&mut tx, &document, expected_version).await?;
        Self::append_outbox(&mut tx, outbox).await?;

        tx.commit().await.map_err(infrastructure("commit"))?;
        debug!(
            version = document.version,
            outbox_entries = outbox.len(),
            "document committed"
        );
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PgDocumentStore {
    async fn claim_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        let sql = format!(
            r"
            UPDATE outbox_messages
            SET claimed_by = $1, claimed_until = $2, attempts = attempts + 1
            WHERE message_id IN (
                SELECT message_id FROM outbox_messages
                WHERE state = 'pending'
                  AND (claimed_until IS NULL OR claimed_until <= $3)
                ORDER BY created_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {OUTBOX_COLUMNS}
            "
        );
        let rows = sqlx::query(&sql)
            .bind(worker_id)
            .bind(lease_until)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure("claim outbox entries"))?;

        let mut entries = rows
            .iter()
            .map(outbox_entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        // RETURNING does not preserve the subquery order.
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn mark_dispatched(
        &self,
        message_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r"
            UPDATE outbox_messages
            SET state = 'dispatched', dispatched_at = $2, claimed_by = NULL, claimed_until = NULL
            WHERE message_id = $1 AND state = 'pending'
            ",
        )
        .bind(message_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(infrastructure("mark outbox entry dispatched"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(
        &self,
        message_id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r"
            UPDATE outbox_messages
            SET last_error = $2, claimed_by = NULL, claimed_until = $3
            WHERE message_id = $1 AND state = 'pending'
            ",
        )
        .bind(message_id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await
        .map_err(infrastructure("release outbox entry"))?;
        Ok(())
    }

    async fn purge_dispatched(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM outbox_messages WHERE state = 'dispatched' AND dispatched_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(infrastructure("purge outbox entries"))?;
        Ok(result.rows_affected())
    }

    async fn get(&self, message_id: Uuid) -> Result<Option<OutboxEntry>, DomainError> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox_messages WHERE message_id = $1");
        let row = sqlx::query(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure("load outbox entry"))?;
        row.as_ref().map(outbox_entry_from_row).transpose()
    }
}
