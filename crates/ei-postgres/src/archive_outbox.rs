use async_trait::async_trait;
use ei_core::{ports::ArchiveOutboxStore, types::*, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::internal;

pub struct PgArchiveOutboxStore {
    pool: PgPool,
}

impl PgArchiveOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    message_id: String,
    reason: String,
    created_at: chrono::DateTime<chrono::Utc>,
    processed_at: Option<chrono::DateTime<chrono::Utc>>,
    error: Option<String>,
}

impl From<OutboxRow> for ArchiveOutboxRow {
    fn from(r: OutboxRow) -> Self {
        ArchiveOutboxRow {
            id: r.id,
            message_id: r.message_id,
            reason: r.reason,
            created_at: r.created_at,
            processed_at: r.processed_at,
            error: r.error,
        }
    }
}

#[async_trait]
impl ArchiveOutboxStore for PgArchiveOutboxStore {
    async fn plan(&self, message_id: &str, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO archive_outbox (id, message_id, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id) DO UPDATE SET
                reason = EXCLUDED.reason,
                claimed_at = NULL,
                processed_at = NULL,
                error = NULL
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<ArchiveOutboxRow>> {
        let row = sqlx::query_as::<_, OutboxRow>(
            r#"
            WITH claimable AS (
                SELECT id
                FROM archive_outbox
                WHERE processed_at IS NULL
                  AND error IS NULL
                  AND (claimed_at IS NULL OR claimed_at < now() - interval '5 minutes')
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE archive_outbox o
            SET claimed_at = now()
            FROM claimable c
            WHERE o.id = c.id
            RETURNING o.id, o.message_id, o.reason, o.created_at, o.processed_at, o.error
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }

    async fn mark_processed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE archive_outbox SET processed_at = now(), error = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE archive_outbox SET claimed_at = NULL, error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn gc_processed(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM archive_outbox WHERE processed_at IS NOT NULL AND processed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected())
    }
}
