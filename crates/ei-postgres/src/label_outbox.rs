use async_trait::async_trait;
use ei_core::{ports::LabelOutboxStore, types::*, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::internal;

pub struct PgLabelOutboxStore {
    pool: PgPool,
}

impl PgLabelOutboxStore {
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

impl From<OutboxRow> for LabelOutboxRow {
    fn from(r: OutboxRow) -> Self {
        LabelOutboxRow {
            id: r.id,
            message_id: r.message_id,
            reason: r.reason.parse().unwrap_or(OutboxReason::NewAssignment),
            created_at: r.created_at,
            processed_at: r.processed_at,
            error: r.error,
        }
    }
}

#[async_trait]
impl LabelOutboxStore for PgLabelOutboxStore {
    async fn enqueue_if_absent(&self, message_id: &str, reason: OutboxReason) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO label_outbox (id, message_id, reason)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (
                SELECT 1 FROM label_outbox WHERE message_id = $2 AND processed_at IS NULL
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message_id)
        .bind(reason.to_string())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<LabelOutboxRow>> {
        // Single UPDATE ... RETURNING under FOR UPDATE SKIP LOCKED: the
        // claim itself is the only statement, so concurrent workers can
        // never observe and update the same row (spec §5 — no global lock,
        // isolation from the transaction alone).
        let row = sqlx::query_as::<_, OutboxRow>(
            r#"
            WITH claimable AS (
                SELECT id
                FROM label_outbox
                WHERE processed_at IS NULL
                  AND error IS NULL
                  AND (claimed_at IS NULL OR claimed_at < now() - interval '5 minutes')
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE label_outbox o
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
        sqlx::query("UPDATE label_outbox SET processed_at = now(), error = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE label_outbox SET processed_at = now(), error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn reset_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE label_outbox SET processed_at = NULL, error = NULL WHERE error IS NOT NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected())
    }

    async fn gc_processed(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM label_outbox WHERE processed_at IS NOT NULL AND processed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected())
    }
}
