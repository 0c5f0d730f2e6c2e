use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ei_core::{ports::MessageStore, types::*, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::internal;

pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    provider_id: String,
    thread_id: String,
    ts: DateTime<Utc>,
    is_unread: bool,
    provider_labels: Vec<String>,
    from_address: String,
    from_domain: String,
    to_addresses: Vec<String>,
    cc_addresses: Vec<String>,
    subject_raw: String,
    subject_normalized: String,
    category: Option<String>,
    subcategory: Option<String>,
    labeler_version: Option<String>,
    cluster_id: Option<Uuid>,
    archived_at: Option<DateTime<Utc>>,
    trashed_at: Option<DateTime<Utc>>,
}

impl From<MessageRow> for Message {
    fn from(r: MessageRow) -> Self {
        Message {
            provider_id: r.provider_id,
            thread_id: r.thread_id,
            timestamp: r.ts,
            is_unread: r.is_unread,
            provider_labels: r.provider_labels,
            from_address: r.from_address,
            from_domain: r.from_domain,
            to_addresses: r.to_addresses,
            cc_addresses: r.cc_addresses,
            subject_raw: r.subject_raw,
            subject_normalized: r.subject_normalized,
            category: r.category,
            subcategory: r.subcategory,
            labeler_version: r.labeler_version,
            cluster_id: r.cluster_id,
            archived_at: r.archived_at,
            trashed_at: r.trashed_at,
        }
    }
}

const SELECT_COLUMNS: &str = "provider_id, thread_id, ts, is_unread, provider_labels, \
    from_address, from_domain, to_addresses, cc_addresses, subject_raw, subject_normalized, \
    category, subcategory, labeler_version, cluster_id, archived_at, trashed_at";

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn upsert_metadata(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                provider_id, thread_id, ts, is_unread, provider_labels,
                from_address, from_domain, to_addresses, cc_addresses,
                subject_raw, subject_normalized
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (provider_id) DO UPDATE SET
                thread_id = EXCLUDED.thread_id,
                ts = EXCLUDED.ts,
                is_unread = EXCLUDED.is_unread,
                provider_labels = EXCLUDED.provider_labels,
                from_address = EXCLUDED.from_address,
                from_domain = EXCLUDED.from_domain,
                to_addresses = EXCLUDED.to_addresses,
                cc_addresses = EXCLUDED.cc_addresses,
                subject_raw = EXCLUDED.subject_raw,
                subject_normalized = EXCLUDED.subject_normalized
            "#,
        )
        .bind(&message.provider_id)
        .bind(&message.thread_id)
        .bind(message.timestamp)
        .bind(message.is_unread)
        .bind(&message.provider_labels)
        .bind(&message.from_address)
        .bind(&message.from_domain)
        .bind(&message.to_addresses)
        .bind(&message.cc_addresses)
        .bind(&message.subject_raw)
        .bind(&message.subject_normalized)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get(&self, provider_id: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages WHERE provider_id = $1"
        ))
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }

    async fn set_category_if_unset(
        &self,
        provider_id: &str,
        cluster_id: Option<Uuid>,
        category: &str,
        subcategory: Option<&str>,
        labeler_version: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET category = $2, subcategory = $3, labeler_version = $4, cluster_id = $5
            WHERE provider_id = $1 AND category IS NULL
            "#,
        )
        .bind(provider_id)
        .bind(category)
        .bind(subcategory)
        .bind(labeler_version)
        .bind(cluster_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlabelled(&self, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages \
             WHERE category IS NULL AND trashed_at IS NULL \
             ORDER BY ts ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_unlabelled(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE category IS NULL AND trashed_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(count)
    }

    async fn unlabelled_by_domain(&self, domain: &str, exclude_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages \
             WHERE category IS NULL AND trashed_at IS NULL \
               AND from_domain = $1 AND provider_id <> $2 \
             ORDER BY ts ASC, provider_id ASC"
        ))
        .bind(domain)
        .bind(exclude_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn recent_by_sender(&self, from_address: &str, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages \
             WHERE from_address = $1 ORDER BY ts DESC LIMIT $2"
        ))
        .bind(from_address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stamp_archived(&self, provider_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE messages SET archived_at = $2 WHERE provider_id = $1")
            .bind(provider_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn stamp_trashed(&self, provider_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE messages SET trashed_at = $2 WHERE provider_id = $1")
            .bind(provider_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn by_category(&self, category: &str, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages WHERE category = $1 ORDER BY ts DESC LIMIT $2"
        ))
        .bind(category)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn recent_window(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages WHERE ts >= $1 ORDER BY ts DESC LIMIT $2"
        ))
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn retention_eligible(&self, default_days: i32, now: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT m.provider_id
            FROM messages m
            LEFT JOIN taxonomy_labels child ON child.slug = m.subcategory
            LEFT JOIN taxonomy_labels parent ON parent.slug = m.category
            WHERE m.archived_at IS NULL
              AND m.ts <= $2 - (COALESCE(child.retention_days, parent.retention_days, $1) || ' days')::interval
            "#,
        )
        .bind(default_days)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows)
    }

    async fn upsert_assignment(&self, assignment: &Assignment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO assignments (message_id, label_slug, assigned_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id) DO UPDATE SET
                label_slug = EXCLUDED.label_slug, assigned_at = EXCLUDED.assigned_at
            "#,
        )
        .bind(&assignment.message_id)
        .bind(&assignment.label_slug)
        .bind(assignment.assigned_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn all_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT provider_id FROM messages")
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        Ok(rows)
    }
}
