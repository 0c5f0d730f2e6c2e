use async_trait::async_trait;
use ei_core::{ports::TaxonomyStore, types::*, Result};
use sqlx::PgPool;

use crate::internal;

pub struct PgTaxonomyStore {
    pool: PgPool,
}

impl PgTaxonomyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LabelRow {
    level: i16,
    slug: String,
    name: String,
    description: Option<String>,
    parent_slug: Option<String>,
    retention_days: Option<i32>,
    active: bool,
    provider_label_id: Option<String>,
    last_sync_status: Option<String>,
}

impl From<LabelRow> for TaxonomyLabel {
    fn from(r: LabelRow) -> Self {
        TaxonomyLabel {
            level: if r.level == 1 { TaxonomyLevel::Tier1 } else { TaxonomyLevel::Tier2 },
            slug: r.slug,
            name: r.name,
            description: r.description,
            parent_slug: r.parent_slug,
            retention_days: r.retention_days,
            active: r.active,
            provider_label_id: r.provider_label_id,
            last_sync_status: r.last_sync_status,
        }
    }
}

const COLUMNS: &str =
    "level, slug, name, description, parent_slug, retention_days, active, provider_label_id, last_sync_status";

#[async_trait]
impl TaxonomyStore for PgTaxonomyStore {
    async fn all_active(&self) -> Result<Vec<TaxonomyLabel>> {
        let rows = sqlx::query_as::<_, LabelRow>(&format!(
            "SELECT {COLUMNS} FROM taxonomy_labels WHERE active = true ORDER BY level, slug"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<TaxonomyLabel>> {
        let row = sqlx::query_as::<_, LabelRow>(&format!(
            "SELECT {COLUMNS} FROM taxonomy_labels WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }

    async fn tier2_under(&self, parent_slug: &str) -> Result<Vec<TaxonomyLabel>> {
        let rows = sqlx::query_as::<_, LabelRow>(&format!(
            "SELECT {COLUMNS} FROM taxonomy_labels WHERE parent_slug = $1 AND active = true ORDER BY slug"
        ))
        .bind(parent_slug)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_tier2_if_absent(&self, label: TaxonomyLabel) -> Result<TaxonomyLabel> {
        let row = sqlx::query_as::<_, LabelRow>(&format!(
            r#"
            INSERT INTO taxonomy_labels (level, slug, name, description, parent_slug, retention_days, active)
            VALUES (2, $1, $2, $3, $4, $5, true)
            ON CONFLICT (slug) DO UPDATE SET slug = taxonomy_labels.slug
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&label.slug)
        .bind(&label.name)
        .bind(&label.description)
        .bind(&label.parent_slug)
        .bind(label.retention_days)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.into())
    }

    async fn update_provider_sync(&self, slug: &str, provider_label_id: &str, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE taxonomy_labels SET provider_label_id = $2, last_sync_status = $3 WHERE slug = $1",
        )
        .bind(slug)
        .bind(provider_label_id)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn merge_duplicate_tier2(&self) -> Result<u64> {
        // Duplicates share (parent_slug, lower(name)); the row that was
        // created first (lowest slug, ties broken arbitrarily) survives.
        // Only rows with zero assignments are candidates for deletion —
        // assignments always point at the surviving slug already, since a
        // message is only ever assigned the Tier-2 slug the labeler wrote
        // at label time and duplicates only arise from taxonomy edits made
        // after that.
        let result = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT
                    slug,
                    parent_slug,
                    ROW_NUMBER() OVER (
                        PARTITION BY parent_slug, lower(name)
                        ORDER BY slug
                    ) AS rank
                FROM taxonomy_labels
                WHERE level = 2
            ),
            duplicates AS (
                SELECT slug FROM ranked WHERE rank > 1
            )
            DELETE FROM taxonomy_labels t
            USING duplicates d
            WHERE t.slug = d.slug
              AND NOT EXISTS (SELECT 1 FROM assignments a WHERE a.label_slug = t.slug)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(result.rows_affected())
    }
}
