use async_trait::async_trait;
use ei_core::{ports::ClusterStore, types::*, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::internal;

pub struct PgClusterStore {
    pool: PgPool,
}

impl PgClusterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ClusterRow {
    cluster_id: Uuid,
    seed_message_id: String,
    similarity_threshold: f64,
    labeler_version: String,
    frequency: Option<String>,
    unread_ratio: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
}

impl From<ClusterRow> for Cluster {
    fn from(r: ClusterRow) -> Self {
        Cluster {
            cluster_id: r.cluster_id,
            seed_message_id: r.seed_message_id,
            similarity_threshold: r.similarity_threshold,
            labeler_version: r.labeler_version,
            frequency: r.frequency.and_then(|s| s.parse().ok()),
            unread_ratio: r.unread_ratio.and_then(|s| s.parse().ok()),
            category: r.category,
            subcategory: r.subcategory,
        }
    }
}

#[async_trait]
impl ClusterStore for PgClusterStore {
    async fn upsert(&self, cluster: &Cluster) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clusters (
                cluster_id, seed_message_id, similarity_threshold, labeler_version,
                frequency, unread_ratio, category, subcategory
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cluster_id) DO UPDATE SET
                frequency = EXCLUDED.frequency,
                unread_ratio = EXCLUDED.unread_ratio,
                category = EXCLUDED.category,
                subcategory = EXCLUDED.subcategory
            "#,
        )
        .bind(cluster.cluster_id)
        .bind(&cluster.seed_message_id)
        .bind(cluster.similarity_threshold)
        .bind(&cluster.labeler_version)
        .bind(cluster.frequency.map(|f| f.to_string()))
        .bind(cluster.unread_ratio.map(|u| u.to_string()))
        .bind(&cluster.category)
        .bind(&cluster.subcategory)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get(&self, cluster_id: Uuid) -> Result<Option<Cluster>> {
        let row = sqlx::query_as::<_, ClusterRow>(
            "SELECT cluster_id, seed_message_id, similarity_threshold, labeler_version, \
             frequency, unread_ratio, category, subcategory FROM clusters WHERE cluster_id = $1",
        )
        .bind(cluster_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }
}
