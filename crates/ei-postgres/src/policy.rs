use async_trait::async_trait;
use ei_core::{ports::PolicyStore, types::*, Result};
use sqlx::{PgPool, QueryBuilder};

use crate::internal;

pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: uuid::Uuid,
    name: String,
    enabled: bool,
    trigger: String,
    cadence: String,
    definition: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PolicyRow> for Policy {
    type Error = ei_core::PipelineError;

    fn try_from(r: PolicyRow) -> std::result::Result<Self, Self::Error> {
        Ok(Policy {
            id: r.id,
            name: r.name,
            enabled: r.enabled,
            trigger: r.trigger.parse().map_err(|_| {
                ei_core::PipelineError::SchemaDrift(format!("unknown policy trigger: {}", r.trigger))
            })?,
            cadence: r.cadence.parse().map_err(|_| {
                ei_core::PipelineError::SchemaDrift(format!("unknown policy cadence: {}", r.cadence))
            })?,
            definition: serde_json::from_value(r.definition).map_err(|e| {
                ei_core::PipelineError::SchemaDrift(format!("bad policy definition: {e}"))
            })?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn list_enabled(&self, trigger: PolicyTrigger) -> Result<Vec<Policy>> {
        let rows = sqlx::query_as::<_, PolicyRow>(
            r#"
            SELECT id, name, enabled, trigger, cadence, definition, created_at, updated_at
            FROM policies
            WHERE enabled = true AND trigger = $1
            ORDER BY name
            "#,
        )
        .bind(trigger.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn matching_message_ids(&self, policy: &Policy, limit: i64) -> Result<Vec<String>> {
        // AND-only (spec §4.8): every condition appends `AND ...` to a
        // single WHERE clause. No OR/UNLESS compilation path exists.
        let mut qb = QueryBuilder::new(
            "SELECT provider_id FROM messages WHERE trashed_at IS NULL",
        );

        for condition in &policy.definition.conditions {
            match condition {
                PolicyCondition::CategoryEquals { value } => {
                    qb.push(" AND category = ").push_bind(value);
                }
                PolicyCondition::SubcategoryEquals { value } => {
                    qb.push(" AND subcategory = ").push_bind(value);
                }
                PolicyCondition::FromDomainEquals { value } => {
                    qb.push(" AND from_domain = ").push_bind(value);
                }
                PolicyCondition::SubjectContains { value } => {
                    qb.push(" AND subject_normalized ILIKE ")
                        .push_bind(format!("%{value}%"));
                }
                PolicyCondition::AgeDaysGt { days } => {
                    qb.push(" AND ts < now() - (")
                        .push_bind(*days)
                        .push(" * interval '1 day')");
                }
                PolicyCondition::IsUnreadEquals { flag } => {
                    qb.push(" AND is_unread = ").push_bind(*flag);
                }
            }
        }

        qb.push(" ORDER BY ts ASC LIMIT ").push_bind(limit);

        let rows: Vec<(String,)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
