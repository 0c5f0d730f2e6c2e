//! Storage and external-service port traits — implemented by `ei-postgres`,
//! `ei-vector`, `ei-provider`, and `ei-llm`. Business logic in `ei-pipeline`
//! depends only on these traits, never on `sqlx`/`reqwest` directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::*;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn upsert_metadata(&self, message: &Message) -> Result<()>;
    async fn get(&self, provider_id: &str) -> Result<Option<Message>>;

    /// Sets `(cluster_id, category, subcategory, labeler_version)` but only
    /// if `category IS NULL` — first-writer-wins under concurrent labeling
    /// (spec §5).
    async fn set_category_if_unset(
        &self,
        provider_id: &str,
        cluster_id: Option<Uuid>,
        category: &str,
        subcategory: Option<&str>,
        labeler_version: &str,
    ) -> Result<bool>;

    /// Messages with `category IS NULL`, excluding provider-side trash,
    /// ordered oldest first.
    async fn unlabelled(&self, limit: i64) -> Result<Vec<Message>>;
    async fn count_unlabelled(&self) -> Result<i64>;

    /// Same-domain, unlabelled candidates for Jaccard comparison in §4.2
    /// step 2, excluding `exclude_id`.
    async fn unlabelled_by_domain(&self, domain: &str, exclude_id: &str) -> Result<Vec<Message>>;

    /// Sender's recent messages for the per-message labeler's frequency
    /// synthesis (spec §4.3), most recent first, capped by the caller.
    async fn recent_by_sender(&self, from_address: &str, limit: i64) -> Result<Vec<Message>>;

    async fn stamp_archived(&self, provider_id: &str, at: DateTime<Utc>) -> Result<()>;
    async fn stamp_trashed(&self, provider_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn by_category(&self, category: &str, limit: i64) -> Result<Vec<Message>>;
    async fn recent_window(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Message>>;

    /// Effective retention days per `message.category`/`subcategory`, plus
    /// archive eligibility, computed in SQL against the taxonomy tables so
    /// the planner doesn't need to pull every row into the process.
    async fn retention_eligible(&self, default_days: i32, now: DateTime<Utc>) -> Result<Vec<String>>;

    async fn upsert_assignment(&self, assignment: &Assignment) -> Result<()>;

    /// Every known provider id, for orphan-vector GC (spec SPEC_FULL §4.10).
    async fn all_ids(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn upsert(&self, cluster: &Cluster) -> Result<()>;
    async fn get(&self, cluster_id: Uuid) -> Result<Option<Cluster>>;
}

#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    async fn all_active(&self) -> Result<Vec<TaxonomyLabel>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<TaxonomyLabel>>;
    async fn tier2_under(&self, parent_slug: &str) -> Result<Vec<TaxonomyLabel>>;

    /// Idempotent on `slug`: inserting an already-present Tier-2 label is a
    /// no-op that returns the existing row.
    async fn insert_tier2_if_absent(&self, label: TaxonomyLabel) -> Result<TaxonomyLabel>;

    async fn update_provider_sync(
        &self,
        slug: &str,
        provider_label_id: &str,
        status: &str,
    ) -> Result<()>;

    /// Merges Tier-2 labels that share a parent and a case-insensitive name
    /// but carry zero message assignments, keeping the oldest slug. Returns
    /// the number of duplicate rows removed (spec SPEC_FULL §4.10).
    async fn merge_duplicate_tier2(&self) -> Result<u64>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, point: &VectorPoint) -> Result<()>;

    /// Up to `k` neighbors of `query`, restricted to `domain` and
    /// `vector_version`, with score >= `min_score`.
    #[allow(clippy::too_many_arguments)]
    async fn query_neighbors(
        &self,
        query: &[f32],
        domain: &str,
        vector_version: &str,
        k: usize,
        min_score: f64,
    ) -> Result<Vec<VectorNeighbor>>;

    async fn delete_missing(&self, known_message_ids: &[String]) -> Result<u64>;
}

#[async_trait]
pub trait LabelOutboxStore: Send + Sync {
    /// No-op (returns `Ok(())` without inserting) if the message already
    /// has an unprocessed row (spec §3 invariant).
    async fn enqueue_if_absent(&self, message_id: &str, reason: OutboxReason) -> Result<()>;

    /// Atomically claims the oldest unclaimed, unprocessed row — a single
    /// `UPDATE ... RETURNING` under `FOR UPDATE SKIP LOCKED`, not a
    /// select-then-update pair, so concurrent workers never double-claim
    /// (spec §5, per-message FIFO by `created_at`).
    async fn claim_next(&self) -> Result<Option<LabelOutboxRow>>;
    async fn mark_processed(&self, id: Uuid) -> Result<()>;
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;
    async fn reset_failed(&self) -> Result<u64>;

    /// Deletes processed rows older than `older_than` (spec SPEC_FULL §4.10).
    async fn gc_processed(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait ArchiveOutboxStore: Send + Sync {
    /// Upsert keyed by `message_id` (UNIQUE). Replanning an existing row
    /// resets `processed_at`/`error` to NULL (spec §3, §4.5).
    async fn plan(&self, message_id: &str, reason: &str) -> Result<()>;
    async fn claim_next(&self) -> Result<Option<ArchiveOutboxRow>>;
    async fn mark_processed(&self, id: Uuid) -> Result<()>;
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Deletes processed rows older than `older_than` (spec SPEC_FULL §4.10).
    async fn gc_processed(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn upsert(&self, record: &EventRecord) -> Result<()>;
    async fn get(&self, message_id: &str) -> Result<Option<EventRecord>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn upsert(&self, record: &PaymentRecord) -> Result<()>;
    async fn get(&self, message_id: &str) -> Result<Option<PaymentRecord>>;
    async fn exists_with_fingerprint(&self, fingerprint: &str) -> Result<bool>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn list_enabled(&self, trigger: PolicyTrigger) -> Result<Vec<Policy>>;
    /// Compiles `policy.definition.conditions` into a parameterized query
    /// and returns matching message ids (spec §4.8). AND-only semantics.
    async fn matching_message_ids(&self, policy: &Policy, limit: i64) -> Result<Vec<String>>;
}
