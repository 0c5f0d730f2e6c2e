//! Deterministic cluster id derivation, effective-retention math, and
//! archive eligibility (spec §3, §4.5, §8).

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Two years, used when no label/parent/checkpoint default is set.
pub const FALLBACK_RETENTION_DAYS: i32 = 730;

/// A fixed namespace UUID for this pipeline's deterministic v5 ids. Any
/// stable value works as long as it never changes across deployments —
/// changing it would silently reshuffle every existing cluster id.
pub const NAMESPACE: Uuid = uuid::uuid!("6f6e8f2e-8f42-4b8a-9f79-3a0f9d9e0a11");

/// `uuid::v5(NAMESPACE, "cluster:" | seed-id | threshold | labeler-version)`.
///
/// Pure function of its inputs: calling twice with the same arguments
/// yields identical ids (spec §8 round-trip property).
pub fn cluster_id(seed_message_id: &str, similarity_threshold: f64, labeler_version: &str) -> Uuid {
    let name = format!("cluster:{seed_message_id}:{similarity_threshold}:{labeler_version}");
    Uuid::new_v5(&NAMESPACE, name.as_bytes())
}

/// Deterministic vector-point id for a message, so re-ingesting the same
/// message upserts the same point rather than duplicating it.
pub fn vector_point_id(message_id: &str) -> Uuid {
    Uuid::new_v5(&NAMESPACE, message_id.as_bytes())
}

/// `label.retention_days ?? parent.retention_days ?? default_days`.
pub fn effective_retention_days(
    label_retention: Option<i32>,
    parent_retention: Option<i32>,
    default_days: i32,
) -> i32 {
    label_retention
        .or(parent_retention)
        .unwrap_or(default_days)
}

/// `archived_at IS NULL AND message.timestamp <= now() - effective_retention`.
pub fn is_retention_eligible(
    message_timestamp: DateTime<Utc>,
    archived_at: Option<DateTime<Utc>>,
    effective_retention_days: i32,
    now: DateTime<Utc>,
) -> bool {
    if archived_at.is_some() {
        return false;
    }
    message_timestamp <= now - Duration::days(effective_retention_days as i64)
}
