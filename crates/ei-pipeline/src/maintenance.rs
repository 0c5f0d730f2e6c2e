//! Maintenance jobs (SPEC_FULL §4.10): taxonomy cleanup, outbox row GC, and
//! orphan-vector GC. Each is a thin wrapper over a single port call — the
//! actual cleanup logic lives server-side (`ei-postgres`) or in the vector
//! adapter, since both are naturally atomic bulk operations there.

use chrono::{Duration, Utc};
use ei_core::ports::{ArchiveOutboxStore, LabelOutboxStore, MessageStore, TaxonomyStore, VectorIndex};

/// Processed outbox rows older than this are eligible for GC.
pub const OUTBOX_GC_AGE_DAYS: i64 = 90;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceReport {
    pub taxonomy_duplicates_merged: u64,
    pub label_outbox_rows_gced: u64,
    pub archive_outbox_rows_gced: u64,
    pub orphan_vectors_deleted: u64,
}

pub async fn run_taxonomy_cleanup(taxonomy: &dyn TaxonomyStore) -> ei_core::Result<u64> {
    taxonomy.merge_duplicate_tier2().await
}

pub async fn run_outbox_gc(
    label_outbox: &dyn LabelOutboxStore,
    archive_outbox: &dyn ArchiveOutboxStore,
) -> ei_core::Result<(u64, u64)> {
    let cutoff = Utc::now() - Duration::days(OUTBOX_GC_AGE_DAYS);
    let label_gced = label_outbox.gc_processed(cutoff).await?;
    let archive_gced = archive_outbox.gc_processed(cutoff).await?;
    Ok((label_gced, archive_gced))
}

pub async fn run_orphan_vector_gc(
    messages: &dyn MessageStore,
    vectors: &dyn VectorIndex,
) -> ei_core::Result<u64> {
    let known_ids = messages.all_ids().await?;
    vectors.delete_missing(&known_ids).await
}

pub async fn run_all(
    taxonomy: &dyn TaxonomyStore,
    label_outbox: &dyn LabelOutboxStore,
    archive_outbox: &dyn ArchiveOutboxStore,
    messages: &dyn MessageStore,
    vectors: &dyn VectorIndex,
) -> ei_core::Result<MaintenanceReport> {
    let taxonomy_duplicates_merged = run_taxonomy_cleanup(taxonomy).await?;
    let (label_outbox_rows_gced, archive_outbox_rows_gced) = run_outbox_gc(label_outbox, archive_outbox).await?;
    let orphan_vectors_deleted = run_orphan_vector_gc(messages, vectors).await?;

    Ok(MaintenanceReport {
        taxonomy_duplicates_merged,
        label_outbox_rows_gced,
        archive_outbox_rows_gced,
        orphan_vectors_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use ei_core::types::{
        ArchiveOutboxRow, Assignment, LabelOutboxRow, Message, OutboxReason, TaxonomyLabel, VectorPoint,
        VectorNeighbor,
    };
    use uuid::Uuid;

    struct FakeTaxonomy {
        merged: u64,
    }

    #[async_trait]
    impl TaxonomyStore for FakeTaxonomy {
        async fn all_active(&self) -> ei_core::Result<Vec<TaxonomyLabel>> {
            Ok(Vec::new())
        }
        async fn get_by_slug(&self, _slug: &str) -> ei_core::Result<Option<TaxonomyLabel>> {
            Ok(None)
        }
        async fn tier2_under(&self, _parent_slug: &str) -> ei_core::Result<Vec<TaxonomyLabel>> {
            Ok(Vec::new())
        }
        async fn insert_tier2_if_absent(&self, label: TaxonomyLabel) -> ei_core::Result<TaxonomyLabel> {
            Ok(label)
        }
        async fn update_provider_sync(&self, _slug: &str, _provider_label_id: &str, _status: &str) -> ei_core::Result<()> {
            Ok(())
        }
        async fn merge_duplicate_tier2(&self) -> ei_core::Result<u64> {
            Ok(self.merged)
        }
    }

    struct FakeLabelOutbox {
        gced: u64,
        last_cutoff: std::sync::Mutex<Option<DateTime<Utc>>>,
    }

    #[async_trait]
    impl LabelOutboxStore for FakeLabelOutbox {
        async fn enqueue_if_absent(&self, _message_id: &str, _reason: OutboxReason) -> ei_core::Result<()> {
            Ok(())
        }
        async fn claim_next(&self) -> ei_core::Result<Option<LabelOutboxRow>> {
            Ok(None)
        }
        async fn mark_processed(&self, _id: Uuid) -> ei_core::Result<()> {
            Ok(())
        }
        async fn mark_failed(&self, _id: Uuid, _error: &str) -> ei_core::Result<()> {
            Ok(())
        }
        async fn reset_failed(&self) -> ei_core::Result<u64> {
            Ok(0)
        }
        async fn gc_processed(&self, older_than: DateTime<Utc>) -> ei_core::Result<u64> {
            *self.last_cutoff.lock().unwrap() = Some(older_than);
            Ok(self.gced)
        }
    }

    struct FakeArchiveOutbox {
        gced: u64,
    }

    #[async_trait]
    impl ArchiveOutboxStore for FakeArchiveOutbox {
        async fn plan(&self, _message_id: &str, _reason: &str) -> ei_core::Result<()> {
            Ok(())
        }
        async fn claim_next(&self) -> ei_core::Result<Option<ArchiveOutboxRow>> {
            Ok(None)
        }
        async fn mark_processed(&self, _id: Uuid) -> ei_core::Result<()> {
            Ok(())
        }
        async fn mark_failed(&self, _id: Uuid, _error: &str) -> ei_core::Result<()> {
            Ok(())
        }
        async fn gc_processed(&self, _older_than: DateTime<Utc>) -> ei_core::Result<u64> {
            Ok(self.gced)
        }
    }

    struct FakeMessages {
        ids: Vec<String>,
    }

    #[async_trait]
    impl MessageStore for FakeMessages {
        async fn upsert_metadata(&self, _message: &Message) -> ei_core::Result<()> {
            Ok(())
        }
        async fn get(&self, _provider_id: &str) -> ei_core::Result<Option<Message>> {
            Ok(None)
        }
        async fn set_category_if_unset(
            &self,
            _provider_id: &str,
            _cluster_id: Option<Uuid>,
            _category: &str,
            _subcategory: Option<&str>,
            _labeler_version: &str,
        ) -> ei_core::Result<bool> {
            Ok(false)
        }
        async fn unlabelled(&self, _limit: i64) -> ei_core::Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn count_unlabelled(&self) -> ei_core::Result<i64> {
            Ok(0)
        }
        async fn unlabelled_by_domain(&self, _domain: &str, _exclude_id: &str) -> ei_core::Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn recent_by_sender(&self, _from_address: &str, _limit: i64) -> ei_core::Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn stamp_archived(&self, _provider_id: &str, _at: DateTime<Utc>) -> ei_core::Result<()> {
            Ok(())
        }
        async fn stamp_trashed(&self, _provider_id: &str, _at: DateTime<Utc>) -> ei_core::Result<()> {
            Ok(())
        }
        async fn by_category(&self, _category: &str, _limit: i64) -> ei_core::Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn recent_window(&self, _since: DateTime<Utc>, _limit: i64) -> ei_core::Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn retention_eligible(&self, _default_days: i32, _now: DateTime<Utc>) -> ei_core::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn upsert_assignment(&self, _assignment: &Assignment) -> ei_core::Result<()> {
            Ok(())
        }
        async fn all_ids(&self) -> ei_core::Result<Vec<String>> {
            Ok(self.ids.clone())
        }
    }

    struct FakeVectors {
        deleted: u64,
        seen_ids: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorIndex for FakeVectors {
        async fn upsert(&self, _point: &VectorPoint) -> ei_core::Result<()> {
            Ok(())
        }
        async fn query_neighbors(
            &self,
            _query: &[f32],
            _domain: &str,
            _vector_version: &str,
            _k: usize,
            _min_score: f64,
        ) -> ei_core::Result<Vec<VectorNeighbor>> {
            Ok(Vec::new())
        }
        async fn delete_missing(&self, known_message_ids: &[String]) -> ei_core::Result<u64> {
            *self.seen_ids.lock().unwrap() = known_message_ids.to_vec();
            Ok(self.deleted)
        }
    }

    #[tokio::test]
    async fn runs_all_maintenance_jobs_and_aggregates_counters() {
        let taxonomy = FakeTaxonomy { merged: 3 };
        let label_outbox = FakeLabelOutbox { gced: 10, last_cutoff: std::sync::Mutex::new(None) };
        let archive_outbox = FakeArchiveOutbox { gced: 4 };
        let messages = FakeMessages { ids: vec!["m1".to_string(), "m2".to_string()] };
        let vectors = FakeVectors { deleted: 1, seen_ids: std::sync::Mutex::new(Vec::new()) };

        let report = run_all(&taxonomy, &label_outbox, &archive_outbox, &messages, &vectors).await.unwrap();

        assert_eq!(report.taxonomy_duplicates_merged, 3);
        assert_eq!(report.label_outbox_rows_gced, 10);
        assert_eq!(report.archive_outbox_rows_gced, 4);
        assert_eq!(report.orphan_vectors_deleted, 1);
        assert_eq!(*vectors.seen_ids.lock().unwrap(), vec!["m1".to_string(), "m2".to_string()]);

        let cutoff = label_outbox.last_cutoff.lock().unwrap().unwrap();
        assert!(cutoff <= Utc::now() - Duration::days(OUTBOX_GC_AGE_DAYS - 1));
    }
}
