//! Outbox reconciliation workers (C9, spec §4.4, §4.5).
//!
//! Two independent drains: label-push moves a message's current assignment
//! to the provider's label set; archive-push adds the archive marker label
//! once a message clears retention or a policy match. Both claim rows via
//! the storage layer's atomic `claim_next`, so multiple worker instances
//! never double-process a row (spec §5).

use ei_core::{
    ports::{ArchiveOutboxStore, LabelOutboxStore, MessageStore, TaxonomyStore},
    PipelineError,
};
use ei_provider::Provider;
use tracing::warn;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboxDrainReport {
    pub processed: u64,
    pub retried: u64,
    pub failed: u64,
}

/// Drains the label outbox: looks up the message's current assignment slug,
/// resolves (or creates) the provider-side label, and pushes it. Retries
/// once inline, after `transient_retry_delay_ms`, on a transient failure
/// before recording it (spec §4.4).
pub async fn drain_label_outbox(
    label_outbox: &dyn LabelOutboxStore,
    messages: &dyn MessageStore,
    taxonomy: &dyn TaxonomyStore,
    provider: &dyn Provider,
    config: &PipelineConfig,
    run_cap: usize,
) -> ei_core::Result<OutboxDrainReport> {
    let mut report = OutboxDrainReport::default();

    for _ in 0..run_cap {
        let Some(row) = label_outbox.claim_next().await? else { break };

        match push_one_label(&row.message_id, messages, taxonomy, provider).await {
            Ok(()) => {
                label_outbox.mark_processed(row.id).await?;
                report.processed += 1;
            }
            Err(e) if e.retryable() => {
                report.retried += 1;
                tokio::time::sleep(std::time::Duration::from_millis(config.transient_retry_delay_ms)).await;
                match push_one_label(&row.message_id, messages, taxonomy, provider).await {
                    Ok(()) => {
                        label_outbox.mark_processed(row.id).await?;
                        report.processed += 1;
                    }
                    Err(e2) => {
                        label_outbox.mark_failed(row.id, &e2.to_string()).await?;
                        report.failed += 1;
                    }
                }
            }
            Err(e) => {
                label_outbox.mark_failed(row.id, &e.to_string()).await?;
                report.failed += 1;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(config.outbox_row_delay_ms)).await;
    }

    Ok(report)
}

async fn push_one_label(
    message_id: &str,
    messages: &dyn MessageStore,
    taxonomy: &dyn TaxonomyStore,
    provider: &dyn Provider,
) -> ei_core::Result<()> {
    let message = messages
        .get(message_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("message {message_id}")))?;

    let Some(category) = message.category.as_deref() else {
        return Err(PipelineError::ContractViolation(format!(
            "label-outbox row for {message_id} has no assignment"
        )));
    };
    let slug = message.subcategory.as_deref().unwrap_or(category);

    let label = taxonomy
        .get_by_slug(slug)
        .await?
        .ok_or_else(|| PipelineError::SchemaDrift(format!("taxonomy label {slug} not found")))?;

    let provider_label_id = match &label.provider_label_id {
        Some(id) => id.clone(),
        None => {
            let created = provider.create_label(&label.name).await?;
            taxonomy.update_provider_sync(&label.slug, &created.id, "synced").await?;
            created.id
        }
    };

    provider.modify_labels(message_id, &[provider_label_id], &[]).await?;
    Ok(())
}

/// Drains the archive outbox: ensures the archive marker label exists
/// (trying each candidate name in order, since common names like "Archive"
/// are commonly provider-reserved), applies it, and stamps the message as
/// archived (spec §4.5, §9).
pub async fn drain_archive_outbox(
    archive_outbox: &dyn ArchiveOutboxStore,
    messages: &dyn MessageStore,
    provider: &dyn Provider,
    config: &PipelineConfig,
    run_cap: usize,
) -> ei_core::Result<OutboxDrainReport> {
    let mut report = OutboxDrainReport::default();
    let marker_label_id = ensure_archive_marker(provider, &config.archive_label_candidates).await?;

    for _ in 0..run_cap {
        let Some(row) = archive_outbox.claim_next().await? else { break };

        match push_one_archive(&row.message_id, messages, provider, &marker_label_id).await {
            Ok(()) => {
                archive_outbox.mark_processed(row.id).await?;
                report.processed += 1;
            }
            Err(e) if e.retryable() => {
                report.retried += 1;
                tokio::time::sleep(std::time::Duration::from_millis(config.transient_retry_delay_ms)).await;
                match push_one_archive(&row.message_id, messages, provider, &marker_label_id).await {
                    Ok(()) => {
                        archive_outbox.mark_processed(row.id).await?;
                        report.processed += 1;
                    }
                    Err(e2) => {
                        archive_outbox.mark_failed(row.id, &e2.to_string()).await?;
                        report.failed += 1;
                    }
                }
            }
            Err(e) => {
                archive_outbox.mark_failed(row.id, &e.to_string()).await?;
                report.failed += 1;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(config.outbox_row_delay_ms)).await;
    }

    Ok(report)
}

async fn push_one_archive(
    message_id: &str,
    messages: &dyn MessageStore,
    provider: &dyn Provider,
    marker_label_id: &str,
) -> ei_core::Result<()> {
    provider.modify_labels(message_id, &[marker_label_id.to_string()], &[]).await?;
    messages.stamp_archived(message_id, chrono::Utc::now()).await?;
    Ok(())
}

async fn ensure_archive_marker(
    provider: &dyn Provider,
    candidates: &[String],
) -> ei_core::Result<String> {
    let existing = provider.list_labels().await?;
    for name in candidates {
        if let Some(label) = existing.iter().find(|l| &l.name == name) {
            return Ok(label.id.clone());
        }
    }
    for name in candidates {
        match provider.create_label(name).await {
            Ok(label) => return Ok(label.id),
            Err(e) => warn!(label = %name, error = %e, "failed to create archive marker candidate, trying next"),
        }
    }
    Err(PipelineError::Fatal(
        "no archive marker label candidate could be created or found".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use ei_core::types::{Assignment, ArchiveOutboxRow, LabelOutboxRow, Message, OutboxReason, TaxonomyLabel, TaxonomyLevel};
    use ei_provider::mock::MockProvider;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FakeMessages {
        rows: Mutex<StdHashMap<String, Message>>,
    }

    #[async_trait]
    impl MessageStore for FakeMessages {
        async fn upsert_metadata(&self, message: &Message) -> ei_core::Result<()> {
            self.rows.lock().unwrap().insert(message.provider_id.clone(), message.clone());
            Ok(())
        }
        async fn get(&self, provider_id: &str) -> ei_core::Result<Option<Message>> {
            Ok(self.rows.lock().unwrap().get(provider_id).cloned())
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
        async fn stamp_archived(&self, provider_id: &str, at: DateTime<Utc>) -> ei_core::Result<()> {
            if let Some(m) = self.rows.lock().unwrap().get_mut(provider_id) {
                m.archived_at = Some(at);
            }
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
            Ok(self.rows.lock().unwrap().keys().cloned().collect())
        }
    }

    struct FakeTaxonomy {
        rows: Mutex<Vec<TaxonomyLabel>>,
    }

    #[async_trait]
    impl TaxonomyStore for FakeTaxonomy {
        async fn all_active(&self) -> ei_core::Result<Vec<TaxonomyLabel>> {
            Ok(self.rows.lock().unwrap().clone())
        }
        async fn get_by_slug(&self, slug: &str) -> ei_core::Result<Option<TaxonomyLabel>> {
            Ok(self.rows.lock().unwrap().iter().find(|l| l.slug == slug).cloned())
        }
        async fn tier2_under(&self, _parent_slug: &str) -> ei_core::Result<Vec<TaxonomyLabel>> {
            Ok(Vec::new())
        }
        async fn insert_tier2_if_absent(&self, label: TaxonomyLabel) -> ei_core::Result<TaxonomyLabel> {
            Ok(label)
        }
        async fn update_provider_sync(&self, slug: &str, provider_label_id: &str, status: &str) -> ei_core::Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(l) = rows.iter_mut().find(|l| l.slug == slug) {
                l.provider_label_id = Some(provider_label_id.to_string());
                l.last_sync_status = Some(status.to_string());
            }
            Ok(())
        }
        async fn merge_duplicate_tier2(&self) -> ei_core::Result<u64> {
            Ok(0)
        }
    }

    struct FakeLabelOutbox {
        rows: Mutex<Vec<LabelOutboxRow>>,
    }

    #[async_trait]
    impl LabelOutboxStore for FakeLabelOutbox {
        async fn enqueue_if_absent(&self, _message_id: &str, _reason: OutboxReason) -> ei_core::Result<()> {
            Ok(())
        }
        async fn claim_next(&self) -> ei_core::Result<Option<LabelOutboxRow>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.processed_at.is_none()).cloned())
        }
        async fn mark_processed(&self, id: Uuid) -> ei_core::Result<()> {
            if let Some(r) = self.rows.lock().unwrap().iter_mut().find(|r| r.id == id) {
                r.processed_at = Some(Utc::now());
            }
            Ok(())
        }
        async fn mark_failed(&self, id: Uuid, error: &str) -> ei_core::Result<()> {
            if let Some(r) = self.rows.lock().unwrap().iter_mut().find(|r| r.id == id) {
                r.processed_at = Some(Utc::now());
                r.error = Some(error.to_string());
            }
            Ok(())
        }
        async fn reset_failed(&self) -> ei_core::Result<u64> {
            Ok(0)
        }
        async fn gc_processed(&self, _older_than: DateTime<Utc>) -> ei_core::Result<u64> {
            Ok(0)
        }
    }

    struct FakeArchiveOutbox {
        rows: Mutex<Vec<ArchiveOutboxRow>>,
    }

    #[async_trait]
    impl ArchiveOutboxStore for FakeArchiveOutbox {
        async fn plan(&self, message_id: &str, reason: &str) -> ei_core::Result<()> {
            self.rows.lock().unwrap().push(ArchiveOutboxRow {
                id: Uuid::new_v4(),
                message_id: message_id.to_string(),
                reason: reason.to_string(),
                created_at: Utc::now(),
                processed_at: None,
                error: None,
            });
            Ok(())
        }
        async fn claim_next(&self) -> ei_core::Result<Option<ArchiveOutboxRow>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.processed_at.is_none()).cloned())
        }
        async fn mark_processed(&self, id: Uuid) -> ei_core::Result<()> {
            if let Some(r) = self.rows.lock().unwrap().iter_mut().find(|r| r.id == id) {
                r.processed_at = Some(Utc::now());
            }
            Ok(())
        }
        async fn mark_failed(&self, id: Uuid, error: &str) -> ei_core::Result<()> {
            if let Some(r) = self.rows.lock().unwrap().iter_mut().find(|r| r.id == id) {
                r.processed_at = Some(Utc::now());
                r.error = Some(error.to_string());
            }
            Ok(())
        }
        async fn gc_processed(&self, _older_than: DateTime<Utc>) -> ei_core::Result<u64> {
            Ok(0)
        }
    }

    fn sample_message(category: &str) -> Message {
        Message {
            provider_id: "m1".to_string(),
            thread_id: "t1".to_string(),
            timestamp: Utc::now(),
            is_unread: false,
            provider_labels: vec![],
            from_address: "a@example.com".to_string(),
            from_domain: "example.com".to_string(),
            to_addresses: vec![],
            cc_addresses: vec![],
            subject_raw: "subject".to_string(),
            subject_normalized: "subject".to_string(),
            category: Some(category.to_string()),
            subcategory: None,
            labeler_version: Some("v1".to_string()),
            cluster_id: None,
            archived_at: None,
            trashed_at: None,
        }
    }

    #[tokio::test]
    async fn label_outbox_creates_label_and_applies_it() {
        let message = sample_message("financial");
        let messages = FakeMessages { rows: Mutex::new(StdHashMap::from([("m1".to_string(), message)])) };
        let taxonomy = FakeTaxonomy {
            rows: Mutex::new(vec![TaxonomyLabel {
                level: TaxonomyLevel::Tier1,
                slug: "financial".to_string(),
                name: "Financial".to_string(),
                description: None,
                parent_slug: None,
                retention_days: None,
                active: true,
                provider_label_id: None,
                last_sync_status: None,
            }]),
        };
        let label_outbox = FakeLabelOutbox {
            rows: Mutex::new(vec![LabelOutboxRow {
                id: Uuid::new_v4(),
                message_id: "m1".to_string(),
                reason: OutboxReason::NewAssignment,
                created_at: Utc::now(),
                processed_at: None,
                error: None,
            }]),
        };
        let provider = MockProvider::new(
            vec![ei_provider::mock::MockMessage {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                internal_date: Utc::now(),
                label_ids: vec![],
                headers: StdHashMap::new(),
                body_text: String::new(),
            }],
            vec![],
        );
        let config = PipelineConfig::default();

        let report = drain_label_outbox(&label_outbox, &messages, &taxonomy, &provider, &config, 5)
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);
        assert!(provider.label_ids_of("m1").len() == 1);
        assert_eq!(taxonomy.rows.lock().unwrap()[0].provider_label_id.is_some(), true);
    }

    #[tokio::test]
    async fn archive_outbox_creates_marker_label_and_applies_it() {
        let message = sample_message("financial");
        let messages = FakeMessages { rows: Mutex::new(StdHashMap::from([("m1".to_string(), message)])) };
        let archive_outbox = FakeArchiveOutbox { rows: Mutex::new(Vec::new()) };
        archive_outbox.plan("m1", "retention").await.unwrap();

        let provider = MockProvider::new(
            vec![ei_provider::mock::MockMessage {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                internal_date: Utc::now(),
                label_ids: vec![],
                headers: StdHashMap::new(),
                body_text: String::new(),
            }],
            vec![],
        );
        let config = PipelineConfig::default();

        let report = drain_archive_outbox(&archive_outbox, &messages, &provider, &config, 5).await.unwrap();

        assert_eq!(report.processed, 1);
        assert!(provider.label_ids_of("m1").contains(&"Email Archive".to_string()));
        assert!(messages.rows.lock().unwrap()["m1"].archived_at.is_some());
    }
}
