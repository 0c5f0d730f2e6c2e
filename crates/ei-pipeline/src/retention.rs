//! Retention planning (C10, spec §4.5) and scheduled-policy evaluation
//! (SPEC_FULL §4.8). Either path enqueues the same archive-outbox row; a
//! message that both clears age-based retention and matches a policy is
//! only planned once, since `ArchiveOutboxStore::plan` is keyed by message
//! id.

use chrono::Utc;
use ei_core::{
    ports::{ArchiveOutboxStore, MessageStore, PolicyStore},
    types::PolicyTrigger,
};

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionPlanReport {
    pub planned_by_age: u64,
    pub planned_by_policy: u64,
}

pub async fn plan(
    messages: &dyn MessageStore,
    archive_outbox: &dyn ArchiveOutboxStore,
    policies: &dyn PolicyStore,
    config: &PipelineConfig,
    trigger: PolicyTrigger,
) -> ei_core::Result<RetentionPlanReport> {
    let mut report = RetentionPlanReport::default();
    let now = Utc::now();

    let age_eligible = messages.retention_eligible(config.retention_default_days, now).await?;
    for message_id in age_eligible {
        archive_outbox.plan(&message_id, "retention_age").await?;
        report.planned_by_age += 1;
    }

    let enabled_policies = policies.list_enabled(trigger).await?;
    for policy in enabled_policies {
        let matches = policies.matching_message_ids(&policy, config.max_unlabelled_per_run).await?;
        for message_id in matches {
            archive_outbox.plan(&message_id, &format!("policy:{}", policy.name)).await?;
            report.planned_by_policy += 1;
        }
    }

    Ok(report)
}
