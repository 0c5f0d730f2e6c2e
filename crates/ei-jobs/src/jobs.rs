//! Thin job bodies: one function per `JobKind`, each delegating to the
//! matching `ei-pipeline` operation and translating its report into
//! `JobHandle` progress updates. `ei-cli` constructs the port/adapter
//! instances and hands them here as `Arc<dyn Trait>` when it calls
//! `JobRegistry::spawn`.

use std::sync::Arc;

use ei_core::ports::{
    ArchiveOutboxStore, ClusterStore, LabelOutboxStore, MessageStore, PaymentStore, PolicyStore, TaxonomyStore,
    VectorIndex,
};
use ei_core::types::{PolicyTrigger, Tier1Category};
use ei_llm::{EmbeddingModel, GenerationModel};
use ei_pipeline::config::PipelineConfig;
use ei_provider::Provider;

use crate::registry::JobHandle;

pub async fn run_ingest(
    handle: Arc<JobHandle>,
    checkpoints: Arc<dyn ei_core::ports::CheckpointStore>,
    messages: Arc<dyn MessageStore>,
    vectors: Arc<dyn VectorIndex>,
    provider: Arc<dyn Provider>,
    embedder: Arc<dyn EmbeddingModel>,
    config: PipelineConfig,
) -> ei_core::Result<()> {
    handle.set_phase("paging");
    let report = ei_pipeline::ingest::run(
        checkpoints.as_ref(),
        messages.as_ref(),
        vectors.as_ref(),
        provider.as_ref(),
        embedder.as_ref(),
        &config,
    )
    .await?;

    handle.inc_processed(report.processed);
    handle.inc_inserted(report.processed);
    handle.inc_skipped_existing(report.skipped);
    for _ in 0..report.failed {
        handle.record_error(None, "ingest: message failed, see logs");
    }
    handle.finish_succeeded(Some(format!("checkpoint advanced to {:?}", report.new_checkpoint)));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_cluster_label(
    handle: Arc<JobHandle>,
    messages: Arc<dyn MessageStore>,
    clusters: Arc<dyn ClusterStore>,
    taxonomy: Arc<dyn TaxonomyStore>,
    vectors: Arc<dyn VectorIndex>,
    label_outbox: Arc<dyn LabelOutboxStore>,
    provider: Arc<dyn Provider>,
    generator: Arc<dyn GenerationModel>,
    embedder: Arc<dyn EmbeddingModel>,
    config: PipelineConfig,
) -> ei_core::Result<()> {
    handle.set_phase("clustering");
    let run_cap = config.max_unlabelled_per_run as usize;
    let report = ei_pipeline::cluster_label::run(
        messages.as_ref(),
        clusters.as_ref(),
        taxonomy.as_ref(),
        vectors.as_ref(),
        label_outbox.as_ref(),
        provider.as_ref(),
        generator.as_ref(),
        embedder.as_ref(),
        &config,
        run_cap,
    )
    .await?;

    handle.inc_processed(report.messages_labelled);
    handle.inc_inserted(report.messages_labelled);
    for _ in 0..report.failed_iterations {
        handle.record_error(None, "cluster/label iteration failed, see logs");
    }
    handle.finish_succeeded(Some(format!("{} clusters formed", report.clusters_formed)));
    Ok(())
}

pub async fn run_per_message_label(
    handle: Arc<JobHandle>,
    messages: Arc<dyn MessageStore>,
    taxonomy: Arc<dyn TaxonomyStore>,
    label_outbox: Arc<dyn LabelOutboxStore>,
    provider: Arc<dyn Provider>,
    generator: Arc<dyn GenerationModel>,
    config: PipelineConfig,
) -> ei_core::Result<()> {
    handle.set_phase("labeling");
    let run_cap = config.max_unlabelled_per_run as usize;
    let report = ei_pipeline::per_message_label::run(
        messages.as_ref(),
        taxonomy.as_ref(),
        label_outbox.as_ref(),
        provider.as_ref(),
        generator.as_ref(),
        &config,
        run_cap,
    )
    .await?;

    handle.inc_processed(report.labelled + report.failed);
    handle.inc_inserted(report.labelled);
    for _ in 0..report.failed {
        handle.record_error(None, "per-message labeling failed, see logs");
    }
    handle.finish_succeeded(None);
    Ok(())
}

pub async fn run_push_labels(
    handle: Arc<JobHandle>,
    label_outbox: Arc<dyn LabelOutboxStore>,
    messages: Arc<dyn MessageStore>,
    taxonomy: Arc<dyn TaxonomyStore>,
    provider: Arc<dyn Provider>,
    config: PipelineConfig,
) -> ei_core::Result<()> {
    handle.set_phase("draining label outbox");
    let run_cap = config.max_unlabelled_per_run as usize;
    let report = ei_pipeline::outbox::drain_label_outbox(
        label_outbox.as_ref(),
        messages.as_ref(),
        taxonomy.as_ref(),
        provider.as_ref(),
        &config,
        run_cap,
    )
    .await?;

    handle.inc_processed(report.processed + report.failed);
    handle.inc_inserted(report.processed);
    for _ in 0..report.failed {
        handle.record_error(None, "label push failed, see logs");
    }
    handle.finish_succeeded(Some(format!("{} retried", report.retried)));
    Ok(())
}

pub async fn run_push_archive(
    handle: Arc<JobHandle>,
    archive_outbox: Arc<dyn ArchiveOutboxStore>,
    messages: Arc<dyn MessageStore>,
    provider: Arc<dyn Provider>,
    config: PipelineConfig,
) -> ei_core::Result<()> {
    handle.set_phase("draining archive outbox");
    let run_cap = config.max_unlabelled_per_run as usize;
    let report = ei_pipeline::outbox::drain_archive_outbox(
        archive_outbox.as_ref(),
        messages.as_ref(),
        provider.as_ref(),
        &config,
        run_cap,
    )
    .await?;

    handle.inc_processed(report.processed + report.failed);
    handle.inc_inserted(report.processed);
    for _ in 0..report.failed {
        handle.record_error(None, "archive push failed, see logs");
    }
    handle.finish_succeeded(Some(format!("{} retried", report.retried)));
    Ok(())
}

pub async fn run_plan_retention(
    handle: Arc<JobHandle>,
    messages: Arc<dyn MessageStore>,
    archive_outbox: Arc<dyn ArchiveOutboxStore>,
    policies: Arc<dyn PolicyStore>,
    config: PipelineConfig,
    trigger: PolicyTrigger,
) -> ei_core::Result<()> {
    handle.set_phase("planning retention");
    let report =
        ei_pipeline::retention::plan(messages.as_ref(), archive_outbox.as_ref(), policies.as_ref(), &config, trigger)
            .await?;

    handle.inc_processed(report.planned_by_age + report.planned_by_policy);
    handle.inc_inserted(report.planned_by_age + report.planned_by_policy);
    handle.finish_succeeded(Some(format!(
        "{} by age, {} by policy",
        report.planned_by_age, report.planned_by_policy
    )));
    Ok(())
}

pub async fn run_trash_sync(
    handle: Arc<JobHandle>,
    messages: Arc<dyn MessageStore>,
    provider: Arc<dyn Provider>,
) -> ei_core::Result<()> {
    handle.set_phase("paging trash");
    let report = ei_pipeline::trash_sync::run(messages.as_ref(), provider.as_ref()).await?;
    handle.inc_processed(report.newly_trashed);
    handle.inc_inserted(report.newly_trashed);
    handle.finish_succeeded(None);
    Ok(())
}

/// Scans the Tickets & Bookings category for messages without an event
/// record yet and runs the event extractor over each.
pub async fn run_extract_events(
    handle: Arc<JobHandle>,
    messages: Arc<dyn MessageStore>,
    events: Arc<dyn ei_core::ports::EventStore>,
    provider: Arc<dyn Provider>,
    generator: Arc<dyn GenerationModel>,
    config: PipelineConfig,
) -> ei_core::Result<()> {
    handle.set_phase("extracting events");
    let category = Tier1Category::TicketsAndBookings.slug();
    let candidates = messages.by_category(&category, config.max_unlabelled_per_run).await?;
    handle.set_total_estimate(candidates.len() as u64);

    for message in candidates {
        if events.get(&message.provider_id).await?.is_some() {
            handle.inc_skipped_existing(1);
            continue;
        }
        match ei_pipeline::extract_event::run(
            &message.provider_id,
            &message.subject_raw,
            provider.as_ref(),
            generator.as_ref(),
            events.as_ref(),
        )
        .await
        {
            Ok(_) => handle.inc_inserted(1),
            Err(e) => handle.record_error(Some(message.provider_id.clone()), e.to_string()),
        }
        handle.inc_processed(1);
    }

    handle.finish_succeeded(None);
    Ok(())
}

/// Scans recently-labelled messages for payments without a recorded
/// fingerprint yet; unlike events, payments are not restricted to a single
/// Tier-1 category (a receipt can land in Updates or Personal).
pub async fn run_extract_payments(
    handle: Arc<JobHandle>,
    messages: Arc<dyn MessageStore>,
    payments: Arc<dyn PaymentStore>,
    provider: Arc<dyn Provider>,
    generator: Arc<dyn GenerationModel>,
    config: PipelineConfig,
    since: chrono::DateTime<chrono::Utc>,
) -> ei_core::Result<()> {
    handle.set_phase("extracting payments");
    let candidates = messages.recent_window(since, config.max_unlabelled_per_run).await?;
    handle.set_total_estimate(candidates.len() as u64);

    for message in candidates {
        if payments.get(&message.provider_id).await?.is_some() {
            handle.inc_skipped_existing(1);
            handle.inc_processed(1);
            continue;
        }
        match ei_pipeline::extract_payment::run(
            &message.provider_id,
            &message.subject_raw,
            provider.as_ref(),
            generator.as_ref(),
            payments.as_ref(),
        )
        .await
        {
            Ok(ei_pipeline::extract_payment::ExtractOutcome::Persisted(_)) => handle.inc_inserted(1),
            Ok(ei_pipeline::extract_payment::ExtractOutcome::Duplicate(_)) => handle.inc_skipped_existing(1),
            Ok(_) => {}
            Err(e) => handle.record_error(Some(message.provider_id.clone()), e.to_string()),
        }
        handle.inc_processed(1);
    }

    handle.finish_succeeded(None);
    Ok(())
}

pub async fn run_maintenance_taxonomy(
    handle: Arc<JobHandle>,
    taxonomy: Arc<dyn TaxonomyStore>,
) -> ei_core::Result<()> {
    handle.set_phase("merging duplicate taxonomy labels");
    let merged = ei_pipeline::maintenance::run_taxonomy_cleanup(taxonomy.as_ref()).await?;
    handle.inc_processed(merged);
    handle.inc_inserted(merged);
    handle.finish_succeeded(None);
    Ok(())
}

pub async fn run_maintenance_outbox_gc(
    handle: Arc<JobHandle>,
    label_outbox: Arc<dyn LabelOutboxStore>,
    archive_outbox: Arc<dyn ArchiveOutboxStore>,
) -> ei_core::Result<()> {
    handle.set_phase("garbage-collecting outbox rows");
    let (label_gced, archive_gced) =
        ei_pipeline::maintenance::run_outbox_gc(label_outbox.as_ref(), archive_outbox.as_ref()).await?;
    handle.inc_processed(label_gced + archive_gced);
    handle.inc_inserted(label_gced + archive_gced);
    handle.finish_succeeded(Some(format!("{label_gced} label rows, {archive_gced} archive rows")));
    Ok(())
}

pub async fn run_maintenance_vector_gc(
    handle: Arc<JobHandle>,
    messages: Arc<dyn MessageStore>,
    vectors: Arc<dyn VectorIndex>,
) -> ei_core::Result<()> {
    handle.set_phase("garbage-collecting orphan vectors");
    let deleted = ei_pipeline::maintenance::run_orphan_vector_gc(messages.as_ref(), vectors.as_ref()).await?;
    handle.inc_processed(deleted);
    handle.inc_inserted(deleted);
    handle.finish_succeeded(None);
    Ok(())
}
