//! Job-control endpoints: start a job by kind, list recent jobs, fetch a
//! single snapshot, and stream progress over SSE.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Extension, Path},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use ei_core::types::PolicyTrigger;
use ei_jobs::{JobKind, JobStatus};
use futures::stream::{self, Stream};
use serde_json::json;

use crate::{error::AppError, state::AppState};

fn parse_kind(raw: &str) -> Option<JobKind> {
    Some(match raw {
        "ingest" => JobKind::Ingest,
        "cluster-label" => JobKind::ClusterLabel,
        "per-message-label" => JobKind::PerMessageLabel,
        "push-labels" => JobKind::PushLabels,
        "push-archive" => JobKind::PushArchive,
        "plan-retention" => JobKind::PlanRetention,
        "extract-events" => JobKind::ExtractEvents,
        "extract-payments" => JobKind::ExtractPayments,
        "trash-sync" => JobKind::TrashSync,
        "maintenance-taxonomy" => JobKind::MaintenanceTaxonomy,
        "maintenance-outbox-gc" => JobKind::MaintenanceOutboxGc,
        "maintenance-vector-gc" => JobKind::MaintenanceVectorGc,
        _ => return None,
    })
}

pub async fn start_job(Extension(state): Extension<Arc<AppState>>, Path(kind): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    let kind = parse_kind(&kind).ok_or_else(|| {
        AppError::from(ei_core::PipelineError::ContractViolation(format!("unknown job kind: {kind}")))
    })?;

    let registry = state.registry.clone();
    let job_id = match kind {
        JobKind::Ingest => {
            let (checkpoints, messages, vectors, provider, embedder, config) = (
                state.checkpoints.clone(),
                state.messages.clone(),
                state.vectors.clone(),
                state.provider.clone(),
                state.embedder.clone(),
                state.config.clone(),
            );
            registry
                .spawn(kind, move |h| {
                    ei_jobs::jobs::run_ingest(h, checkpoints, messages, vectors, provider, embedder, config)
                })
                .await
        }
        JobKind::ClusterLabel => {
            let (messages, clusters, taxonomy, vectors, label_outbox, provider, generator, embedder, config) = (
                state.messages.clone(),
                state.clusters.clone(),
                state.taxonomy.clone(),
                state.vectors.clone(),
                state.label_outbox.clone(),
                state.provider.clone(),
                state.generator.clone(),
                state.embedder.clone(),
                state.config.clone(),
            );
            registry
                .spawn(kind, move |h| {
                    ei_jobs::jobs::run_cluster_label(
                        h, messages, clusters, taxonomy, vectors, label_outbox, provider, generator, embedder, config,
                    )
                })
                .await
        }
        JobKind::PerMessageLabel => {
            let (messages, taxonomy, label_outbox, provider, generator, config) = (
                state.messages.clone(),
                state.taxonomy.clone(),
                state.label_outbox.clone(),
                state.provider.clone(),
                state.generator.clone(),
                state.config.clone(),
            );
            registry
                .spawn(kind, move |h| {
                    ei_jobs::jobs::run_per_message_label(h, messages, taxonomy, label_outbox, provider, generator, config)
                })
                .await
        }
        JobKind::PushLabels => {
            let (label_outbox, messages, taxonomy, provider, config) = (
                state.label_outbox.clone(),
                state.messages.clone(),
                state.taxonomy.clone(),
                state.provider.clone(),
                state.config.clone(),
            );
            registry
                .spawn(kind, move |h| ei_jobs::jobs::run_push_labels(h, label_outbox, messages, taxonomy, provider, config))
                .await
        }
        JobKind::PushArchive => {
            let (archive_outbox, messages, provider, config) = (
                state.archive_outbox.clone(),
                state.messages.clone(),
                state.provider.clone(),
                state.config.clone(),
            );
            registry
                .spawn(kind, move |h| ei_jobs::jobs::run_push_archive(h, archive_outbox, messages, provider, config))
                .await
        }
        JobKind::PlanRetention => {
            let (messages, archive_outbox, policies, config) = (
                state.messages.clone(),
                state.archive_outbox.clone(),
                state.policies.clone(),
                state.config.clone(),
            );
            registry
                .spawn(kind, move |h| {
                    ei_jobs::jobs::run_plan_retention(h, messages, archive_outbox, policies, config, PolicyTrigger::Scheduled)
                })
                .await
        }
        JobKind::ExtractEvents => {
            let (messages, events, provider, generator, config) = (
                state.messages.clone(),
                state.events.clone(),
                state.provider.clone(),
                state.generator.clone(),
                state.config.clone(),
            );
            registry
                .spawn(kind, move |h| ei_jobs::jobs::run_extract_events(h, messages, events, provider, generator, config))
                .await
        }
        JobKind::ExtractPayments => {
            let (messages, payments, provider, generator, config) = (
                state.messages.clone(),
                state.payments.clone(),
                state.provider.clone(),
                state.generator.clone(),
                state.config.clone(),
            );
            let since = Utc::now() - chrono::Duration::days(7);
            registry
                .spawn(kind, move |h| {
                    ei_jobs::jobs::run_extract_payments(h, messages, payments, provider, generator, config, since)
                })
                .await
        }
        JobKind::TrashSync => {
            let (messages, provider) = (state.messages.clone(), state.provider.clone());
            registry.spawn(kind, move |h| ei_jobs::jobs::run_trash_sync(h, messages, provider)).await
        }
        JobKind::MaintenanceTaxonomy => {
            let taxonomy = state.taxonomy.clone();
            registry.spawn(kind, move |h| ei_jobs::jobs::run_maintenance_taxonomy(h, taxonomy)).await
        }
        JobKind::MaintenanceOutboxGc => {
            let (label_outbox, archive_outbox) = (state.label_outbox.clone(), state.archive_outbox.clone());
            registry
                .spawn(kind, move |h| ei_jobs::jobs::run_maintenance_outbox_gc(h, label_outbox, archive_outbox))
                .await
        }
        JobKind::MaintenanceVectorGc => {
            let (messages, vectors) = (state.messages.clone(), state.vectors.clone());
            registry.spawn(kind, move |h| ei_jobs::jobs::run_maintenance_vector_gc(h, messages, vectors)).await
        }
    };

    Ok(Json(json!({"job_id": job_id})))
}

pub async fn list_jobs(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<JobStatus>> {
    Json(state.registry.list_recent(50).await)
}

pub async fn get_job(Extension(state): Extension<Arc<AppState>>, Path(job_id): Path<String>) -> Result<Json<JobStatus>, AppError> {
    let handle = state
        .registry
        .get(&job_id)
        .await
        .ok_or_else(|| AppError::from(ei_core::PipelineError::NotFound(format!("no such job: {job_id}"))))?;
    Ok(Json(handle.snapshot()))
}

pub async fn job_events(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = state
        .registry
        .get(&job_id)
        .await
        .ok_or_else(|| AppError::from(ei_core::PipelineError::NotFound(format!("no such job: {job_id}"))))?;

    let receiver = handle.subscribe();
    let stream = stream::unfold(receiver, |mut receiver| async move {
        let status = receiver.recv().await?;
        let event = Event::default().json_data(&status).unwrap_or_else(|_| Event::default());
        Some((Ok(event), receiver))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
