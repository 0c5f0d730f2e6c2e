//! ei-cli — runs one pipeline operation to completion and exits, or serves
//! the HTTP dashboard/job-control surface (spec §6 CLI surface).
//!
//! Config is read once from `EMAIL_INTEL_*` env vars; see `config::Config`.

mod adapters;
mod config;

use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use ei_core::types::PolicyTrigger;
use ei_jobs::JobState;
use ei_server::AppState;
use tokio::net::TcpListener;

use config::Config;

#[derive(Parser)]
#[command(name = "ei-cli", about = "Email intelligence pipeline: ingest, classify, extract, and serve")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Page new messages from the provider and upsert metadata + embeddings.
    Ingest,
    /// Classify unlabelled messages, picking clustering or per-message
    /// labeling based on backlog size against `per_message_threshold`.
    Label,
    /// Drain the label outbox, applying provider-side label mutations.
    PushLabels,
    /// Drain the archive outbox, applying provider-side archive mutations.
    PushArchive,
    /// Evaluate retention policies and enqueue eligible messages for archival.
    PlanRetention,
    /// Run structured extraction over a sub-command target.
    Extract {
        #[command(subcommand)]
        target: ExtractTarget,
    },
    /// Reconcile locally-known trashed state against the provider.
    TrashSync,
    /// Run one of the periodic maintenance sweeps.
    Maintenance {
        #[command(subcommand)]
        target: MaintenanceTarget,
    },
    /// Serve the HTTP dashboard/job-control surface until terminated.
    Serve,
}

#[derive(Subcommand)]
enum ExtractTarget {
    Events,
    Payments,
}

#[derive(Subcommand)]
enum MaintenanceTarget {
    Taxonomy,
    OutboxGc,
    VectorGc,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,ei_cli=debug".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let state = adapters::build_state(&config).await?;

    if let Command::Serve = cli.command {
        return serve(&config, state).await;
    }

    let registry = state.registry.clone();
    let job_id = spawn_for(&cli.command, &state).await;
    wait_for_completion(&registry, &job_id).await
}

async fn serve(config: &Config, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = ei_server::build_router(state);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("ei-cli serving on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Dispatches one CLI subcommand to its matching `ei-jobs` body, cloning
/// whichever ports that job needs out of `state`.
async fn spawn_for(command: &Command, state: &AppState) -> String {
    let registry = &state.registry;
    match command {
        Command::Serve => unreachable!("handled before dispatch"),
        Command::Ingest => {
            let (checkpoints, messages, vectors, provider, embedder, config) = (
                state.checkpoints.clone(),
                state.messages.clone(),
                state.vectors.clone(),
                state.provider.clone(),
                state.embedder.clone(),
                state.config.clone(),
            );
            registry
                .spawn(ei_jobs::JobKind::Ingest, move |h| {
                    ei_jobs::jobs::run_ingest(h, checkpoints, messages, vectors, provider, embedder, config)
                })
                .await
        }
        Command::Label => {
            let backlog = state.messages.count_unlabelled().await.unwrap_or(0);
            if backlog < state.config.per_message_threshold {
                let (messages, taxonomy, label_outbox, provider, generator, config) = (
                    state.messages.clone(),
                    state.taxonomy.clone(),
                    state.label_outbox.clone(),
                    state.provider.clone(),
                    state.generator.clone(),
                    state.config.clone(),
                );
                registry
                    .spawn(ei_jobs::JobKind::PerMessageLabel, move |h| {
                        ei_jobs::jobs::run_per_message_label(h, messages, taxonomy, label_outbox, provider, generator, config)
                    })
                    .await
            } else {
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
                    .spawn(ei_jobs::JobKind::ClusterLabel, move |h| {
                        ei_jobs::jobs::run_cluster_label(
                            h, messages, clusters, taxonomy, vectors, label_outbox, provider, generator, embedder, config,
                        )
                    })
                    .await
            }
        }
        Command::PushLabels => {
            let (label_outbox, messages, taxonomy, provider, config) = (
                state.label_outbox.clone(),
                state.messages.clone(),
                state.taxonomy.clone(),
                state.provider.clone(),
                state.config.clone(),
            );
            registry
                .spawn(ei_jobs::JobKind::PushLabels, move |h| {
                    ei_jobs::jobs::run_push_labels(h, label_outbox, messages, taxonomy, provider, config)
                })
                .await
        }
        Command::PushArchive => {
            let (archive_outbox, messages, provider, config) = (
                state.archive_outbox.clone(),
                state.messages.clone(),
                state.provider.clone(),
                state.config.clone(),
            );
            registry
                .spawn(ei_jobs::JobKind::PushArchive, move |h| {
                    ei_jobs::jobs::run_push_archive(h, archive_outbox, messages, provider, config)
                })
                .await
        }
        Command::PlanRetention => {
            let (messages, archive_outbox, policies, config) = (
                state.messages.clone(),
                state.archive_outbox.clone(),
                state.policies.clone(),
                state.config.clone(),
            );
            registry
                .spawn(ei_jobs::JobKind::PlanRetention, move |h| {
                    ei_jobs::jobs::run_plan_retention(h, messages, archive_outbox, policies, config, PolicyTrigger::Scheduled)
                })
                .await
        }
        Command::Extract { target: ExtractTarget::Events } => {
            let (messages, events, provider, generator, config) = (
                state.messages.clone(),
                state.events.clone(),
                state.provider.clone(),
                state.generator.clone(),
                state.config.clone(),
            );
            registry
                .spawn(ei_jobs::JobKind::ExtractEvents, move |h| {
                    ei_jobs::jobs::run_extract_events(h, messages, events, provider, generator, config)
                })
                .await
        }
        Command::Extract { target: ExtractTarget::Payments } => {
            let (messages, payments, provider, generator, config) = (
                state.messages.clone(),
                state.payments.clone(),
                state.provider.clone(),
                state.generator.clone(),
                state.config.clone(),
            );
            let since = Utc::now() - chrono::Duration::days(7);
            registry
                .spawn(ei_jobs::JobKind::ExtractPayments, move |h| {
                    ei_jobs::jobs::run_extract_payments(h, messages, payments, provider, generator, config, since)
                })
                .await
        }
        Command::TrashSync => {
            let (messages, provider) = (state.messages.clone(), state.provider.clone());
            registry.spawn(ei_jobs::JobKind::TrashSync, move |h| ei_jobs::jobs::run_trash_sync(h, messages, provider)).await
        }
        Command::Maintenance { target: MaintenanceTarget::Taxonomy } => {
            let taxonomy = state.taxonomy.clone();
            registry
                .spawn(ei_jobs::JobKind::MaintenanceTaxonomy, move |h| ei_jobs::jobs::run_maintenance_taxonomy(h, taxonomy))
                .await
        }
        Command::Maintenance { target: MaintenanceTarget::OutboxGc } => {
            let (label_outbox, archive_outbox) = (state.label_outbox.clone(), state.archive_outbox.clone());
            registry
                .spawn(ei_jobs::JobKind::MaintenanceOutboxGc, move |h| {
                    ei_jobs::jobs::run_maintenance_outbox_gc(h, label_outbox, archive_outbox)
                })
                .await
        }
        Command::Maintenance { target: MaintenanceTarget::VectorGc } => {
            let (messages, vectors) = (state.messages.clone(), state.vectors.clone());
            registry
                .spawn(ei_jobs::JobKind::MaintenanceVectorGc, move |h| {
                    ei_jobs::jobs::run_maintenance_vector_gc(h, messages, vectors)
                })
                .await
        }
    }
}

/// Polls the job snapshot until it reaches a terminal state, printing its
/// final counters. Exits non-zero (via `anyhow::bail!`) on `Failed`.
async fn wait_for_completion(registry: &Arc<ei_jobs::JobRegistry>, job_id: &str) -> anyhow::Result<()> {
    loop {
        let handle = registry.get(job_id).await.expect("job just spawned must exist");
        let status = handle.snapshot();
        match status.state {
            JobState::Succeeded => {
                println!(
                    "{job_id} succeeded: processed={} inserted={} skipped={} failed={}",
                    status.counters.processed, status.counters.inserted, status.counters.skipped_existing, status.counters.failed
                );
                return Ok(());
            }
            JobState::Failed => {
                anyhow::bail!("{job_id} failed: {}", status.message.unwrap_or_default());
            }
            JobState::Queued | JobState::Running => {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}
