//! Cluster/label engine (C6, spec §4.2).

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use ei_core::{
    analysis::{
        deterministic_sample_indices, frequency_from_timestamps, sample_seed,
        sample_size_for_cluster, unread_ratio_from_fraction,
    },
    normalize::{jaccard, subject_tokens},
    ports::{ClusterStore, LabelOutboxStore, MessageStore, TaxonomyStore, VectorIndex},
    retention::cluster_id as derive_cluster_id,
    taxonomy::{is_rejected_subcategory, parse_label_response, tier2_slug, ParsedLabel},
    types::{Assignment, Cluster, Message, OutboxReason, TaxonomyLabel, TaxonomyLevel},
    PipelineError,
};
use ei_llm::{EmbeddingModel, GenerationModel};
use ei_provider::Provider;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::ingest::canonical_embedding_text;

const MAX_CANDIDATES: usize = 500;
const JACCARD_THRESHOLD: f64 = 0.20;
const MAX_PROMPT_TIER2_EXAMPLES: usize = 5;
const MAX_BODY_CHARS: usize = 20_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterLabelReport {
    pub clusters_formed: u64,
    pub messages_labelled: u64,
    pub failed_iterations: u64,
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    messages: &dyn MessageStore,
    clusters: &dyn ClusterStore,
    taxonomy: &dyn TaxonomyStore,
    vectors: &dyn VectorIndex,
    label_outbox: &dyn LabelOutboxStore,
    provider: &dyn Provider,
    generator: &dyn GenerationModel,
    embedder: &dyn EmbeddingModel,
    config: &PipelineConfig,
    run_cap: usize,
) -> ei_core::Result<ClusterLabelReport> {
    let mut report = ClusterLabelReport::default();

    for _ in 0..run_cap {
        let seed = match oldest_unlabelled(messages, config).await? {
            Some(m) => m,
            None => break,
        };

        match label_one_cluster(
            &seed, messages, clusters, taxonomy, vectors, label_outbox, provider, generator, embedder,
            config,
        )
        .await
        {
            Ok(count) => {
                report.clusters_formed += 1;
                report.messages_labelled += count as u64;
            }
            Err(e) => {
                warn!(seed_id = %seed.provider_id, error = %e, "cluster/label iteration failed, moving on");
                report.failed_iterations += 1;
            }
        }
    }

    Ok(report)
}

async fn oldest_unlabelled(
    messages: &dyn MessageStore,
    config: &PipelineConfig,
) -> ei_core::Result<Option<Message>> {
    let batch = messages.unlabelled(1.max(config.per_message_threshold)).await?;
    Ok(batch.into_iter().next())
}

#[allow(clippy::too_many_arguments)]
async fn label_one_cluster(
    seed: &Message,
    messages: &dyn MessageStore,
    clusters: &dyn ClusterStore,
    taxonomy: &dyn TaxonomyStore,
    vectors: &dyn VectorIndex,
    label_outbox: &dyn LabelOutboxStore,
    provider: &dyn Provider,
    generator: &dyn GenerationModel,
    embedder: &dyn EmbeddingModel,
    config: &PipelineConfig,
) -> ei_core::Result<usize> {
    // 2. Candidate assembly: same-domain + Jaccard, fall back to vector neighbors.
    let mut candidates = vec![seed.clone()];
    let domain_matches = messages.unlabelled_by_domain(&seed.from_domain, &seed.provider_id).await?;
    let seed_tokens = subject_tokens(&seed.subject_normalized);
    for candidate in domain_matches {
        let tokens = subject_tokens(&candidate.subject_normalized);
        if jaccard(&seed_tokens, &tokens) >= JACCARD_THRESHOLD {
            candidates.push(candidate);
        }
    }

    if candidates.len() == 1 {
        let seed_text = canonical_embedding_text(seed);
        if let Ok(seed_vector) = embedder.embed(&seed_text).await {
            let neighbors = vectors
                .query_neighbors(
                    &seed_vector,
                    &seed.from_domain,
                    &config.vector_version,
                    config.vector_neighbor_k,
                    config.similarity_threshold,
                )
                .await
                .unwrap_or_default();
            for neighbor in neighbors {
                if neighbor.message_id == seed.provider_id {
                    continue;
                }
                if let Some(m) = messages.get(&neighbor.message_id).await? {
                    if !m.is_labelled() {
                        candidates.push(m);
                    }
                }
            }
        }
    }

    let mut seen = HashSet::new();
    candidates.retain(|m| seen.insert(m.provider_id.clone()));
    candidates.sort_by(|a, b| (a.timestamp, &a.provider_id).cmp(&(b.timestamp, &b.provider_id)));
    candidates.truncate(MAX_CANDIDATES);

    // 3. Cluster identity.
    let cid = derive_cluster_id(&seed.provider_id, config.similarity_threshold, &config.labeler_version);

    // 4. Sampling: choose 1-4 members, reproducibly, fetch bodies.
    let sample_size = sample_size_for_cluster(candidates.len());
    let seed_for_rng = sample_seed(cid);
    let sample_indices = deterministic_sample_indices(candidates.len(), sample_size, seed_for_rng);

    let mut bodies = Vec::new();
    let mut distinct_subjects = BTreeSet::new();
    for &idx in &sample_indices {
        let candidate = &candidates[idx];
        distinct_subjects.insert(candidate.subject_normalized.clone());
        match provider.get_message_full(&candidate.provider_id).await {
            Ok(full) => {
                let mut text = full.body_text;
                text.truncate(MAX_BODY_CHARS);
                bodies.push(text);
            }
            Err(e) => warn!(message_id = %candidate.provider_id, error = %e, "body fetch failed, continuing"),
        }
    }

    // 5. Analysis labels.
    let timestamps: Vec<_> = candidates.iter().map(|m| m.timestamp).collect();
    let frequency = frequency_from_timestamps(&timestamps);
    let unread_count = candidates.iter().filter(|m| m.is_unread).count();
    let unread_ratio = unread_ratio_from_fraction(unread_count, candidates.len());

    // 6/7. Taxonomy prompt + tolerant response parsing, one retry on rejection.
    let active_labels = taxonomy.all_active().await?;
    let known_tier2 = known_tier2_pairs(&active_labels);
    let prompt = render_prompt(&active_labels, &distinct_subjects, &bodies, frequency, Some(unread_ratio));

    let parsed = classify_with_retry(generator, &prompt, &known_tier2).await?;

    // 8. Taxonomy extension.
    let subcategory_name = resolve_subcategory(taxonomy, &parsed).await?;

    // 9. Write-path: only messages still unlabelled in this cluster are updated.
    let mut labelled_count = 0usize;
    for candidate in &candidates {
        let updated = messages
            .set_category_if_unset(
                &candidate.provider_id,
                Some(cid),
                &parsed.tier1.slug(),
                subcategory_name.as_deref(),
                &config.labeler_version,
            )
            .await?;
        if !updated {
            continue;
        }
        labelled_count += 1;

        let label_slug = subcategory_name.clone().unwrap_or_else(|| parsed.tier1.slug());
        messages
            .upsert_assignment(&Assignment {
                message_id: candidate.provider_id.clone(),
                label_slug,
                assigned_at: Utc::now(),
            })
            .await?;
        label_outbox
            .enqueue_if_absent(&candidate.provider_id, OutboxReason::NewAssignment)
            .await?;
    }

    clusters
        .upsert(&Cluster {
            cluster_id: cid,
            seed_message_id: seed.provider_id.clone(),
            similarity_threshold: config.similarity_threshold,
            labeler_version: config.labeler_version.clone(),
            frequency,
            unread_ratio: Some(unread_ratio),
            category: Some(parsed.tier1.slug()),
            subcategory: subcategory_name,
        })
        .await?;

    Ok(labelled_count)
}

async fn resolve_subcategory(
    taxonomy: &dyn TaxonomyStore,
    parsed: &ParsedLabel,
) -> ei_core::Result<Option<String>> {
    let Some(name) = &parsed.tier2_name else { return Ok(None) };
    let slug = tier2_slug(&parsed.tier1.slug(), name);
    let inserted = taxonomy
        .insert_tier2_if_absent(TaxonomyLabel {
            level: TaxonomyLevel::Tier2,
            slug,
            name: name.clone(),
            description: None,
            parent_slug: Some(parsed.tier1.slug()),
            retention_days: None,
            active: true,
            provider_label_id: None,
            last_sync_status: None,
        })
        .await?;
    Ok(Some(inserted.slug))
}

async fn classify_with_retry(
    generator: &dyn GenerationModel,
    prompt: &str,
    known_tier2: &[(String, ei_core::types::Tier1Category)],
) -> ei_core::Result<ParsedLabel> {
    let response = generator.generate(prompt).await?;
    if let Some(parsed) = parse_label_response(&response, known_tier2) {
        if parsed.tier2_name.is_none() || !subcategory_needs_retry(&response) {
            return Ok(parsed);
        }
    }

    let stricter = format!(
        "{prompt}\n\nYour previous response was invalid. Reply with exactly two lines: \
         line 1 the Tier-1 category name, line 2 the Tier-2 subcategory name or the literal None. \
         No commentary, no explanations."
    );
    let retry_response = generator.generate(&stricter).await?;
    match parse_label_response(&retry_response, known_tier2) {
        Some(mut parsed) => {
            if parsed.tier2_name.as_deref().map(is_rejected_subcategory).unwrap_or(false) {
                parsed.tier2_name = None;
            }
            Ok(parsed)
        }
        None => Err(PipelineError::ContractViolation(format!(
            "model response did not resolve to a Tier-1 category: {retry_response:?}"
        ))),
    }
}

fn subcategory_needs_retry(response: &str) -> bool {
    let lines: Vec<&str> = response.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines.get(1).map(|l| is_rejected_subcategory(l)).unwrap_or(false)
}

fn known_tier2_pairs(labels: &[TaxonomyLabel]) -> Vec<(String, ei_core::types::Tier1Category)> {
    labels
        .iter()
        .filter(|l| l.level == TaxonomyLevel::Tier2)
        .filter_map(|l| {
            let parent_slug = l.parent_slug.as_deref()?;
            let parent = ei_core::types::Tier1Category::ALL
                .into_iter()
                .find(|c| c.slug() == parent_slug)?;
            Some((l.name.clone(), parent))
        })
        .collect()
}

fn render_prompt(
    labels: &[TaxonomyLabel],
    subjects: &BTreeSet<String>,
    bodies: &[String],
    frequency: Option<ei_core::types::Frequency>,
    unread_ratio: Option<ei_core::types::UnreadRatio>,
) -> String {
    let mut tier1_lines = String::new();
    for cat in ei_core::types::Tier1Category::ALL {
        tier1_lines.push_str("- ");
        tier1_lines.push_str(cat.as_str_title());
        tier1_lines.push('\n');
    }

    let mut tier2_lines = String::new();
    for label in labels.iter().filter(|l| l.level == TaxonomyLevel::Tier2) {
        tier2_lines.push_str("- ");
        tier2_lines.push_str(&label.name);
        tier2_lines.push_str(" (under ");
        tier2_lines.push_str(label.parent_slug.as_deref().unwrap_or("?"));
        tier2_lines.push_str(")\n");
    }

    let subject_lines: String = subjects
        .iter()
        .take(MAX_PROMPT_TIER2_EXAMPLES)
        .map(|s| format!("- {s}\n"))
        .collect();

    let body_lines: String = bodies
        .iter()
        .enumerate()
        .map(|(i, b)| format!("--- sample {} ---\n{}\n", i + 1, b))
        .collect();

    format!(
        "Tier-1 categories:\n{tier1_lines}\nKnown Tier-2 subcategories:\n{tier2_lines}\n\
         Subjects in this cluster:\n{subject_lines}\n\
         Body samples:\n{body_lines}\n\
         Frequency: {freq}\nUnread ratio: {unread}\n\n\
         Reply with exactly two non-empty lines: line 1 the Tier-1 category, \
         line 2 the Tier-2 subcategory or the literal None.",
        freq = frequency.map(|f| f.to_string()).unwrap_or_else(|| "unknown".to_string()),
        unread = unread_ratio.map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string()),
    )
}
