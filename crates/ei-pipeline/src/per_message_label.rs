//! Per-message labeling (C7, spec §4.3). Used instead of clustering when the
//! unlabelled backlog is small — synthesizes the same analysis labels from a
//! sender's recent history rather than waiting for a cluster to form.

use ei_core::{
    analysis::{frequency_from_timestamps, unread_ratio_from_fraction},
    ports::{LabelOutboxStore, MessageStore, TaxonomyStore},
    taxonomy::{is_rejected_subcategory, parse_label_response, tier2_slug, ParsedLabel},
    types::{Assignment, Message, OutboxReason, TaxonomyLabel, TaxonomyLevel},
    PipelineError,
};
use ei_llm::GenerationModel;
use ei_provider::Provider;
use chrono::Utc;
use tracing::warn;

use crate::config::PipelineConfig;

const RECENT_SENDER_LIMIT: i64 = 50;
const MAX_BODY_CHARS: usize = 20_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerMessageLabelReport {
    pub labelled: u64,
    pub failed: u64,
}

pub async fn run(
    messages: &dyn MessageStore,
    taxonomy: &dyn TaxonomyStore,
    label_outbox: &dyn LabelOutboxStore,
    provider: &dyn Provider,
    generator: &dyn GenerationModel,
    config: &PipelineConfig,
    run_cap: usize,
) -> ei_core::Result<PerMessageLabelReport> {
    let mut report = PerMessageLabelReport::default();

    for _ in 0..run_cap {
        let batch = messages.unlabelled(1).await?;
        let Some(message) = batch.into_iter().next() else { break };

        match label_one_message(&message, messages, taxonomy, label_outbox, provider, generator, config).await {
            Ok(true) => report.labelled += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(message_id = %message.provider_id, error = %e, "per-message label failed, continuing");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

async fn label_one_message(
    message: &Message,
    messages: &dyn MessageStore,
    taxonomy: &dyn TaxonomyStore,
    label_outbox: &dyn LabelOutboxStore,
    provider: &dyn Provider,
    generator: &dyn GenerationModel,
    config: &PipelineConfig,
) -> ei_core::Result<bool> {
    let history = messages.recent_by_sender(&message.from_address, RECENT_SENDER_LIMIT).await?;
    let timestamps: Vec<_> = history.iter().map(|m| m.timestamp).chain(std::iter::once(message.timestamp)).collect();
    let frequency = frequency_from_timestamps(&timestamps);
    let unread_count = history.iter().filter(|m| m.is_unread).count() + usize::from(message.is_unread);
    let unread_ratio = unread_ratio_from_fraction(unread_count, history.len() + 1);

    let body = match provider.get_message_full(&message.provider_id).await {
        Ok(full) => {
            let mut text = full.body_text;
            text.truncate(MAX_BODY_CHARS);
            text
        }
        Err(e) => {
            warn!(message_id = %message.provider_id, error = %e, "body fetch failed, labeling from subject only");
            String::new()
        }
    };

    let active_labels = taxonomy.all_active().await?;
    let known_tier2 = known_tier2_pairs(&active_labels);
    let prompt = render_prompt(message, &body, &active_labels, frequency, unread_ratio);

    let parsed = classify_with_retry(generator, &prompt, &known_tier2).await?;
    let subcategory_name = resolve_subcategory(taxonomy, &parsed).await?;

    let updated = messages
        .set_category_if_unset(
            &message.provider_id,
            None,
            &parsed.tier1.slug(),
            subcategory_name.as_deref(),
            &config.labeler_version,
        )
        .await?;
    if !updated {
        return Ok(false);
    }

    let label_slug = subcategory_name.clone().unwrap_or_else(|| parsed.tier1.slug());
    messages
        .upsert_assignment(&Assignment {
            message_id: message.provider_id.clone(),
            label_slug,
            assigned_at: Utc::now(),
        })
        .await?;
    label_outbox
        .enqueue_if_absent(&message.provider_id, OutboxReason::NewAssignment)
        .await?;

    Ok(true)
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
        return Ok(parsed);
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
    message: &Message,
    body: &str,
    labels: &[TaxonomyLabel],
    frequency: Option<ei_core::types::Frequency>,
    unread_ratio: ei_core::types::UnreadRatio,
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
        tier2_lines.push('\n');
    }

    format!(
        "Tier-1 categories:\n{tier1_lines}\nKnown Tier-2 subcategories:\n{tier2_lines}\n\
         Subject: {subject}\nFrom domain: {domain}\n\
         Body:\n{body}\n\n\
         Sender frequency: {freq}\nSender unread ratio: {unread}\n\n\
         Reply with exactly two non-empty lines: line 1 the Tier-1 category, \
         line 2 the Tier-2 subcategory or the literal None.",
        subject = message.subject_raw,
        domain = message.from_domain,
        freq = frequency.map(|f| f.to_string()).unwrap_or_else(|| "unknown".to_string()),
        unread = unread_ratio,
    )
}
