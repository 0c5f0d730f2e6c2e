//! Incremental ingestion (C5, spec §4.1).

use chrono::{DateTime, Duration, Utc};
use ei_core::{
    ports::{CheckpointStore, MessageStore, VectorIndex},
    retention::vector_point_id,
    types::{Message, VectorPoint, CHECKPOINT_KEY_LAST_INGESTED},
};
use ei_llm::EmbeddingModel;
use ei_provider::Provider;
use tracing::warn;

use crate::config::PipelineConfig;

const METADATA_HEADERS: &[&str] = &["From", "To", "Cc", "Subject"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub new_checkpoint: Option<DateTime<Utc>>,
}

pub async fn run(
    checkpoints: &dyn CheckpointStore,
    messages: &dyn MessageStore,
    vectors: &dyn VectorIndex,
    provider: &dyn Provider,
    embedder: &dyn EmbeddingModel,
    config: &PipelineConfig,
) -> ei_core::Result<IngestReport> {
    let checkpoint = match checkpoints.get(CHECKPOINT_KEY_LAST_INGESTED).await? {
        Some(raw) => raw.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        None => None,
    };

    // 1s safety margin against boundary misses (spec §4.1).
    let query = match checkpoint {
        Some(ts) => format!("after:{}", (ts - Duration::seconds(1)).timestamp()),
        None => String::new(),
    };

    let mut report = IngestReport { new_checkpoint: checkpoint, ..Default::default() };
    let mut page_token: Option<String> = None;
    let mut high_watermark = checkpoint;

    loop {
        let page = provider.list_messages(&query, page_token.as_deref(), 100).await?;
        for id in &page.message_ids {
            match ingest_one(id, checkpoint, messages, vectors, provider, embedder, config).await {
                Ok(Some(ts)) => {
                    report.processed += 1;
                    high_watermark = Some(high_watermark.map_or(ts, |hw| hw.max(ts)));
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(message_id = %id, error = %e, "ingest: message failed, continuing");
                    report.failed += 1;
                }
            }
        }
        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    if let Some(hw) = high_watermark {
        let advanced = match checkpoint {
            Some(cp) => hw > cp,
            None => true,
        };
        if advanced {
            checkpoints
                .set(CHECKPOINT_KEY_LAST_INGESTED, &hw.timestamp().to_string())
                .await?;
        }
        report.new_checkpoint = Some(hw);
    }

    Ok(report)
}

/// Returns `Ok(Some(timestamp))` on a persisted message, `Ok(None)` for a
/// defensive skip (already past the checkpoint).
async fn ingest_one(
    provider_id: &str,
    checkpoint: Option<DateTime<Utc>>,
    messages: &dyn MessageStore,
    vectors: &dyn VectorIndex,
    provider: &dyn Provider,
    embedder: &dyn EmbeddingModel,
    config: &PipelineConfig,
) -> ei_core::Result<Option<DateTime<Utc>>> {
    let metadata = provider.get_message_metadata(provider_id, METADATA_HEADERS).await?;

    if let Some(cp) = checkpoint {
        if metadata.internal_date <= cp {
            return Ok(None);
        }
    }

    let from_header = metadata.headers.get("From").cloned().unwrap_or_default();
    let from_address = extract_address(&from_header);
    let from_domain = domain_of(&from_address);
    let to_addresses = split_addresses(metadata.headers.get("To").map(String::as_str).unwrap_or(""));
    let cc_addresses = split_addresses(metadata.headers.get("Cc").map(String::as_str).unwrap_or(""));
    let subject_raw = metadata.headers.get("Subject").cloned().unwrap_or_default();
    let subject_normalized = ei_core::normalize::normalize_subject(&subject_raw);
    let is_unread = metadata.label_ids.iter().any(|l| l == "UNREAD");

    let message = Message {
        provider_id: metadata.id.clone(),
        thread_id: metadata.thread_id,
        timestamp: metadata.internal_date,
        is_unread,
        provider_labels: metadata.label_ids,
        from_address,
        from_domain,
        to_addresses,
        cc_addresses,
        subject_raw,
        subject_normalized,
        category: None,
        subcategory: None,
        labeler_version: None,
        cluster_id: None,
        archived_at: None,
        trashed_at: None,
    };

    messages.upsert_metadata(&message).await?;

    let embedding_text = canonical_embedding_text(&message);
    let vector = embedder.embed(&embedding_text).await?;
    vectors
        .upsert(&VectorPoint {
            id: vector_point_id(&message.provider_id),
            message_id: message.provider_id.clone(),
            vector,
            vector_version: config.vector_version.clone(),
        })
        .await?;

    Ok(Some(message.timestamp))
}

/// Fixed format so repeated runs over the same message embed identically.
pub(crate) fn canonical_embedding_text(message: &Message) -> String {
    format!(
        "subject: {}\nfrom_domain: {}\nis_unread: {}\n",
        message.subject_normalized, message.from_domain, message.is_unread
    )
}

fn extract_address(header: &str) -> String {
    if let (Some(start), Some(end)) = (header.find('<'), header.find('>')) {
        if end > start {
            return header[start + 1..end].trim().to_ascii_lowercase();
        }
    }
    header.trim().to_ascii_lowercase()
}

fn split_addresses(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(extract_address)
        .collect()
}

fn domain_of(address: &str) -> String {
    address.rsplit_once('@').map(|(_, d)| d.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ei_core::types::{Assignment, VectorNeighbor, VectorPoint};
    use ei_provider::mock::{MockMessage, MockProvider};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct FakeCheckpoints {
        value: Mutex<Option<String>>,
    }

    #[async_trait]
    impl CheckpointStore for FakeCheckpoints {
        async fn get(&self, _key: &str) -> ei_core::Result<Option<String>> {
            Ok(self.value.lock().unwrap().clone())
        }
        async fn set(&self, _key: &str, value: &str) -> ei_core::Result<()> {
            *self.value.lock().unwrap() = Some(value.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
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
            _cluster_id: Option<uuid::Uuid>,
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
            Ok(self.rows.lock().unwrap().keys().cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeVectors {
        points: Mutex<StdHashMap<String, VectorPoint>>,
    }

    #[async_trait]
    impl VectorIndex for FakeVectors {
        async fn upsert(&self, point: &VectorPoint) -> ei_core::Result<()> {
            self.points.lock().unwrap().insert(point.message_id.clone(), point.clone());
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
        async fn delete_missing(&self, _known_message_ids: &[String]) -> ei_core::Result<u64> {
            Ok(0)
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        async fn embed(&self, _text: &str) -> ei_core::Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    fn mock_message(id: &str, ts_secs: i64) -> MockMessage {
        MockMessage {
            id: id.to_string(),
            thread_id: format!("thread-{id}"),
            internal_date: DateTime::from_timestamp(ts_secs, 0).unwrap(),
            label_ids: vec!["INBOX".to_string()],
            headers: StdHashMap::from([
                ("From".to_string(), "news@x.com".to_string()),
                ("Subject".to_string(), format!("message {id}")),
            ]),
            body_text: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn ingest_from_scratch_persists_all_messages_and_advances_checkpoint() {
        let provider = MockProvider::new(
            vec![
                mock_message("t1", 1_700_000_000),
                mock_message("t2", 1_700_000_100),
                mock_message("t3", 1_700_000_200),
            ],
            vec![],
        );
        let checkpoints = FakeCheckpoints { value: Mutex::new(None) };
        let messages = FakeMessages::default();
        let vectors = FakeVectors::default();
        let embedder = FakeEmbedder;
        let config = PipelineConfig::default();

        let report = run(&checkpoints, &messages, &vectors, &provider, &embedder, &config).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(messages.rows.lock().unwrap().len(), 3);

        let points = vectors.points.lock().unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.values().all(|p| p.vector_version == config.vector_version));

        let stored_checkpoint = checkpoints.value.lock().unwrap().clone().unwrap();
        assert_eq!(stored_checkpoint, "1700000200");
        assert_eq!(report.new_checkpoint.unwrap().timestamp(), 1_700_000_200);
    }

    #[tokio::test]
    async fn rerunning_ingest_against_same_state_is_a_no_op() {
        let provider = MockProvider::new(vec![mock_message("t1", 1_700_000_000)], vec![]);
        let checkpoints = FakeCheckpoints { value: Mutex::new(None) };
        let messages = FakeMessages::default();
        let vectors = FakeVectors::default();
        let embedder = FakeEmbedder;
        let config = PipelineConfig::default();

        run(&checkpoints, &messages, &vectors, &provider, &embedder, &config).await.unwrap();

        let second = run(&checkpoints, &messages, &vectors, &provider, &embedder, &config).await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 1);
    }
}
