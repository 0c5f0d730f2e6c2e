//! HTTP-level integration tests over in-memory fake ports — unlike
//! `sem_os_server`'s database-backed integration tests, `ei-server` never
//! touches `sqlx` itself, so a fake `Arc<dyn Trait>` per port is enough to
//! drive the router end to end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use chrono::{DateTime, Utc};
use ei_core::ports::*;
use ei_core::types::*;
use ei_jobs::JobRegistry;
use ei_llm::{EmbeddingModel, GenerationModel};
use ei_pipeline::config::PipelineConfig;
use ei_provider::{
    ListMessagesPage, Provider, ProviderLabel, ProviderMessageFull, ProviderMessageMetadata,
};
use ei_server::state::AppState;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct FakeCheckpoints(Mutex<HashMap<String, String>>);

#[async_trait]
impl CheckpointStore for FakeCheckpoints {
    async fn get(&self, key: &str) -> ei_core::Result<Option<String>> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }
    async fn set(&self, key: &str, value: &str) -> ei_core::Result<()> {
        self.0.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeMessages(Mutex<HashMap<String, Message>>);

#[async_trait]
impl MessageStore for FakeMessages {
    async fn upsert_metadata(&self, message: &Message) -> ei_core::Result<()> {
        self.0.lock().unwrap().insert(message.provider_id.clone(), message.clone());
        Ok(())
    }
    async fn get(&self, provider_id: &str) -> ei_core::Result<Option<Message>> {
        Ok(self.0.lock().unwrap().get(provider_id).cloned())
    }
    async fn set_category_if_unset(
        &self,
        provider_id: &str,
        cluster_id: Option<Uuid>,
        category: &str,
        subcategory: Option<&str>,
        labeler_version: &str,
    ) -> ei_core::Result<bool> {
        let mut guard = self.0.lock().unwrap();
        if let Some(message) = guard.get_mut(provider_id) {
            if message.category.is_none() {
                message.category = Some(category.to_string());
                message.subcategory = subcategory.map(str::to_string);
                message.labeler_version = Some(labeler_version.to_string());
                message.cluster_id = cluster_id;
                return Ok(true);
            }
        }
        Ok(false)
    }
    async fn unlabelled(&self, limit: i64) -> ei_core::Result<Vec<Message>> {
        Ok(self.0.lock().unwrap().values().filter(|m| m.category.is_none()).take(limit as usize).cloned().collect())
    }
    async fn count_unlabelled(&self) -> ei_core::Result<i64> {
        Ok(self.0.lock().unwrap().values().filter(|m| m.category.is_none()).count() as i64)
    }
    async fn unlabelled_by_domain(&self, _domain: &str, _exclude_id: &str) -> ei_core::Result<Vec<Message>> {
        Ok(Vec::new())
    }
    async fn recent_by_sender(&self, _from_address: &str, _limit: i64) -> ei_core::Result<Vec<Message>> {
        Ok(Vec::new())
    }
    async fn stamp_archived(&self, provider_id: &str, at: DateTime<Utc>) -> ei_core::Result<()> {
        if let Some(message) = self.0.lock().unwrap().get_mut(provider_id) {
            message.archived_at = Some(at);
        }
        Ok(())
    }
    async fn stamp_trashed(&self, provider_id: &str, at: DateTime<Utc>) -> ei_core::Result<()> {
        if let Some(message) = self.0.lock().unwrap().get_mut(provider_id) {
            message.trashed_at = Some(at);
        }
        Ok(())
    }
    async fn by_category(&self, category: &str, limit: i64) -> ei_core::Result<Vec<Message>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.category.as_deref() == Some(category))
            .take(limit as usize)
            .cloned()
            .collect())
    }
    async fn recent_window(&self, since: DateTime<Utc>, limit: i64) -> ei_core::Result<Vec<Message>> {
        Ok(self.0.lock().unwrap().values().filter(|m| m.timestamp >= since).take(limit as usize).cloned().collect())
    }
    async fn retention_eligible(&self, _default_days: i32, _now: DateTime<Utc>) -> ei_core::Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn upsert_assignment(&self, _assignment: &Assignment) -> ei_core::Result<()> {
        Ok(())
    }
    async fn all_ids(&self) -> ei_core::Result<Vec<String>> {
        Ok(self.0.lock().unwrap().keys().cloned().collect())
    }
}

#[derive(Default)]
struct FakeClusters(Mutex<HashMap<Uuid, Cluster>>);

#[async_trait]
impl ClusterStore for FakeClusters {
    async fn upsert(&self, cluster: &Cluster) -> ei_core::Result<()> {
        self.0.lock().unwrap().insert(cluster.cluster_id, cluster.clone());
        Ok(())
    }
    async fn get(&self, cluster_id: Uuid) -> ei_core::Result<Option<Cluster>> {
        Ok(self.0.lock().unwrap().get(&cluster_id).cloned())
    }
}

#[derive(Default)]
struct FakeTaxonomy(Mutex<Vec<TaxonomyLabel>>);

#[async_trait]
impl TaxonomyStore for FakeTaxonomy {
    async fn all_active(&self) -> ei_core::Result<Vec<TaxonomyLabel>> {
        Ok(self.0.lock().unwrap().iter().filter(|l| l.active).cloned().collect())
    }
    async fn get_by_slug(&self, slug: &str) -> ei_core::Result<Option<TaxonomyLabel>> {
        Ok(self.0.lock().unwrap().iter().find(|l| l.slug == slug).cloned())
    }
    async fn tier2_under(&self, parent_slug: &str) -> ei_core::Result<Vec<TaxonomyLabel>> {
        Ok(self.0.lock().unwrap().iter().filter(|l| l.parent_slug.as_deref() == Some(parent_slug)).cloned().collect())
    }
    async fn insert_tier2_if_absent(&self, label: TaxonomyLabel) -> ei_core::Result<TaxonomyLabel> {
        let mut guard = self.0.lock().unwrap();
        if let Some(existing) = guard.iter().find(|l| l.slug == label.slug) {
            return Ok(existing.clone());
        }
        guard.push(label.clone());
        Ok(label)
    }
    async fn update_provider_sync(&self, _slug: &str, _provider_label_id: &str, _status: &str) -> ei_core::Result<()> {
        Ok(())
    }
    async fn merge_duplicate_tier2(&self) -> ei_core::Result<u64> {
        Ok(0)
    }
}

#[derive(Default)]
struct FakeVectors;

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
    async fn delete_missing(&self, _known_message_ids: &[String]) -> ei_core::Result<u64> {
        Ok(0)
    }
}

#[derive(Default)]
struct FakeLabelOutbox;

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
    async fn gc_processed(&self, _older_than: DateTime<Utc>) -> ei_core::Result<u64> {
        Ok(0)
    }
}

#[derive(Default)]
struct FakeArchiveOutbox;

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
        Ok(0)
    }
}

#[derive(Default)]
struct FakeEvents(Mutex<HashMap<String, EventRecord>>);

#[async_trait]
impl EventStore for FakeEvents {
    async fn upsert(&self, record: &EventRecord) -> ei_core::Result<()> {
        self.0.lock().unwrap().insert(record.message_id.clone(), record.clone());
        Ok(())
    }
    async fn get(&self, message_id: &str) -> ei_core::Result<Option<EventRecord>> {
        Ok(self.0.lock().unwrap().get(message_id).cloned())
    }
}

#[derive(Default)]
struct FakePayments(Mutex<HashMap<String, PaymentRecord>>);

#[async_trait]
impl PaymentStore for FakePayments {
    async fn upsert(&self, record: &PaymentRecord) -> ei_core::Result<()> {
        self.0.lock().unwrap().insert(record.message_id.clone(), record.clone());
        Ok(())
    }
    async fn get(&self, message_id: &str) -> ei_core::Result<Option<PaymentRecord>> {
        Ok(self.0.lock().unwrap().get(message_id).cloned())
    }
    async fn exists_with_fingerprint(&self, fingerprint: &str) -> ei_core::Result<bool> {
        Ok(self.0.lock().unwrap().values().any(|p| p.fingerprint == fingerprint))
    }
}

#[derive(Default)]
struct FakePolicies;

#[async_trait]
impl PolicyStore for FakePolicies {
    async fn list_enabled(&self, _trigger: PolicyTrigger) -> ei_core::Result<Vec<Policy>> {
        Ok(Vec::new())
    }
    async fn matching_message_ids(&self, _policy: &Policy, _limit: i64) -> ei_core::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

struct FakeProvider;

#[async_trait]
impl Provider for FakeProvider {
    async fn list_messages(&self, _query: &str, _page_token: Option<&str>, _page_size: u32) -> ei_core::Result<ListMessagesPage> {
        Ok(ListMessagesPage { message_ids: Vec::new(), next_page_token: None })
    }
    async fn get_message_metadata(&self, id: &str, _headers: &[&str]) -> ei_core::Result<ProviderMessageMetadata> {
        Ok(ProviderMessageMetadata {
            id: id.to_string(),
            thread_id: id.to_string(),
            internal_date: Utc::now(),
            label_ids: Vec::new(),
            headers: HashMap::new(),
        })
    }
    async fn get_message_full(&self, id: &str) -> ei_core::Result<ProviderMessageFull> {
        Ok(ProviderMessageFull {
            id: id.to_string(),
            thread_id: id.to_string(),
            internal_date: Utc::now(),
            label_ids: Vec::new(),
            headers: HashMap::new(),
            body_text: "body".to_string(),
        })
    }
    async fn modify_labels(&self, _id: &str, _add: &[String], _remove: &[String]) -> ei_core::Result<()> {
        Ok(())
    }
    async fn trash(&self, _id: &str) -> ei_core::Result<()> {
        Ok(())
    }
    async fn list_labels(&self) -> ei_core::Result<Vec<ProviderLabel>> {
        Ok(Vec::new())
    }
    async fn create_label(&self, name: &str) -> ei_core::Result<ProviderLabel> {
        Ok(ProviderLabel { id: name.to_string(), name: name.to_string() })
    }
    async fn update_label(&self, id: &str, name: &str) -> ei_core::Result<ProviderLabel> {
        Ok(ProviderLabel { id: id.to_string(), name: name.to_string() })
    }
}

struct FakeGenerator;

#[async_trait]
impl GenerationModel for FakeGenerator {
    async fn generate(&self, _prompt: &str) -> ei_core::Result<String> {
        Ok("{}".to_string())
    }
}

struct FakeEmbedder;

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    async fn embed(&self, _text: &str) -> ei_core::Result<Vec<f32>> {
        Ok(vec![0.0; 8])
    }
}

fn sample_message(provider_id: &str, category: Option<&str>) -> Message {
    Message {
        provider_id: provider_id.to_string(),
        thread_id: "thread-1".to_string(),
        timestamp: Utc::now(),
        is_unread: false,
        provider_labels: Vec::new(),
        from_address: "sender@example.com".to_string(),
        from_domain: "example.com".to_string(),
        to_addresses: Vec::new(),
        cc_addresses: Vec::new(),
        subject_raw: "Hello".to_string(),
        subject_normalized: "hello".to_string(),
        category: category.map(str::to_string),
        subcategory: None,
        labeler_version: None,
        cluster_id: None,
        archived_at: None,
        trashed_at: None,
    }
}

async fn build_test_app() -> axum::Router {
    let messages = Arc::new(FakeMessages::default());
    messages.upsert_metadata(&sample_message("m1", None)).await.unwrap();
    messages.upsert_metadata(&sample_message("m2", Some("financial"))).await.unwrap();

    let taxonomy = Arc::new(FakeTaxonomy::default());
    taxonomy
        .0
        .lock()
        .unwrap()
        .push(TaxonomyLabel {
            level: TaxonomyLevel::Tier1,
            slug: "financial".to_string(),
            name: "Financial".to_string(),
            description: None,
            parent_slug: None,
            retention_days: Some(365),
            active: true,
            provider_label_id: None,
            last_sync_status: None,
        });

    let state = Arc::new(AppState {
        registry: Arc::new(JobRegistry::new()),
        checkpoints: Arc::new(FakeCheckpoints::default()),
        messages,
        clusters: Arc::new(FakeClusters::default()),
        taxonomy,
        vectors: Arc::new(FakeVectors),
        label_outbox: Arc::new(FakeLabelOutbox),
        archive_outbox: Arc::new(FakeArchiveOutbox),
        events: Arc::new(FakeEvents::default()),
        payments: Arc::new(FakePayments::default()),
        policies: Arc::new(FakePolicies),
        provider: Arc::new(FakeProvider),
        generator: Arc::new(FakeGenerator),
        embedder: Arc::new(FakeEmbedder),
        config: PipelineConfig::default(),
    });

    ei_server::build_router(state)
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| serde_json::json!({"raw": String::from_utf8_lossy(&bytes).to_string()}))
}

#[tokio::test]
async fn health_returns_ok() {
    let app = build_test_app().await;
    let resp = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn dashboard_summary_counts_unlabelled_backlog() {
    let app = build_test_app().await;
    let resp = app.oneshot(Request::builder().uri("/dashboard/summary").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["unlabelled_backlog"], 1);
}

#[tokio::test]
async fn taxonomy_lists_active_labels() {
    let app = build_test_app().await;
    let resp = app.oneshot(Request::builder().uri("/taxonomy").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn get_message_returns_404_for_unknown_id() {
    let app = build_test_app().await;
    let resp = app.oneshot(Request::builder().uri("/messages/does-not-exist").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn get_message_returns_known_message() {
    let app = build_test_app().await;
    let resp = app.oneshot(Request::builder().uri("/messages/m2").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["provider_id"], "m2");
}

#[tokio::test]
async fn starting_a_job_returns_an_id_and_it_becomes_queryable() {
    let app = build_test_app().await;
    let resp = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/jobs/trash-sync").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("job-"));

    let resp = app.oneshot(Request::builder().uri(format!("/jobs/id/{job_id}")).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn starting_an_unknown_job_kind_is_rejected() {
    let app = build_test_app().await;
    let resp = app
        .oneshot(Request::builder().method("POST").uri("/jobs/not-a-real-kind").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn subscribing_to_a_finished_jobs_events_yields_the_terminal_status_and_closes() {
    let app = build_test_app().await;

    let resp = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/jobs/trash-sync").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(resp).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    // Wait for the job to reach a terminal state before subscribing, so
    // this exercises a subscribe-after-close, not a subscribe-during-run.
    for _ in 0..50 {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(format!("/jobs/id/{job_id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = body_json(resp).await;
        if status["state"] == "succeeded" || status["state"] == "failed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let resp = app
        .oneshot(Request::builder().uri(format!("/jobs/id/{job_id}/events")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // A hanging stream would never resolve this `collect`; a seeded,
    // already-closed subscriber delivers one event and ends the stream.
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("\"state\":\"succeeded\""), "expected a terminal event, got: {text}");
}
