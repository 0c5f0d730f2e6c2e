//! Shared application state: one `Arc` bundling every port the handlers and
//! job bodies need, built once in `ei-cli::serve` and attached to the
//! router as an `Extension`.

use std::sync::Arc;

use ei_core::ports::{
    ArchiveOutboxStore, CheckpointStore, ClusterStore, EventStore, LabelOutboxStore, MessageStore, PaymentStore,
    PolicyStore, TaxonomyStore, VectorIndex,
};
use ei_jobs::JobRegistry;
use ei_llm::{EmbeddingModel, GenerationModel};
use ei_pipeline::config::PipelineConfig;
use ei_provider::Provider;

pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub messages: Arc<dyn MessageStore>,
    pub clusters: Arc<dyn ClusterStore>,
    pub taxonomy: Arc<dyn TaxonomyStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub label_outbox: Arc<dyn LabelOutboxStore>,
    pub archive_outbox: Arc<dyn ArchiveOutboxStore>,
    pub events: Arc<dyn EventStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub provider: Arc<dyn Provider>,
    pub generator: Arc<dyn GenerationModel>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub config: PipelineConfig,
}
