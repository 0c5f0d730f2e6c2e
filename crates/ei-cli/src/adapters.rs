//! Builds the concrete port adapters from `Config` and bundles them into
//! the `AppState` that job bodies and HTTP handlers share.

use std::sync::Arc;

use ei_llm::OllamaClient;
use ei_postgres::PgStores;
use ei_provider::http::HttpProvider;
use ei_server::AppState;
use ei_vector::QdrantVectorIndex;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let pool = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    PgStores::migrate(&pool).await?;

    let stores = PgStores::new(pool);
    let vectors = QdrantVectorIndex::new(config.qdrant_url.clone(), config.qdrant_collection.clone());
    let provider = HttpProvider::new(config.provider_base_url.clone(), config.provider_access_token.clone());
    let model = OllamaClient::new(
        config.ollama_base_url.clone(),
        config.embedding_model.clone(),
        config.generation_model.clone(),
        config.embedding_dimension,
    );
    let model = Arc::new(model);

    Ok(Arc::new(AppState {
        registry: Arc::new(ei_jobs::JobRegistry::new()),
        checkpoints: Arc::new(stores.checkpoints),
        messages: Arc::new(stores.messages),
        clusters: Arc::new(stores.clusters),
        taxonomy: Arc::new(stores.taxonomy),
        vectors: Arc::new(vectors),
        label_outbox: Arc::new(stores.label_outbox),
        archive_outbox: Arc::new(stores.archive_outbox),
        events: Arc::new(stores.events),
        payments: Arc::new(stores.payments),
        policies: Arc::new(stores.policies),
        provider: Arc::new(provider),
        generator: model.clone(),
        embedder: model,
        config: config.pipeline.clone(),
    }))
}
