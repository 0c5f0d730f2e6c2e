//! Router construction: everything here is read-only or job-control, so
//! unlike `sem_os_server` there is no protected/public JWT split — the
//! whole surface is meant to sit behind a reverse proxy or VPN, not to
//! authenticate callers itself.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, state::AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/dashboard/summary", get(handlers::dashboard::summary))
        .route("/taxonomy", get(handlers::taxonomy::list_taxonomy))
        .route("/taxonomy/:parent_slug/children", get(handlers::taxonomy::taxonomy_children))
        .route("/messages/recent", get(handlers::messages::recent_messages))
        .route("/messages/:provider_id", get(handlers::messages::get_message))
        .route("/messages/:provider_id/event", get(handlers::messages::get_event))
        .route("/messages/:provider_id/payment", get(handlers::messages::get_payment))
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route("/jobs/:kind", post(handlers::jobs::start_job))
        .route("/jobs/id/:job_id", get(handlers::jobs::get_job))
        .route("/jobs/id/:job_id/events", get(handlers::jobs::job_events))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
