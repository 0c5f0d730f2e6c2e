//! `GET /dashboard/summary` — a thin read model over the store ports: the
//! unlabelled backlog size plus a per-Tier-1-category count.
//!
//! The category counts are bounded by `max_unlabelled_per_run` (the same
//! page size jobs operate on) rather than a true `COUNT(*) GROUP BY`,
//! since `MessageStore` exposes `by_category` as a capped page, not an
//! aggregate. Good enough for an at-a-glance dashboard; a deployment that
//! needs exact totals would add a dedicated count method to the port.

use std::sync::Arc;

use axum::{extract::Extension, Json};
use ei_core::types::Tier1Category;
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct CategoryCount {
    category: String,
    sampled_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    unlabelled_backlog: i64,
    category_counts: Vec<CategoryCount>,
}

pub async fn summary(Extension(state): Extension<Arc<AppState>>) -> Result<Json<DashboardSummary>, AppError> {
    let unlabelled_backlog = state.messages.count_unlabelled().await?;
    let sample_limit = state.config.max_unlabelled_per_run;

    let mut category_counts = Vec::with_capacity(Tier1Category::ALL.len());
    for category in Tier1Category::ALL {
        let slug = category.slug();
        let sampled = state.messages.by_category(&slug, sample_limit).await?;
        category_counts.push(CategoryCount { category: category.as_str_title().to_string(), sampled_count: sampled.len() });
    }

    Ok(Json(DashboardSummary { unlabelled_backlog, category_counts }))
}
