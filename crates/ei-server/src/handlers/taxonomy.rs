//! Read-only taxonomy browsing: the active label tree the classifier and
//! per-message labeler assign against.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
};
use ei_core::types::TaxonomyLabel;

use crate::{error::AppError, state::AppState};

pub async fn list_taxonomy(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Vec<TaxonomyLabel>>, AppError> {
    Ok(Json(state.taxonomy.all_active().await?))
}

pub async fn taxonomy_children(
    Extension(state): Extension<Arc<AppState>>,
    Path(parent_slug): Path<String>,
) -> Result<Json<Vec<TaxonomyLabel>>, AppError> {
    Ok(Json(state.taxonomy.tier2_under(&parent_slug).await?))
}
