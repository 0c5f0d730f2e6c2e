//! Per-message lookups: metadata, and any extracted event/payment record.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{DateTime, Utc};
use ei_core::types::{EventRecord, Message, PaymentRecord};
use serde::Deserialize;

use crate::{error::AppError, state::AppState};

pub async fn get_message(
    Extension(state): Extension<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> Result<Json<Message>, AppError> {
    let message = state
        .messages
        .get(&provider_id)
        .await?
        .ok_or_else(|| AppError::from(ei_core::PipelineError::NotFound(format!("no such message: {provider_id}"))))?;
    Ok(Json(message))
}

pub async fn get_event(
    Extension(state): Extension<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> Result<Json<EventRecord>, AppError> {
    let record = state
        .events
        .get(&provider_id)
        .await?
        .ok_or_else(|| AppError::from(ei_core::PipelineError::NotFound(format!("no event for: {provider_id}"))))?;
    Ok(Json(record))
}

pub async fn get_payment(
    Extension(state): Extension<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> Result<Json<PaymentRecord>, AppError> {
    let record = state
        .payments
        .get(&provider_id)
        .await?
        .ok_or_else(|| AppError::from(ei_core::PipelineError::NotFound(format!("no payment for: {provider_id}"))))?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<i64>,
}

pub async fn recent_messages(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let since = query.since.unwrap_or_else(|| Utc::now() - chrono::Duration::days(1));
    let limit = query.limit.unwrap_or(100);
    Ok(Json(state.messages.recent_window(since, limit).await?))
}
