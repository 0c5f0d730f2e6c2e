//! `Provider` — the sole API boundary between the pipeline and the mail
//! provider. The pipeline depends on this trait, never on `reqwest` or a
//! specific provider's SDK directly.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ei_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type BoxProvider = std::sync::Arc<dyn Provider>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMessagesPage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessageMetadata {
    pub id: String,
    pub thread_id: String,
    pub internal_date: DateTime<Utc>,
    pub label_ids: Vec<String>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessageFull {
    pub id: String,
    pub thread_id: String,
    pub internal_date: DateTime<Utc>,
    pub label_ids: Vec<String>,
    pub headers: HashMap<String, String>,
    pub body_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderLabel {
    pub id: String,
    pub name: String,
}

/// Gmail-shaped RPCs (spec §6). Query language supports `after:<unix-seconds>`
/// and label-name filters; the provider is free to interpret the rest.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<ListMessagesPage>;

    async fn get_message_metadata(
        &self,
        id: &str,
        headers: &[&str],
    ) -> Result<ProviderMessageMetadata>;

    async fn get_message_full(&self, id: &str) -> Result<ProviderMessageFull>;

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()>;

    async fn trash(&self, id: &str) -> Result<()>;

    async fn list_labels(&self) -> Result<Vec<ProviderLabel>>;

    async fn create_label(&self, name: &str) -> Result<ProviderLabel>;

    async fn update_label(&self, id: &str, name: &str) -> Result<ProviderLabel>;
}
