//! In-process mock provider. Used by pipeline integration tests in place of
//! a live Gmail account; `ei-server`/`ei-cli` never construct one outside
//! their own test modules.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ei_core::{PipelineError, Result};

use crate::{ListMessagesPage, Provider, ProviderLabel, ProviderMessageFull, ProviderMessageMetadata};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub id: String,
    pub thread_id: String,
    pub internal_date: DateTime<Utc>,
    pub label_ids: Vec<String>,
    pub headers: HashMap<String, String>,
    pub body_text: String,
}

struct State {
    messages: Vec<MockMessage>,
    labels: Vec<ProviderLabel>,
    trashed: Vec<String>,
    next_label_id: u64,
}

/// Deterministic, in-memory stand-in for the Gmail REST API. `page_size` is
/// honored so pagination logic in the ingestor can be exercised.
pub struct MockProvider {
    state: Mutex<State>,
}

impl MockProvider {
    pub fn new(messages: Vec<MockMessage>, labels: Vec<ProviderLabel>) -> Self {
        Self {
            state: Mutex::new(State {
                messages,
                labels,
                trashed: Vec::new(),
                next_label_id: 1,
            }),
        }
    }

    pub fn trashed_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().trashed.clone()
    }

    pub fn label_ids_of(&self, message_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.label_ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn list_messages(
        &self,
        _query: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<ListMessagesPage> {
        let state = self.state.lock().unwrap();
        let start: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + page_size as usize).min(state.messages.len());
        let message_ids = state.messages[start.min(state.messages.len())..end]
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let next_page_token = if end < state.messages.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(ListMessagesPage { message_ids, next_page_token })
    }

    async fn get_message_metadata(
        &self,
        id: &str,
        headers: &[&str],
    ) -> Result<ProviderMessageMetadata> {
        let state = self.state.lock().unwrap();
        let msg = state
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| PipelineError::NotFound(format!("message {id}")))?;
        let wanted: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
        let filtered = msg
            .headers
            .iter()
            .filter(|(k, _)| wanted.is_empty() || wanted.contains(&k.to_lowercase()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(ProviderMessageMetadata {
            id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
            internal_date: msg.internal_date,
            label_ids: msg.label_ids.clone(),
            headers: filtered,
        })
    }

    async fn get_message_full(&self, id: &str) -> Result<ProviderMessageFull> {
        let state = self.state.lock().unwrap();
        let msg = state
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| PipelineError::NotFound(format!("message {id}")))?;
        Ok(ProviderMessageFull {
            id: msg.id.clone(),
            thread_id: msg.thread_id.clone(),
            internal_date: msg.internal_date,
            label_ids: msg.label_ids.clone(),
            headers: msg.headers.clone(),
            body_text: msg.body_text.clone(),
        })
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let msg = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| PipelineError::NotFound(format!("message {id}")))?;
        msg.label_ids.retain(|l| !remove.contains(l));
        for label in add {
            if !msg.label_ids.contains(label) {
                msg.label_ids.push(label.clone());
            }
        }
        Ok(())
    }

    async fn trash(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.messages.iter().any(|m| m.id == id) {
            return Err(PipelineError::NotFound(format!("message {id}")));
        }
        state.trashed.push(id.to_string());
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<ProviderLabel>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<ProviderLabel> {
        let mut state = self.state.lock().unwrap();
        let id = format!("Label_{}", state.next_label_id);
        state.next_label_id += 1;
        let label = ProviderLabel { id, name: name.to_string() };
        state.labels.push(label.clone());
        Ok(label)
    }

    async fn update_label(&self, id: &str, name: &str) -> Result<ProviderLabel> {
        let mut state = self.state.lock().unwrap();
        let label = state
            .labels
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| PipelineError::NotFound(format!("label {id}")))?;
        label.name = name.to_string();
        Ok(label.clone())
    }
}
