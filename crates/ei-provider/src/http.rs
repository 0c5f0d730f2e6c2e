//! HttpProvider — calls the Gmail REST API with an OAuth bearer token.
//! Error bodies are mapped to `PipelineError` based on HTTP status, since
//! the outbox/retry layer branches on `retryable()`.

use async_trait::async_trait;
use ei_core::{PipelineError, Result};
use serde::Deserialize;
use std::collections::HashMap;

use crate::{ListMessagesPage, Provider, ProviderLabel, ProviderMessageFull, ProviderMessageMetadata};

pub struct HttpProvider {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn error_from_response(resp: reqwest::Response) -> PipelineError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            PipelineError::Transient(format!("provider HTTP {status}: {body}"))
        } else {
            PipelineError::Permanent(format!("provider HTTP {status}: {body}"))
        }
    }
}

#[derive(Deserialize)]
struct ListMessagesWire {
    messages: Option<Vec<MessageIdWire>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct MessageIdWire {
    id: String,
}

#[derive(Deserialize)]
struct MessageWire {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: String,
    #[serde(rename = "internalDate")]
    internal_date: String,
    #[serde(rename = "labelIds", default)]
    label_ids: Vec<String>,
    payload: MessagePayloadWire,
}

#[derive(Deserialize)]
struct MessagePayloadWire {
    headers: Vec<HeaderWire>,
    body: Option<BodyWire>,
    #[serde(default)]
    parts: Vec<PartWire>,
}

#[derive(Deserialize)]
struct PartWire {
    #[serde(rename = "mimeType")]
    mime_type: String,
    body: Option<BodyWire>,
}

#[derive(Deserialize)]
struct BodyWire {
    data: Option<String>,
}

#[derive(Deserialize)]
struct HeaderWire {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct LabelWire {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ListLabelsWire {
    labels: Vec<LabelWire>,
}

fn decode_internal_date(ms: &str) -> chrono::DateTime<chrono::Utc> {
    let millis: i64 = ms.parse().unwrap_or(0);
    chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
}

fn headers_map(headers: Vec<HeaderWire>, wanted: &[&str]) -> HashMap<String, String> {
    let wanted_lower: Vec<String> = wanted.iter().map(|h| h.to_lowercase()).collect();
    headers
        .into_iter()
        .filter(|h| wanted_lower.is_empty() || wanted_lower.contains(&h.name.to_lowercase()))
        .map(|h| (h.name, h.value))
        .collect()
}

fn decode_body_text(payload: &MessagePayloadWire) -> String {
    use base64::Engine;
    if let Some(body) = &payload.body {
        if let Some(data) = &body.data {
            if let Ok(bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data) {
                return String::from_utf8_lossy(&bytes).into_owned();
            }
        }
    }
    for part in &payload.parts {
        if part.mime_type == "text/plain" {
            if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
                if let Ok(bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data) {
                    return String::from_utf8_lossy(&bytes).into_owned();
                }
            }
        }
    }
    String::new()
}

#[async_trait]
impl Provider for HttpProvider {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<ListMessagesPage> {
        let mut req = self
            .client
            .get(self.url("/users/me/messages"))
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("maxResults", &page_size.to_string())]);
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let wire: ListMessagesWire = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;

        Ok(ListMessagesPage {
            message_ids: wire.messages.unwrap_or_default().into_iter().map(|m| m.id).collect(),
            next_page_token: wire.next_page_token,
        })
    }

    async fn get_message_metadata(
        &self,
        id: &str,
        headers: &[&str],
    ) -> Result<ProviderMessageMetadata> {
        let mut req = self
            .client
            .get(self.url(&format!("/users/me/messages/{id}")))
            .bearer_auth(&self.access_token)
            .query(&[("format", "metadata")]);
        for h in headers {
            req = req.query(&[("metadataHeaders", *h)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let wire: MessageWire = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;

        Ok(ProviderMessageMetadata {
            id: wire.id,
            thread_id: wire.thread_id,
            internal_date: decode_internal_date(&wire.internal_date),
            label_ids: wire.label_ids,
            headers: headers_map(wire.payload.headers, headers),
        })
    }

    async fn get_message_full(&self, id: &str) -> Result<ProviderMessageFull> {
        let resp = self
            .client
            .get(self.url(&format!("/users/me/messages/{id}")))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let wire: MessageWire = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;

        let body_text = decode_body_text(&wire.payload);
        Ok(ProviderMessageFull {
            id: wire.id,
            thread_id: wire.thread_id,
            internal_date: decode_internal_date(&wire.internal_date),
            label_ids: wire.label_ids,
            headers: headers_map(wire.payload.headers, &[]),
            body_text,
        })
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/users/me/messages/{id}/modify")))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "addLabelIds": add, "removeLabelIds": remove }))
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        Ok(())
    }

    async fn trash(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/users/me/messages/{id}/trash")))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<ProviderLabel>> {
        let resp = self
            .client
            .get(self.url("/users/me/labels"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let wire: ListLabelsWire = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;

        Ok(wire
            .labels
            .into_iter()
            .map(|l| ProviderLabel { id: l.id, name: l.name })
            .collect())
    }

    async fn create_label(&self, name: &str) -> Result<ProviderLabel> {
        let resp = self
            .client
            .post(self.url("/users/me/labels"))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let wire: LabelWire = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;
        Ok(ProviderLabel { id: wire.id, name: wire.name })
    }

    async fn update_label(&self, id: &str, name: &str) -> Result<ProviderLabel> {
        let resp = self
            .client
            .put(self.url(&format!("/users/me/labels/{id}")))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let wire: LabelWire = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;
        Ok(ProviderLabel { id: wire.id, name: wire.name })
    }
}
