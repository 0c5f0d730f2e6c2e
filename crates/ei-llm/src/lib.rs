//! Model RPCs (spec §6) against an Ollama-shaped HTTP server: embeddings and
//! plain-text generation. The pipeline depends on the `EmbeddingModel` and
//! `GenerationModel` traits, never on `reqwest` directly.

use async_trait::async_trait;
use ei_core::{PipelineError, Result};
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait GenerationModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct OllamaClient {
    base_url: String,
    embedding_model: String,
    generation_model: String,
    /// Expected output width of `embedding_model`. A mismatch is a fatal
    /// misconfiguration, not a transient failure — the vector index was
    /// built against a fixed dimension.
    embedding_dimension: usize,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        embedding_model: impl Into<String>,
        generation_model: impl Into<String>,
        embedding_dimension: usize,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            embedding_model: embedding_model.into(),
            generation_model: generation_model.into(),
            embedding_dimension,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn classify_transport_error(status: reqwest::StatusCode, body: String) -> PipelineError {
        if status.as_u16() == 429 || status.is_server_error() {
            PipelineError::Transient(format!("model HTTP {status}: {body}"))
        } else {
            PipelineError::Permanent(format!("model HTTP {status}: {body}"))
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl EmbeddingModel for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let primary = self
            .client
            .post(self.url("/api/embeddings"))
            .json(&EmbeddingsRequest { model: &self.embedding_model, prompt: text })
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        let vector = if primary.status().is_success() {
            let parsed: EmbeddingsResponse = primary
                .json()
                .await
                .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;
            parsed.embedding
        } else if primary.status() == reqwest::StatusCode::NOT_FOUND {
            // Older Ollama builds only expose /api/embed.
            let fallback = self
                .client
                .post(self.url("/api/embed"))
                .json(&EmbedRequest { model: &self.embedding_model, input: text })
                .send()
                .await
                .map_err(|e| PipelineError::Transient(e.to_string()))?;
            if !fallback.status().is_success() {
                let status = fallback.status();
                let body = fallback.text().await.unwrap_or_default();
                return Err(Self::classify_transport_error(status, body));
            }
            let parsed: EmbedResponse = fallback
                .json()
                .await
                .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;
            parsed
                .embeddings
                .into_iter()
                .next()
                .ok_or_else(|| PipelineError::ContractViolation("empty embeddings array".into()))?
        } else {
            let status = primary.status();
            let body = primary.text().await.unwrap_or_default();
            return Err(Self::classify_transport_error(status, body));
        };

        if vector.len() != self.embedding_dimension {
            return Err(PipelineError::Fatal(format!(
                "embedding dimension mismatch: got {}, expected {}",
                vector.len(),
                self.embedding_dimension
            )));
        }
        Ok(vector)
    }
}

#[async_trait]
impl GenerationModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/api/generate"))
            .json(&GenerateRequest { model: &self.generation_model, prompt, stream: false })
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_transport_error(status, body));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embed_uses_primary_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri(), "nomic-embed-text", "llama3", 3);
        let vector = client.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_falls_back_when_primary_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.4, 0.5]]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri(), "nomic-embed-text", "llama3", 2);
        let vector = client.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.4, 0.5]);
    }

    #[tokio::test]
    async fn embed_dimension_mismatch_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3]
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri(), "nomic-embed-text", "llama3", 768);
        let err = client.embed("hello").await.unwrap_err();
        assert!(!err.retryable());
        assert_eq!(err.http_status(), 500);
    }

    #[tokio::test]
    async fn generate_returns_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "Financial\nNone"
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new(server.uri(), "nomic-embed-text", "llama3", 3);
        let text = client.generate("classify this email").await.unwrap();
        assert_eq!(text, "Financial\nNone");
    }
}
