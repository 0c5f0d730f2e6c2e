//! `VectorIndex` implemented over a Qdrant-shaped HTTP collection API.
//! The vector index is a rebuildable cache keyed by message id — it carries
//! no data that the relational store doesn't already have a source of truth
//! for, so errors here are always `Transient`/`Internal`, never `Fatal`.

use async_trait::async_trait;
use ei_core::{
    ports::VectorIndex,
    types::{VectorNeighbor, VectorPoint},
    PipelineError, Result,
};
use serde::{Deserialize, Serialize};

pub struct QdrantVectorIndex {
    base_url: String,
    collection: String,
    client: reqwest::Client,
}

impl QdrantVectorIndex {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            collection: collection.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/collections/{}{path}",
            self.base_url.trim_end_matches('/'),
            self.collection,
        )
    }

    async fn error_from_response(resp: reqwest::Response) -> PipelineError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            PipelineError::Transient(format!("vector index HTTP {status}: {body}"))
        } else {
            PipelineError::Permanent(format!("vector index HTTP {status}: {body}"))
        }
    }
}

#[derive(Serialize)]
struct UpsertPointsRequest {
    points: Vec<PointStruct>,
}

#[derive(Serialize)]
struct PointStruct {
    id: String,
    vector: Vec<f32>,
    payload: PointPayload,
}

#[derive(Serialize)]
struct PointPayload {
    message_id: String,
    vector_version: String,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    score_threshold: f64,
    filter: SearchFilter,
    with_payload: bool,
}

#[derive(Serialize)]
struct SearchFilter {
    must: Vec<FieldCondition>,
}

#[derive(Serialize)]
struct FieldCondition {
    key: String,
    #[serde(rename = "match")]
    match_: FieldMatch,
}

#[derive(Serialize)]
struct FieldMatch {
    value: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f64,
    payload: ScoredPayload,
}

#[derive(Deserialize)]
struct ScoredPayload {
    message_id: String,
}

#[derive(Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<ScrollPoint>,
}

#[derive(Deserialize)]
struct ScrollPoint {
    id: serde_json::Value,
    payload: ScrollPayload,
}

#[derive(Deserialize)]
struct ScrollPayload {
    message_id: String,
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(&self, point: &VectorPoint) -> Result<()> {
        let body = UpsertPointsRequest {
            points: vec![PointStruct {
                id: point.id.to_string(),
                vector: point.vector.clone(),
                payload: PointPayload {
                    message_id: point.message_id.clone(),
                    vector_version: point.vector_version.clone(),
                },
            }],
        };

        let resp = self
            .client
            .put(self.url("/points?wait=true"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        Ok(())
    }

    async fn query_neighbors(
        &self,
        query: &[f32],
        domain: &str,
        vector_version: &str,
        k: usize,
        min_score: f64,
    ) -> Result<Vec<VectorNeighbor>> {
        let body = SearchRequest {
            vector: query.to_vec(),
            limit: k,
            score_threshold: min_score,
            filter: SearchFilter {
                must: vec![
                    FieldCondition {
                        key: "from_domain".into(),
                        match_: FieldMatch { value: domain.to_string() },
                    },
                    FieldCondition {
                        key: "vector_version".into(),
                        match_: FieldMatch { value: vector_version.to_string() },
                    },
                ],
            },
            with_payload: true,
        };

        let resp = self
            .client
            .post(self.url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;

        Ok(parsed
            .result
            .into_iter()
            .map(|p| VectorNeighbor {
                message_id: p.payload.message_id,
                score: p.score,
            })
            .collect())
    }

    async fn delete_missing(&self, known_message_ids: &[String]) -> Result<u64> {
        let resp = self
            .client
            .post(self.url("/points/scroll"))
            .json(&serde_json::json!({ "limit": 10_000, "with_payload": true }))
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let parsed: ScrollResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::ContractViolation(e.to_string()))?;

        let known: std::collections::HashSet<&str> =
            known_message_ids.iter().map(String::as_str).collect();
        let orphan_ids: Vec<serde_json::Value> = parsed
            .result
            .points
            .into_iter()
            .filter(|p| !known.contains(p.payload.message_id.as_str()))
            .map(|p| p.id)
            .collect();

        if orphan_ids.is_empty() {
            return Ok(0);
        }
        let count = orphan_ids.len() as u64;

        let resp = self
            .client
            .post(self.url("/points/delete?wait=true"))
            .json(&serde_json::json!({ "points": orphan_ids }))
            .send()
            .await
            .map_err(|e| PipelineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ei_core::types::VectorPoint;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn upsert_sends_point_with_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/emails/points"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"status": "acknowledged"},
                "status": "ok",
                "time": 0.0
            })))
            .mount(&server)
            .await;

        let index = QdrantVectorIndex::new(server.uri(), "emails");
        let point = VectorPoint {
            id: uuid::Uuid::new_v4(),
            message_id: "msg-1".into(),
            vector: vec![0.1, 0.2, 0.3],
            vector_version: "nomic-v1".into(),
        };
        index.upsert(&point).await.unwrap();
    }

    #[tokio::test]
    async fn query_neighbors_filters_by_domain_and_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/emails/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [
                    {"id": "a", "score": 0.92, "payload": {"message_id": "msg-1"}},
                    {"id": "b", "score": 0.81, "payload": {"message_id": "msg-2"}}
                ],
                "status": "ok",
                "time": 0.0
            })))
            .mount(&server)
            .await;

        let index = QdrantVectorIndex::new(server.uri(), "emails");
        let neighbors = index
            .query_neighbors(&[0.1, 0.2], "example.com", "nomic-v1", 5, 0.8)
            .await
            .unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].message_id, "msg-1");
    }

    #[tokio::test]
    async fn server_5xx_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/emails/points"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let index = QdrantVectorIndex::new(server.uri(), "emails");
        let point = VectorPoint {
            id: uuid::Uuid::new_v4(),
            message_id: "msg-1".into(),
            vector: vec![0.1],
            vector_version: "nomic-v1".into(),
        };
        let err = index.upsert(&point).await.unwrap_err();
        assert!(err.retryable());
    }
}
