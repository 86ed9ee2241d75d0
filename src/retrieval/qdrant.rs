//! Qdrant-backed dense index over the REST API

use super::{Candidate, DenseIndex, RetrievalError};
use crate::document::DocumentFragment;
use crate::embedding::EmbeddingProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const BACKEND: &str = "qdrant";
const UPSERT_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

pub struct QdrantIndex {
    client: reqwest::Client,
    config: QdrantConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

#[derive(Serialize)]
struct Point {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct Payload {
    fragment_id: Option<String>,
}

impl QdrantIndex {
    /// Connect and make sure the collection exists with the provider's dimension
    pub async fn connect(
        config: QdrantConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RetrievalError::Index(format!("Failed to create HTTP client: {}", e)))?;

        let index = Self {
            client,
            config,
            provider,
        };
        index.ensure_collection().await?;
        Ok(index)
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/collections/{}",
            self.config.url.trim_end_matches('/'),
            self.config.collection
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        let response = self
            .request(reqwest::Method::GET, self.collection_url())
            .send()
            .await
            .map_err(send_error)?;

        if response.status().is_success() {
            tracing::debug!("Qdrant collection '{}' exists", self.config.collection);
            return Ok(());
        }
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(status_error(response).await);
        }

        tracing::info!(
            "Creating Qdrant collection '{}' ({} dims)",
            self.config.collection,
            self.provider.dimension()
        );
        let response = self
            .request(reqwest::Method::PUT, self.collection_url())
            .json(&json!({
                "vectors": { "size": self.provider.dimension(), "distance": "Cosine" }
            }))
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    /// Embed and upsert fragments; re-upserting the same fragment overwrites it
    pub async fn upsert<'a, I>(&self, fragments: I) -> Result<usize, RetrievalError>
    where
        I: IntoIterator<Item = &'a DocumentFragment>,
    {
        let fragments: Vec<&DocumentFragment> = fragments.into_iter().collect();
        let mut written = 0;

        for batch in fragments.chunks(UPSERT_BATCH) {
            let texts: Vec<String> = batch.iter().map(|f| f.index_text().to_string()).collect();
            let vectors = self.provider.embed_batch(&texts).await?;

            let points: Vec<Point> = batch
                .iter()
                .zip(vectors)
                .map(|(fragment, vector)| Point {
                    id: point_id(&fragment.id),
                    vector,
                    payload: json!({
                        "fragment_id": fragment.id,
                        "document_id": fragment.document_id,
                    }),
                })
                .collect();

            let response = self
                .request(
                    reqwest::Method::PUT,
                    format!("{}/points?wait=true", self.collection_url()),
                )
                .json(&json!({ "points": points }))
                .send()
                .await
                .map_err(send_error)?;

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }
            written += batch.len();
        }

        tracing::debug!(points = written, "Upserted fragments into Qdrant");
        Ok(written)
    }
}

#[async_trait]
impl DenseIndex for QdrantIndex {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<Candidate>, RetrievalError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed(text).await?;

        let response = self
            .request(
                reqwest::Method::POST,
                format!("{}/points/search", self.collection_url()),
            )
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Index(format!("Invalid Qdrant response: {}", e)))?;

        Ok(body
            .result
            .into_iter()
            .filter_map(|point| {
                let fragment_id = point.payload.and_then(|p| p.fragment_id);
                if fragment_id.is_none() {
                    tracing::warn!("Qdrant point without fragment_id payload, skipping");
                }
                fragment_id.map(|id| Candidate::new(id, point.score))
            })
            .collect())
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

/// Stable point id: a UUID built from the BLAKE3 hash of the fragment id
pub(crate) fn point_id(fragment_id: &str) -> String {
    let hash = blake3::hash(fragment_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash.as_bytes()[..16]);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

fn send_error(e: reqwest::Error) -> RetrievalError {
    if e.is_timeout() || e.is_connect() {
        RetrievalError::unavailable(BACKEND, e.to_string())
    } else {
        RetrievalError::Index(format!("Qdrant request failed: {}", e))
    }
}

async fn status_error(response: reqwest::Response) -> RetrievalError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status, body);

    if status.as_u16() == 429 || status.is_server_error() {
        RetrievalError::unavailable(BACKEND, message)
    } else {
        RetrievalError::Index(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = point_id("report#0");
        let b = point_id("report#0");
        let c = point_id("report#1");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let provider = Arc::new(HashingEmbedder::new(8).unwrap());
        let result = QdrantIndex::connect(
            QdrantConfig {
                url: "http://127.0.0.1:9".to_string(),
                collection: "test".to_string(),
                api_key: None,
                timeout: Duration::from_secs(2),
            },
            provider,
        )
        .await;

        match result {
            Err(e) => assert_eq!(e.kind(), crate::error::ErrorKind::RetrievalUnavailable),
            Ok(_) => panic!("expected connection failure"),
        }
    }
}
