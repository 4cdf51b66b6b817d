//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers the four operations the sync and query
//! paths need (`upsert`, `delete`, `query`, `stats`), enabling pluggable
//! backends:
//!
//! - **[`MemoryStore`]** — brute-force cosine similarity over an in-process
//!   `Vec`; used by tests and usable offline (non-durable).
//! - **[`RemoteStore`]** — a Pinecone-compatible REST data plane, with the
//!   shared retry policy wrapped around every call.
//!
//! Deletes are idempotent in both backends: deleting an id that is not
//! present is not an error. The reconciliation logic relies on this.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use crate::config::IndexConfig;
use crate::embedding::cosine_similarity;
use crate::error::EngineError;
use crate::models::{IndexStats, VectorMatch, VectorMetadata, VectorRecord};
use crate::retry::{RetryError, RetryPolicy};

/// Abstract vector index backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite vectors by id.
    async fn upsert(&self, vectors: &[VectorRecord]) -> Result<(), EngineError>;

    /// Delete vectors by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<(), EngineError>;

    /// Return the `top_k` nearest vectors, score descending. Ties keep
    /// insertion order.
    async fn query(&self, embedding: &[f32], top_k: usize)
        -> Result<Vec<VectorMatch>, EngineError>;

    /// Index-wide statistics.
    async fn stats(&self) -> Result<IndexStats, EngineError>;
}

/// Create the appropriate [`VectorStore`] based on configuration.
pub fn create_store(config: &IndexConfig) -> Result<Arc<dyn VectorStore>, EngineError> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "remote" => Ok(Arc::new(RemoteStore::new(config)?)),
        other => Err(EngineError::InvalidInput(format!(
            "unknown index provider: {}",
            other
        ))),
    }
}

// ============ In-memory store ============

/// In-memory store for tests and offline use.
///
/// Vectors live in insertion order so that equal-score query results are
/// stable. Upserting an existing id replaces it in place, keeping its
/// original position.
pub struct MemoryStore {
    vectors: RwLock<Vec<VectorRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, vectors: &[VectorRecord]) -> Result<(), EngineError> {
        let mut stored = self.vectors.write().unwrap();
        for record in vectors {
            match stored.iter_mut().find(|v| v.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), EngineError> {
        let mut stored = self.vectors.write().unwrap();
        stored.retain(|v| !ids.contains(&v.id));
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, EngineError> {
        let stored = self.vectors.read().unwrap();
        let mut matches: Vec<VectorMatch> = stored
            .iter()
            .map(|v| VectorMatch {
                id: v.id.clone(),
                score: cosine_similarity(embedding, &v.values),
                metadata: v.metadata.clone(),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn stats(&self) -> Result<IndexStats, EngineError> {
        let stored = self.vectors.read().unwrap();
        Ok(IndexStats {
            total_vectors: stored.len() as u64,
            dimension: stored.first().map(|v| v.values.len()).unwrap_or(0),
        })
    }
}

// ============ Remote store ============

/// Maximum vectors per upsert request, matching the remote data plane's
/// request-size limits.
const UPSERT_BATCH: usize = 100;

/// Pinecone-compatible REST data plane client.
///
/// Talks to `index.base_url` with the API key read from the environment
/// variable named by `index.api_key_env`. Endpoints:
///
/// | Method | Path | Operation |
/// |--------|------|-----------|
/// | `POST` | `/vectors/upsert` | [`VectorStore::upsert`] |
/// | `POST` | `/vectors/delete` | [`VectorStore::delete`] |
/// | `POST` | `/query` | [`VectorStore::query`] |
/// | `POST` | `/describe_index_stats` | [`VectorStore::stats`] |
pub struct RemoteStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl RemoteStore {
    pub fn new(config: &IndexConfig) -> Result<Self, EngineError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| {
                EngineError::InvalidInput(
                    "index.base_url required for remote provider".to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::Store(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Store(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key,
            client,
            retry: RetryPolicy::from_attempts(config.max_retries),
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        self.retry
            .run(path, || {
                let request = self
                    .client
                    .post(&url)
                    .header("Api-Key", &self.api_key)
                    .json(&body);
                async move { send_store_request(request).await }
            })
            .await
    }
}

/// Send one store request and classify the outcome for the retry policy.
async fn send_store_request(
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, RetryError> {
    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return Err(RetryError::Transient(EngineError::Store(e.to_string()))),
    };

    let status = response.status();
    if status.is_success() {
        // Delete/upsert responses may have an empty body
        let text = response
            .text()
            .await
            .map_err(|e| RetryError::Permanent(EngineError::Store(e.to_string())))?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        return serde_json::from_str(&text)
            .map_err(|e| RetryError::Permanent(EngineError::Store(e.to_string())));
    }

    let body_text = response.text().await.unwrap_or_default();
    let err = EngineError::Store(format!("store error {}: {}", status, body_text));
    if status.as_u16() == 429 || status.is_server_error() {
        Err(RetryError::Transient(err))
    } else {
        Err(RetryError::Permanent(err))
    }
}

#[async_trait]
impl VectorStore for RemoteStore {
    async fn upsert(&self, vectors: &[VectorRecord]) -> Result<(), EngineError> {
        for batch in vectors.chunks(UPSERT_BATCH) {
            let body = serde_json::json!({ "vectors": batch });
            self.post_json("/vectors/upsert", body).await?;
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), EngineError> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({ "ids": ids });
        self.post_json("/vectors/delete", body).await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, EngineError> {
        let body = serde_json::json!({
            "vector": embedding,
            "topK": top_k,
            "includeMetadata": true,
        });
        let json = self.post_json("/query", body).await?;
        parse_query_response(&json)
    }

    async fn stats(&self) -> Result<IndexStats, EngineError> {
        let json = self
            .post_json("/describe_index_stats", serde_json::json!({}))
            .await?;
        Ok(IndexStats {
            total_vectors: json
                .get("totalVectorCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            dimension: json.get("dimension").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        })
    }
}

fn parse_query_response(json: &serde_json::Value) -> Result<Vec<VectorMatch>, EngineError> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| EngineError::Store("invalid response: missing matches".to_string()))?;

    let mut out = Vec::with_capacity(matches.len());
    for entry in matches {
        let id = entry
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::Store("invalid response: match without id".to_string()))?
            .to_string();
        let score = entry.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        let metadata = entry
            .get("metadata")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let metadata: VectorMetadata = serde_json::from_value(metadata).unwrap_or(VectorMetadata {
            source_path: String::new(),
            chunk_text: String::new(),
            sequence_index: 0,
        });
        out.push(VectorMatch {
            id,
            score,
            metadata,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: VectorMetadata {
                source_path: "a.txt".to_string(),
                chunk_text: format!("text for {id}"),
                sequence_index: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id_without_duplicates() {
        let store = MemoryStore::new();
        store.upsert(&[record("a_txt_0", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[record("a_txt_0", vec![0.0, 1.0])]).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 1);

        let matches = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(matches[0].id, "a_txt_0");
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .upsert(&[record("a_txt_0", vec![1.0, 0.0]), record("a_txt_1", vec![0.0, 1.0])])
            .await
            .unwrap();

        let ids = vec!["a_txt_0".to_string(), "missing".to_string()];
        store.delete(&ids).await.unwrap();
        store.delete(&ids).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 1);
    }

    #[tokio::test]
    async fn test_query_orders_by_score_with_stable_ties() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                record("far", vec![0.0, 1.0]),
                record("tie_first", vec![2.0, 0.0]),
                record("tie_second", vec![3.0, 0.0]),
            ])
            .await
            .unwrap();

        let matches = store.query(&[1.0, 0.0], 3).await.unwrap();
        // Both ties score 1.0; insertion order decides
        assert_eq!(matches[0].id, "tie_first");
        assert_eq!(matches[1].id, "tie_second");
        assert_eq!(matches[2].id, "far");
    }

    #[tokio::test]
    async fn test_stats_reports_count_and_dimension() {
        let store = MemoryStore::new();
        assert_eq!(store.stats().await.unwrap().total_vectors, 0);

        store.upsert(&[record("a_txt_0", vec![1.0, 2.0, 3.0])]).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 1);
        assert_eq!(stats.dimension, 3);
    }

    #[test]
    fn test_parse_query_response() {
        let json = serde_json::json!({
            "matches": [
                {"id": "a_txt_0", "score": 0.93, "metadata": {
                    "source_path": "a.txt", "chunk_text": "Hello.", "sequence_index": 0}},
                {"id": "a_txt_1", "score": 0.81, "metadata": {
                    "source_path": "a.txt", "chunk_text": "World.", "sequence_index": 1}},
            ]
        });
        let matches = parse_query_response(&json).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a_txt_0");
        assert_eq!(matches[0].metadata.chunk_text, "Hello.");
        assert!((matches[1].score - 0.81).abs() < 1e-6);
    }
}
