//! Query/answer composition.
//!
//! Embeds a query, retrieves the nearest chunks from the store, and composes
//! a grounded answer with source attribution. Generation is only invoked
//! when there is retrieved context to ground it in; an empty result set
//! short-circuits to a fixed response.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CompletionConfig, QueryConfig};
use crate::embedding::{embed_query, send_provider_request, Embedder};
use crate::error::EngineError;
use crate::models::{QueryAnswer, QueryMatch, VectorMatch};
use crate::retry::RetryPolicy;
use crate::store::VectorStore;

/// Fixed response returned when retrieval finds nothing.
pub const NO_MATCH_RESPONSE: &str = "No relevant information found in the indexed documents.";

/// Trait for answer-generation providers.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an answer from a grounded prompt.
    async fn generate(&self, prompt: &str) -> Result<String, EngineError>;
}

/// A no-op generator that always returns errors.
///
/// Used when `completion.provider = "disabled"` in the configuration.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, EngineError> {
        Err(EngineError::Provider(
            "completion provider is disabled; set [completion] provider in config".to_string(),
        ))
    }
}

/// Answer generator using the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set. Uses the
/// same retry classification as the embedding client.
pub struct OpenAiGenerator {
    model: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiGenerator {
    pub fn new(config: &CompletionConfig) -> Result<Self, EngineError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EngineError::Provider("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Provider(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
            retry: RetryPolicy::from_attempts(config.max_retries),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content":
                    "You answer questions using only the provided context. \
                     If the context does not contain the answer, say so."},
                {"role": "user", "content": prompt},
            ],
        });

        let json = self
            .retry
            .run("openai completions", || {
                let request = self
                    .client
                    .post("https://api.openai.com/v1/chat/completions")
                    .bearer_auth(&self.api_key)
                    .json(&body);
                async move { send_provider_request(request).await }
            })
            .await?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| EngineError::Provider("invalid completion response".to_string()))
    }
}

/// Create the appropriate [`Generator`] based on configuration.
pub fn create_generator(config: &CompletionConfig) -> Result<Arc<dyn Generator>, EngineError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => Err(EngineError::InvalidInput(format!(
            "unknown completion provider: {}",
            other
        ))),
    }
}

/// Answer `query` against the store: embed, retrieve `top_k`, generate.
pub async fn compose(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    generator: &dyn Generator,
    config: &QueryConfig,
    query: &str,
    top_k: usize,
) -> Result<QueryAnswer, EngineError> {
    if query.trim().is_empty() {
        return Err(EngineError::InvalidInput("query must not be empty".to_string()));
    }
    let query_len = query.chars().count();
    if query_len > config.max_query_len {
        return Err(EngineError::InvalidInput(format!(
            "query too long: {} chars (max {})",
            query_len, config.max_query_len
        )));
    }

    let query_vec = embed_query(embedder, query).await?;
    let matches = store.query(&query_vec, top_k).await?;

    if matches.is_empty() {
        return Ok(QueryAnswer {
            matches: Vec::new(),
            response_text: NO_MATCH_RESPONSE.to_string(),
        });
    }

    let completion = generator.generate(&build_prompt(query, &matches)).await?;
    let sources = dedup_sources(&matches);
    let response_text = format!("{}\n\nSources: {}", completion.trim(), sources.join(", "));

    Ok(QueryAnswer {
        matches: matches
            .into_iter()
            .map(|m| QueryMatch {
                chunk_text: m.metadata.chunk_text,
                source_path: m.metadata.source_path,
                score: m.score,
            })
            .collect(),
        response_text,
    })
}

fn build_prompt(query: &str, matches: &[VectorMatch]) -> String {
    let mut prompt = String::from("Context:\n");
    for m in matches {
        prompt.push_str("- ");
        prompt.push_str(&m.metadata.chunk_text);
        prompt.push('\n');
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(query);
    prompt
}

/// Deduplicate source paths, preserving retrieval order.
fn dedup_sources(matches: &[VectorMatch]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    matches
        .iter()
        .filter(|m| !m.metadata.source_path.is_empty())
        .filter(|m| seen.insert(m.metadata.source_path.clone()))
        .map(|m| m.metadata.source_path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VectorMetadata;

    fn mk_match(source: &str, text: &str, score: f32) -> VectorMatch {
        VectorMatch {
            id: format!("{source}_{score}"),
            score,
            metadata: VectorMetadata {
                source_path: source.to_string(),
                chunk_text: text.to_string(),
                sequence_index: 0,
            },
        }
    }

    #[test]
    fn test_dedup_sources_preserves_order() {
        let matches = vec![
            mk_match("b.txt", "one", 0.9),
            mk_match("a.txt", "two", 0.8),
            mk_match("b.txt", "three", 0.7),
        ];
        assert_eq!(dedup_sources(&matches), vec!["b.txt", "a.txt"]);
    }

    #[test]
    fn test_build_prompt_includes_context_and_question() {
        let matches = vec![mk_match("a.txt", "Hello.", 1.0)];
        let prompt = build_prompt("What?", &matches);
        assert!(prompt.contains("- Hello.\n"));
        assert!(prompt.ends_with("Question: What?"));
    }

    #[tokio::test]
    async fn test_disabled_generator_errors() {
        let err = DisabledGenerator.generate("prompt").await.unwrap_err();
        assert!(matches!(err, EngineError::Provider(_)));
    }
}
