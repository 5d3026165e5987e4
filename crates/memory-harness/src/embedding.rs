//! Embedding providers: OpenAI and Ollama.
//!
//! Both implement [`Embedder`] over `reqwest` with a per-request timeout.
//!
//! # Retry Strategy
//!
//! Indexing uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Query-time embedders are built with zero retries so a slow provider
//! cannot stall a search beyond its timeout.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use memory_harness_core::embedding::{check_batch, Embedder};
use memory_harness_core::error::BackendError;

use crate::config::EmbeddingConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Which wire format a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wire {
    OpenAi,
    Ollama,
}

/// HTTP embedding client shared by both providers.
struct HttpEmbedder {
    wire: Wire,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    max_retries: u32,
    timeout: Duration,
}

impl HttpEmbedder {
    fn build_client(timeout: Duration) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().timeout(timeout).build()?)
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": texts,
        })
    }

    async fn send_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Attempt> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&self.request_body(texts));
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(Attempt::Retry(BackendError::Timeout(
                    self.timeout.as_millis() as u64,
                )))
            }
            Err(e) => return Err(Attempt::Retry(BackendError::Unavailable(e.to_string()))),
        };

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| Attempt::Fatal(BackendError::Malformed(e.to_string())))?;
            let parsed = match self.wire {
                Wire::OpenAi => parse_openai_response(&json),
                Wire::Ollama => parse_ollama_response(&json),
            }
            .map_err(Attempt::Fatal)?;
            return Ok(parsed);
        }

        let body_text = response.text().await.unwrap_or_default();
        let err = BackendError::Unavailable(format!("embedding API error {}: {}", status, body_text));
        // Rate limited or server error: retry
        if status.as_u16() == 429 || status.is_server_error() {
            Err(Attempt::Retry(err))
        } else {
            Err(Attempt::Fatal(BackendError::Query(format!(
                "embedding API error {}: {}",
                status, body_text
            ))))
        }
    }
}

enum Attempt {
    Retry(BackendError),
    Fatal(BackendError),
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            match self.send_once(texts).await {
                Ok(vectors) => {
                    check_batch(&vectors, texts.len(), self.dims)?;
                    return Ok(vectors);
                }
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry(e)) => {
                    tracing::debug!(error = %e, "embedding request failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            BackendError::Unavailable("embedding failed after retries".to_string())
        }))
    }
}

/// Parse an OpenAI `/v1/embeddings` response, ordering vectors by the
/// `index` field of each item.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, BackendError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| BackendError::Malformed("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| BackendError::Malformed("missing embedding".to_string()))?;
        indexed.push((index, to_f32_vec(embedding)?));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Parse an Ollama `/api/embed` response.
fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, BackendError> {
    let data = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| BackendError::Malformed("missing embeddings array".to_string()))?;

    data.iter()
        .map(|item| {
            let values = item
                .as_array()
                .ok_or_else(|| BackendError::Malformed("embedding is not an array".to_string()))?;
            to_f32_vec(values)
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Result<Vec<f32>, BackendError> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| BackendError::Malformed("non-numeric embedding value".to_string()))
        })
        .collect()
}

/// OpenAI embeddings (`POST /v1/embeddings`). Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder(HttpEmbedder);

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, max_retries: u32) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(k) if !k.trim().is_empty() => k,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };
        let (model, dims) = model_and_dims(config)?;
        let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        let timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self(HttpEmbedder {
            wire: Wire::OpenAi,
            client: HttpEmbedder::build_client(timeout)?,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key: Some(api_key),
            model,
            dims,
            max_retries,
            timeout,
        }))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        self.0.model_name()
    }
    fn dims(&self) -> usize {
        self.0.dims()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        self.0.embed_batch(texts).await
    }
}

/// Ollama embeddings (`POST /api/embed`).
pub struct OllamaEmbedder(HttpEmbedder);

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig, max_retries: u32) -> Result<Self> {
        let (model, dims) = model_and_dims(config)?;
        let base = config.base_url.as_deref().unwrap_or(OLLAMA_BASE_URL);
        let timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self(HttpEmbedder {
            wire: Wire::Ollama,
            client: HttpEmbedder::build_client(timeout)?,
            endpoint: format!("{}/api/embed", base.trim_end_matches('/')),
            api_key: None,
            model,
            dims,
            max_retries,
            timeout,
        }))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        self.0.model_name()
    }
    fn dims(&self) -> usize {
        self.0.dims()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        self.0.embed_batch(texts).await
    }
}

fn model_and_dims(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let model = config
        .resolved_model()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;
    let dims = config
        .resolved_dims()
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required"))?;
    Ok((model, dims))
}

/// How an embedder will be used; decides the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPurpose {
    /// Batch indexing: retry up to `embedding.max_retries`.
    Indexing,
    /// Interactive query: single attempt.
    Query,
}

/// Create the configured embedder.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | none (`Ok(None)`) |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider cannot
/// be initialized (missing config or API key).
pub fn create_embedder(
    config: &EmbeddingConfig,
    purpose: EmbedPurpose,
) -> Result<Option<Arc<dyn Embedder>>> {
    let retries = match purpose {
        EmbedPurpose::Indexing => config.max_retries,
        EmbedPurpose::Query => 0,
    };
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAiEmbedder::new(config, retries)?))),
        "ollama" => Ok(Some(Arc::new(OllamaEmbedder::new(config, retries)?))),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
