//! Embedding provider abstraction and implementations.
//!
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]**: calls `POST {url}/v1/embeddings`.
//! - **[`OllamaEmbedder`]**: calls `POST {url}/api/embed` on a local Ollama instance.
//!
//! # Retry Strategy
//!
//! Both network providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::EmbeddingConfig;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    fn is_enabled(&self) -> bool {
        true
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Disabled Provider ============

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Shared retry loop ============

/// POST `body` to `url`, retrying transient failures with exponential backoff.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    label: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider = label, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

fn parse_vector(value: &Value, what: &str) -> Result<Vec<f32>> {
    Ok(value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", what))?
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Extract the first `data[].embedding` from an OpenAI response.
fn parse_openai_response(json: &Value) -> Result<Vec<f32>> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;
    let embedding = first
        .get("embedding")
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
    parse_vector(embedding, "OpenAI")
}

/// Extract the first `embeddings[]` entry from an Ollama response.
fn parse_ollama_response(json: &Value) -> Result<Vec<f32>> {
    let first = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;
    parse_vector(first, "Ollama")
}

fn check_dims(vector: Vec<f32>, expected: usize, model: &str) -> Result<Vec<f32>> {
    if vector.len() != expected {
        bail!(
            "model '{}' returned {} dimensions, expected {}",
            model,
            vector.len(),
            expected
        );
    }
    Ok(vector)
}

fn build_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn required_model(config: &EmbeddingConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", config.provider))
}

// ============ OpenAI Provider ============

pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let base = config.url.as_deref().unwrap_or("https://api.openai.com");
        Ok(Self {
            model: required_model(config)?,
            dims: config.dims,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key,
            max_retries: config.max_retries,
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = post_with_retry(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        check_dims(parse_openai_response(&json)?, self.dims, &self.model)
    }
}

// ============ Ollama Provider ============

pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    endpoint: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = config.url.as_deref().unwrap_or("http://localhost:11434");
        Ok(Self {
            model: required_model(config)?,
            dims: config.dims,
            endpoint: format!("{}/api/embed", base.trim_end_matches('/')),
            max_retries: config.max_retries,
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = post_with_retry(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        check_dims(parse_ollama_response(&json)?, self.dims, &self.model)
    }
}

/// Instantiate the configured provider.
///
/// The OpenAI provider reads its key from `embedding.api_key_env` and fails
/// here, at startup, if it is missing.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => {
            let key = std::env::var(&config.api_key_env)
                .map_err(|_| anyhow!("{} environment variable not set", config.api_key_env))?;
            Ok(Arc::new(OpenAIEmbedder::new(config, key)?))
        }
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_shape() {
        let json = serde_json::json!({"data": [{"embedding": [0.5, -1.0], "index": 0}]});
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.5, -1.0]);
        assert!(parse_openai_response(&serde_json::json!({"data": []})).is_err());
    }

    #[test]
    fn parses_ollama_shape() {
        let json = serde_json::json!({"embeddings": [[1.0, 2.0, 3.0]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(parse_ollama_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        assert!(check_dims(vec![1.0; 3], 4, "m").is_err());
        assert_eq!(check_dims(vec![1.0; 4], 4, "m").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn disabled_provider_refuses() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert!(!embedder.is_enabled());
        assert!(embedder.embed("x").await.is_err());
    }

    #[test]
    fn ollama_endpoint_uses_configured_url() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            model: Some("nomic-embed-text".into()),
            url: Some("http://127.0.0.1:9/".into()),
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        assert_eq!(embedder.endpoint, "http://127.0.0.1:9/api/embed");
    }
}
