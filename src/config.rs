//! Configuration parsing and validation.
//!
//! ThoughtSynth is configured via a TOML file (default: `config/synth.toml`).
//! Only `[db]` and `[server]` are required; every other section falls back
//! to defaults that run the service with no external providers.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/synth.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:5000"
//!
//! [auth.tokens.dev-token]
//! user_id = "u1"
//! name = "Ada"
//!
//! [llm]
//! provider = "anthropic"      # "anthropic" or "disabled"
//!
//! [embedding]
//! provider = "openai"         # "disabled", "openai", or "ollama"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [vector_index]
//! provider = "local"          # "disabled", "local", or "pinecone"
//! ```
//!
//! Credentials are never stored in the file; the `api_key_env` keys name the
//! environment variables they are read from.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Bearer tokens accepted by the HTTP API, keyed by token value.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: HashMap<String, TokenPrincipal>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenPrincipal {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_anthropic_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens_analysis")]
    pub max_tokens_analysis: u32,
    #[serde(default = "default_max_tokens_chat")]
    pub max_tokens_chat: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key_env: default_anthropic_key_env(),
            base_url: default_anthropic_url(),
            max_tokens_analysis: default_max_tokens_analysis(),
            max_tokens_chat: default_max_tokens_chat(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_anthropic_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_max_tokens_analysis() -> u32 {
    2000
}
fn default_max_tokens_chat() -> u32 {
    1000
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL override. Defaults to the provider's public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: default_dims(),
            url: None,
            api_key_env: default_openai_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    /// Pinecone index host, e.g. `https://my-index-abc123.svc.us-east-1.pinecone.io`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on vectors located per content item when deleting.
    #[serde(default = "default_delete_scan_limit")]
    pub delete_scan_limit: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            host: None,
            api_key_env: default_pinecone_key_env(),
            namespace: None,
            timeout_secs: default_timeout_secs(),
            delete_scan_limit: default_delete_scan_limit(),
        }
    }
}

fn default_pinecone_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}
fn default_delete_scan_limit() -> usize {
    100
}

impl VectorIndexConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_body_chars: default_max_body_chars(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_body_chars() -> usize {
    5000
}
fn default_user_agent() -> String {
    concat!("Mozilla/5.0 (compatible; ThoughtSynth/", env!("CARGO_PKG_VERSION"), ")").to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    #[serde(default = "default_list_limit")]
    pub default_list_limit: i64,
    #[serde(default = "default_semantic_limit")]
    pub semantic_default_limit: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            default_list_limit: default_list_limit(),
            semantic_default_limit: default_semantic_limit(),
        }
    }
}

fn default_list_limit() -> i64 {
    50
}
fn default_semantic_limit() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.extract.max_body_chars == 0 {
        anyhow::bail!("extract.max_body_chars must be > 0");
    }

    if config.content.default_list_limit < 1 {
        anyhow::bail!("content.default_list_limit must be >= 1");
    }

    match config.llm.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate vector index
    match config.vector_index.provider.as_str() {
        "disabled" | "local" => {}
        "pinecone" => {
            if config.vector_index.host.is_none() {
                anyhow::bail!("vector_index.host must be specified when provider is 'pinecone'");
            }
        }
        other => anyhow::bail!(
            "Unknown vector_index provider: '{}'. Must be disabled, local, or pinecone.",
            other
        ),
    }
    if config.vector_index.is_enabled() && !config.embedding.is_enabled() {
        anyhow::bail!(
            "vector_index provider '{}' requires an enabled embedding provider",
            config.vector_index.provider
        );
    }

    Ok(config)
}
