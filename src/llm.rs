//! Minimal Anthropic Messages API client.
//!
//! Sends a single user turn and returns the concatenated text blocks of the
//! reply. Only the fields ThoughtSynth needs are modelled.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

pub struct AnthropicClient {
    model: String,
    api_key: String,
    endpoint: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            http_client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Send `prompt` as a single user message and return the reply text.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Anthropic API error {}: {}", status, body_text);
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        Ok(parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_messages_format() {
        let body = MessagesRequest {
            model: "claude-3-5-sonnet-20241022",
            max_tokens: 2000,
            messages: vec![RequestMessage {
                role: "user",
                content: "Analyze this",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(json["max_tokens"], 2000);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Analyze this");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9999/".into(),
            ..Default::default()
        };
        let client = AnthropicClient::new(&config, "k".into()).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:9999/v1/messages");
    }

    #[test]
    fn response_ignores_non_text_blocks() {
        let json = r#"{"content":[{"type":"text","text":"Hel"},{"type":"tool_use","id":"x"},{"type":"text","text":"lo"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text)
            .collect();
        assert_eq!(text, "Hello");
    }
}
