//! LLM-backed content analysis and chat replies.
//!
//! The capability check happens once, in [`create_analyzer`]: with a
//! configured credential it returns a [`LiveAnalyzer`] that calls the
//! Anthropic API, otherwise a [`DegradedAnalyzer`] that returns labelled
//! placeholder output. Callers only ever see `dyn Analyzer` and never branch
//! on credentials themselves.
//!
//! | Strategy | `analyze` | `chat_reply` |
//! |----------|-----------|--------------|
//! | live | prompt → model → [`parse_analysis`] | prompt with transcript → model text |
//! | degraded | [`placeholder_analysis`] (never fails) | fixed apology naming the missing key |

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use thoughtsynth_core::analysis::{parse_analysis, placeholder_analysis, AnalysisParseError};
use thoughtsynth_core::models::{Analysis, ChatMessage, SenderKind};

use crate::config::LlmConfig;
use crate::llm::AnthropicClient;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("LLM request failed: {0:#}")]
    Upstream(anyhow::Error),
    #[error(transparent)]
    Parse(#[from] AnalysisParseError),
}

/// Inputs for [`Analyzer::chat_reply`].
#[derive(Debug, Clone, Copy)]
pub struct ChatReplyRequest<'a> {
    pub content_title: &'a str,
    pub content_summary: &'a str,
    /// Prior messages, oldest first.
    pub history: &'a [ChatMessage],
    pub new_message: &'a str,
    /// Extra client-supplied context appended to the prompt.
    pub extra_context: Option<&'a str>,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// `true` when backed by a real model.
    fn is_live(&self) -> bool;

    async fn analyze(
        &self,
        title: &str,
        body: &str,
        user_notes: Option<&str>,
    ) -> Result<Analysis, AnalysisError>;

    async fn chat_reply(&self, request: ChatReplyRequest<'_>) -> Result<String, AnalysisError>;
}

pub fn analysis_prompt(title: &str, body: &str, user_notes: Option<&str>) -> String {
    let notes = user_notes
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!("User's Takeaways/Notes: {}\n", n))
        .unwrap_or_default();

    format!(
        r#"Analyze the following content and provide a comprehensive breakdown. Focus on extracting meaningful insights and knowledge synthesis opportunities.

Title: {title}

Content: {body}

{notes}
Please provide your analysis in JSON format with the following structure:
{{
  "summary": "A concise 2-3 sentence summary of the main points",
  "coreConcepts": ["List of 3-5 core concepts or themes"],
  "keyInsights": ["List of 3-5 key insights or learnings"],
  "notableQuotes": ["List of 2-3 most impactful quotes or statements"],
  "relatedTopics": ["List of 3-5 related topics for further exploration"],
  "actionableTakeaways": ["List of 3-5 specific actions or applications"],
  "tags": ["List of 5-8 relevant tags for categorization"]
}}

Guidelines:
- Focus on educational and learning value
- Extract insights that help with knowledge synthesis
- Identify connections to broader topics
- Suggest practical applications
- Keep responses objective and analytical
"#
    )
}

/// Render history as `User: ...` / `AI: ...` lines, oldest first.
pub fn transcript(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| {
            let who = match m.sender_kind {
                SenderKind::User => "User",
                SenderKind::Ai => "AI",
            };
            format!("{}: {}", who, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn chat_prompt(request: &ChatReplyRequest<'_>) -> String {
    let extra = request
        .extra_context
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("\nAdditional context: {}\n", c))
        .unwrap_or_default();

    format!(
        r#"You are an AI assistant helping users discuss and understand content. The user is discussing the following content:

Title: {title}
Summary: {summary}
{extra}
Previous conversation:
{history}

User's new message: {message}

Please provide a helpful, insightful response that:
- Relates to the content being discussed
- Builds on the conversation history
- Encourages deeper thinking and learning
- Asks thoughtful follow-up questions when appropriate

Keep your response conversational, educational, and focused on knowledge synthesis.
"#,
        title = request.content_title,
        summary = request.content_summary,
        history = transcript(request.history),
        message = request.new_message,
    )
}

/// Analyzer backed by the Anthropic Messages API.
pub struct LiveAnalyzer {
    client: AnthropicClient,
    max_tokens_analysis: u32,
    max_tokens_chat: u32,
}

#[async_trait]
impl Analyzer for LiveAnalyzer {
    fn is_live(&self) -> bool {
        true
    }

    async fn analyze(
        &self,
        title: &str,
        body: &str,
        user_notes: Option<&str>,
    ) -> Result<Analysis, AnalysisError> {
        let prompt = analysis_prompt(title, body, user_notes);
        let text = self
            .client
            .complete(&prompt, self.max_tokens_analysis)
            .await
            .map_err(AnalysisError::Upstream)?;
        let analysis = parse_analysis(&text)?;
        tracing::debug!(
            model = self.client.model_name(),
            tags = analysis.tags.len(),
            "analysis parsed"
        );
        Ok(analysis)
    }

    async fn chat_reply(&self, request: ChatReplyRequest<'_>) -> Result<String, AnalysisError> {
        let prompt = chat_prompt(&request);
        let text = self
            .client
            .complete(&prompt, self.max_tokens_chat)
            .await
            .map_err(AnalysisError::Upstream)?;
        if text.trim().is_empty() {
            return Ok("I apologize, but I encountered an issue generating a response.".to_string());
        }
        Ok(text)
    }
}

/// Analyzer used when no LLM credential is available.
pub struct DegradedAnalyzer {
    credential_env: String,
}

impl DegradedAnalyzer {
    pub fn new(credential_env: impl Into<String>) -> Self {
        Self {
            credential_env: credential_env.into(),
        }
    }
}

#[async_trait]
impl Analyzer for DegradedAnalyzer {
    fn is_live(&self) -> bool {
        false
    }

    async fn analyze(
        &self,
        title: &str,
        _body: &str,
        _user_notes: Option<&str>,
    ) -> Result<Analysis, AnalysisError> {
        Ok(placeholder_analysis(title, &self.credential_env))
    }

    async fn chat_reply(&self, request: ChatReplyRequest<'_>) -> Result<String, AnalysisError> {
        Ok(format!(
            "I'm sorry, but I need an {} to provide intelligent chat responses. \
             Currently, I can only acknowledge your message about \"{}\". \
             Please provide the API key to enable full AI chat functionality.",
            self.credential_env, request.content_title
        ))
    }
}

/// Pick the analyzer strategy from config and the process environment.
pub fn create_analyzer(config: &LlmConfig) -> Result<Arc<dyn Analyzer>> {
    let key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());
    analyzer_with_credential(config, key)
}

/// Like [`create_analyzer`], with the credential supplied explicitly.
pub fn analyzer_with_credential(
    config: &LlmConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn Analyzer>> {
    if !config.is_enabled() {
        tracing::info!("LLM provider disabled; using placeholder analysis");
        return Ok(Arc::new(DegradedAnalyzer::new(config.api_key_env.clone())));
    }
    match api_key {
        Some(key) => {
            tracing::info!(model = %config.model, "LLM analysis enabled");
            Ok(Arc::new(LiveAnalyzer {
                client: AnthropicClient::new(config, key)?,
                max_tokens_analysis: config.max_tokens_analysis,
                max_tokens_chat: config.max_tokens_chat,
            }))
        }
        None => {
            tracing::warn!(
                env = %config.api_key_env,
                "LLM credential not set; using placeholder analysis"
            );
            Ok(Arc::new(DegradedAnalyzer::new(config.api_key_env.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thoughtsynth_core::analysis::UNPROCESSED_TAG;
    use thoughtsynth_core::models::{from_millis, NewChatMessage};

    fn history() -> Vec<ChatMessage> {
        vec![
            NewChatMessage::user(1, "u1", "Ada", "What is ownership?").into_message(1, from_millis(1)),
            NewChatMessage::ai(1, "A set of rules.").into_message(2, from_millis(2)),
        ]
    }

    #[test]
    fn analysis_prompt_includes_notes_only_when_present() {
        let with = analysis_prompt("T", "B", Some("remember this"));
        assert!(with.contains("Title: T"));
        assert!(with.contains("Content: B"));
        assert!(with.contains("User's Takeaways/Notes: remember this"));
        assert!(with.contains("\"coreConcepts\""));

        let without = analysis_prompt("T", "B", Some("   "));
        assert!(!without.contains("Takeaways/Notes"));
    }

    #[test]
    fn transcript_labels_senders_in_order() {
        assert_eq!(
            transcript(&history()),
            "User: What is ownership?\nAI: A set of rules."
        );
    }

    #[test]
    fn chat_prompt_carries_content_and_context() {
        let h = history();
        let prompt = chat_prompt(&ChatReplyRequest {
            content_title: "Rust Book",
            content_summary: "About Rust",
            history: &h,
            new_message: "And borrowing?",
            extra_context: Some("chapter 4"),
        });
        assert!(prompt.contains("Title: Rust Book"));
        assert!(prompt.contains("Summary: About Rust"));
        assert!(prompt.contains("User: What is ownership?\nAI: A set of rules."));
        assert!(prompt.contains("User's new message: And borrowing?"));
        assert!(prompt.contains("Additional context: chapter 4"));
    }

    #[tokio::test]
    async fn missing_credential_selects_degraded() {
        let analyzer = analyzer_with_credential(&LlmConfig::default(), None).unwrap();
        assert!(!analyzer.is_live());

        let analysis = analyzer.analyze("Title", "body", None).await.unwrap();
        assert!(analysis.tags.iter().any(|t| t == UNPROCESSED_TAG));

        let reply = analyzer
            .chat_reply(ChatReplyRequest {
                content_title: "Title",
                content_summary: "",
                history: &[],
                new_message: "hi",
                extra_context: None,
            })
            .await
            .unwrap();
        assert!(reply.contains("ANTHROPIC_API_KEY"));
        assert!(reply.contains("\"Title\""));
    }

    #[test]
    fn disabled_provider_ignores_credential() {
        let config = LlmConfig {
            provider: "disabled".into(),
            ..Default::default()
        };
        let analyzer = analyzer_with_credential(&config, Some("key".into())).unwrap();
        assert!(!analyzer.is_live());
    }

    #[test]
    fn credential_selects_live() {
        let analyzer =
            analyzer_with_credential(&LlmConfig::default(), Some("sk-test".into())).unwrap();
        assert!(analyzer.is_live());
    }
}
