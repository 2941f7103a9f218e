//! Request and response types for language-model calls.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// Caller-authored content.
    User,
    /// Model-authored content.
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Creates a system + user request.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: 4096,
            temperature: 0.2,
        }
    }

    /// Sets the token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Appends a message.
    #[must_use]
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// The concatenated user-visible prompt, for log summaries.
    #[must_use]
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,
    /// The token cap was reached; the answer is truncated.
    Length,
    /// Anything else the provider reported.
    Other(String),
}

impl FinishReason {
    /// Maps a provider string to a finish reason.
    #[must_use]
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u32,
    /// Completion tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// A model answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text.
    pub content: String,
    /// The model that answered.
    pub model: String,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Token usage, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Wall-clock latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

impl Completion {
    /// Creates a completion that stopped naturally.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: String::new(),
            finish_reason: Some(FinishReason::Stop),
            usage: None,
            latency_ms: None,
        }
    }

    /// Returns true if the provider cut the answer at the token cap.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.finish_reason == Some(FinishReason::Length)
    }

    /// Attributes for the run log.
    #[must_use]
    pub fn to_log_attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("llm.model".to_string(), serde_json::json!(self.model));
        if let Some(usage) = self.usage {
            map.insert("llm.input_tokens".to_string(), serde_json::json!(usage.input_tokens));
            map.insert("llm.output_tokens".to_string(), serde_json::json!(usage.output_tokens));
            map.insert("llm.total_tokens".to_string(), serde_json::json!(usage.total_tokens()));
        }
        if let Some(l) = self.latency_ms {
            map.insert("llm.latency_ms".to_string(), serde_json::json!(l));
        }
        if let Some(ref reason) = self.finish_reason {
            map.insert("llm.finish_reason".to_string(), serde_json::json!(reason));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_user_text() {
        let request = CompletionRequest::new("m", "sys", "first")
            .with_message(ChatMessage::assistant("partial"))
            .with_message(ChatMessage::user("continue"));
        assert_eq!(request.user_text(), "first\n\ncontinue");
        assert_eq!(request.messages.len(), 4);
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_provider("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_provider("content_filter"),
            FinishReason::Other("content_filter".into())
        );
    }

    #[test]
    fn test_completion_truncation_and_attributes() {
        let mut completion = Completion::text("abc");
        assert!(!completion.is_truncated());
        completion.finish_reason = Some(FinishReason::Length);
        completion.usage = Some(TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        });
        assert!(completion.is_truncated());

        let attrs = completion.to_log_attributes();
        assert_eq!(attrs.get("llm.total_tokens"), Some(&serde_json::json!(15)));
    }

    #[test]
    fn test_total_tokens_saturates() {
        let usage = TokenUsage {
            input_tokens: u32::MAX,
            output_tokens: 7,
        };
        assert_eq!(usage.total_tokens(), u32::MAX);
    }
}
