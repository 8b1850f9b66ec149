use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ChatMessage;
use crate::domain::usage::estimate_tokens;

/// A unary or streaming chat invocation
///
/// `messages` keep conversational order. `extra_params` are merged verbatim
/// into the outgoing vendor payload after every derived field, so they win.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the configuration's default model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_params: Map<String, Value>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::new()
    }

    /// Total character count across all messages
    pub fn total_content_length(&self) -> usize {
        self.messages.iter().map(ChatMessage::char_count).sum()
    }

    /// Rough prompt size in tokens (4 characters per token)
    pub fn estimate_tokens(&self) -> u32 {
        estimate_tokens(self.total_content_length())
    }

    /// Model to call: the request override or the given default
    pub fn resolve_model<'a>(&'a self, default_model: &'a str) -> &'a str {
        self.model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(default_model)
    }
}

/// Builder for ChatRequest
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    messages: Vec<ChatMessage>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    extra_params: Map<String, Value>,
}

impl ChatRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn system(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::system(content))
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::user(content))
    }

    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::assistant(content))
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Add a provider-specific payload override
    pub fn extra_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ChatRequest {
        ChatRequest {
            messages: self.messages,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            extra_params: self.extra_params,
        }
    }
}
