//! LLM Dock providers
//!
//! One chat contract over several LLM vendors:
//! - OpenAI-compatible chat completions
//! - Anthropic messages
//! - Google Gemini generateContent
//!
//! Unary and streaming calls share a single error taxonomy, token usage
//! accounting and optional cost tracking.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmError, LlmProvider, MessageRole,
    ProviderConfig, ProviderKind, StreamChunk, Usage,
};
pub use infrastructure::llm::{LlmProviderFactory, ProviderRegistry};
