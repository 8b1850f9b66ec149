//! LLM provider domain models and traits

mod message;
mod provider;
mod request;
mod response;

pub use message::{ChatMessage, MessageRole};
pub use provider::{ChatStream, ConnectionTestResult, LlmProvider};
pub use request::{ChatRequest, ChatRequestBuilder};
pub use response::{ChatResponse, StreamChunk, Usage};

#[cfg(test)]
pub use provider::mock::MockLlmProvider;
