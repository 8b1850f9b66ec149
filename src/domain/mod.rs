//! Domain layer - Core types shared by every provider

pub mod config;
pub mod error;
pub mod llm;
pub mod usage;

pub use config::{ApiKey, CostTable, ModelParameters, ProviderConfig, ProviderKind};
pub use error::{ErrorDetails, LlmError};
pub use llm::{
    ChatMessage, ChatRequest, ChatRequestBuilder, ChatResponse, ChatStream, ConnectionTestResult,
    LlmProvider, MessageRole, StreamChunk, Usage,
};
pub use usage::{ModelPricing, PricingCatalog};
