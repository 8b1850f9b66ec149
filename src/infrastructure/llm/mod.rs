//! LLM provider implementations

mod anthropic;
mod error_mapping;
mod factory;
mod framing;
mod google;
mod http_client;
mod openai;
mod payload;
mod registry;
mod streaming;

pub use anthropic::AnthropicProvider;
pub use factory::LlmProviderFactory;
pub use google::GoogleProvider;
pub use http_client::{
    ByteStream, HttpClient, HttpClientTrait, HttpResponse, StreamingResponse, TransportError,
};
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
