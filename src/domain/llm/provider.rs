use std::fmt::Debug;
use std::pin::Pin;
use std::time::Instant;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatRequest, ChatResponse, StreamChunk};
use crate::domain::LlmError;
use crate::domain::config::ProviderConfig;
use crate::domain::usage::estimate_output_tokens;

/// Stream type for LLM responses
///
/// Finite and ordered; the last successful item is the single final chunk.
/// Dropping the stream releases the underlying connection.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

const PROBE_MESSAGE: &str = "Hello! This is a test.";
const PROBE_MAX_TOKENS: u32 = 10;

/// Outcome of a configuration health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ConnectionTestResult {
    pub fn succeeded(response: &ChatResponse, response_time_ms: u64) -> Self {
        Self {
            success: true,
            message: "Connection successful".to_string(),
            response_time_ms: Some(response_time_ms),
            model: Some(response.model.clone()),
            cost: response.cost,
            error_type: None,
        }
    }

    pub fn failed(error: &LlmError) -> Self {
        Self {
            success: false,
            message: format!("Connection failed: {}", error),
            response_time_ms: None,
            model: None,
            cost: None,
            error_type: Some(error.error_type().to_string()),
        }
    }
}

/// Trait for LLM providers (OpenAI, Anthropic, Google)
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    /// Display name of the vendor (e.g. "OpenAI")
    fn provider_name(&self) -> &'static str;

    /// Configuration this provider was built from
    fn config(&self) -> &ProviderConfig;

    /// Send a unary chat request
    async fn send_chat_request(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Send a streaming chat request
    async fn stream_chat_request(&self, request: &ChatRequest) -> Result<ChatStream, LlmError>;

    /// Model identifiers offered by the vendor, in vendor order
    async fn get_available_models(&self) -> Result<Vec<String>, LlmError>;

    /// Output budget assumed by `estimate_cost` when neither the request nor
    /// the configuration sets `max_tokens`
    fn default_max_tokens(&self) -> u32 {
        1000
    }

    /// Pre-flight cost guess, `None` when the configuration has no cost tracking
    fn estimate_cost(&self, request: &ChatRequest) -> Option<f64> {
        let config = self.config();
        if !config.has_cost_tracking() {
            return None;
        }

        let input_tokens = request.estimate_tokens();
        let max_tokens = request
            .max_tokens
            .or(config.model_parameters.max_tokens)
            .unwrap_or_else(|| self.default_max_tokens());
        let output_tokens = estimate_output_tokens(input_tokens, max_tokens);

        Some(config.calculate_request_cost(input_tokens, output_tokens))
    }

    /// Send a minimal probe request; never fails
    async fn test_connection(&self) -> ConnectionTestResult {
        tracing::info!(provider = self.provider_name(), "Testing connection");

        let probe = ChatRequest {
            max_tokens: Some(PROBE_MAX_TOKENS),
            ..ChatRequest::new(vec![ChatMessage::user(PROBE_MESSAGE)])
        };

        let started = Instant::now();
        match self.send_chat_request(&probe).await {
            Ok(response) => {
                let elapsed = started.elapsed().as_millis() as u64;
                tracing::info!(
                    provider = self.provider_name(),
                    response_time_ms = elapsed,
                    "Connection test successful"
                );
                ConnectionTestResult::succeeded(&response, elapsed)
            }
            Err(e) => {
                tracing::error!(
                    provider = self.provider_name(),
                    error = %e,
                    "Connection test failed"
                );
                ConnectionTestResult::failed(&e)
            }
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::config::ProviderKind;
    use futures::stream;

    #[derive(Debug)]
    pub struct MockLlmProvider {
        config: ProviderConfig,
        response: Option<ChatResponse>,
        error: Option<LlmError>,
    }

    impl MockLlmProvider {
        pub fn new(config: ProviderConfig) -> Self {
            Self {
                config,
                response: None,
                error: None,
            }
        }

        pub fn with_response(mut self, response: ChatResponse) -> Self {
            self.response = Some(response);
            self
        }

        pub fn with_error(mut self, error: LlmError) -> Self {
            self.error = Some(error);
            self
        }
    }

    impl Default for MockLlmProvider {
        fn default() -> Self {
            Self::new(ProviderConfig::new("mock", ProviderKind::OpenAi))
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        fn provider_name(&self) -> &'static str {
            "Mock"
        }

        fn config(&self) -> &ProviderConfig {
            &self.config
        }

        async fn send_chat_request(
            &self,
            _request: &ChatRequest,
        ) -> Result<ChatResponse, LlmError> {
            if let Some(ref error) = self.error {
                return Err(error.clone());
            }

            self.response
                .clone()
                .ok_or_else(|| LlmError::provider("Mock", "No mock response configured"))
        }

        async fn stream_chat_request(
            &self,
            request: &ChatRequest,
        ) -> Result<ChatStream, LlmError> {
            let response = self.send_chat_request(request).await?;
            let count = response.content.chars().count() as u32;

            let chunks: Vec<Result<StreamChunk, LlmError>> = response
                .content
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    Ok(StreamChunk::delta(
                        c.to_string(),
                        response.model.clone(),
                        "Mock",
                        i as u32,
                    ))
                })
                .chain(std::iter::once(Ok(StreamChunk::terminal(
                    response.model.clone(),
                    "Mock",
                    count,
                    response.usage,
                    response.cost,
                    response.response_time_ms,
                ))))
                .collect();

            Ok(Box::pin(stream::iter(chunks)))
        }

        async fn get_available_models(&self) -> Result<Vec<String>, LlmError> {
            Ok(vec!["mock-model".to_string()])
        }
    }
}
