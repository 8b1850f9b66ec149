use std::sync::Arc;

use super::http_client::{HttpClient, HttpClientTrait};
use super::{AnthropicProvider, GoogleProvider, OpenAiProvider};
use crate::domain::{LlmError, LlmProvider, ProviderConfig, ProviderKind};

/// Factory for creating LLM providers
#[derive(Debug)]
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create the provider for `config.kind` with a reqwest client honoring
    /// the configured timeout
    ///
    /// Credentials are not checked here; every call validates them.
    pub fn create(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let client = HttpClient::with_timeout(config.timeout()).map_err(|e| {
            LlmError::configuration(format!(
                "Failed to build HTTP client for provider '{}': {}",
                config.id, e
            ))
        })?;

        tracing::debug!(
            provider_id = %config.id,
            kind = %config.kind,
            timeout_secs = config.timeout().as_secs(),
            "Creating LLM provider"
        );

        Ok(Self::create_with_client(client, config.clone()))
    }

    /// Create a provider over an arbitrary HTTP client
    pub fn create_with_client<C: HttpClientTrait + 'static>(
        client: C,
        config: ProviderConfig,
    ) -> Arc<dyn LlmProvider> {
        match config.kind {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(client, config)),
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(client, config)),
            ProviderKind::Google => Arc::new(GoogleProvider::new(client, config)),
        }
    }
}
