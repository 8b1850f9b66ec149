use serde_json::{Map, Value};
use thiserror::Error;

/// Free-form diagnostic context attached to provider errors
pub type ErrorDetails = Map<String, Value>;

/// Provider-agnostic LLM errors
///
/// Every vendor failure is mapped into one of these three kinds so callers
/// never branch on vendor specifics.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Transport or vendor failure that is not a credential or quota problem
    #[error("Provider error: {provider} - {message}")]
    Provider {
        provider: String,
        message: String,
        status_code: Option<u16>,
        details: ErrorDetails,
    },

    /// Bad or missing credentials/endpoint; not retryable without an operator fix
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Rate limit or quota exhausted at the vendor; retryable after backoff
    #[error("Quota exceeded: {provider} - {message}")]
    QuotaExceeded { provider: String, message: String },
}

impl LlmError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code: None,
            details: ErrorDetails::new(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn quota_exceeded(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Timed-out call, flagged with `details.timeout = true`
    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::provider(provider, message).with_detail("timeout", true)
    }

    /// Connection-level failure, flagged with `details.network_error`
    pub fn network(provider: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self::provider(provider, format!("Network error: {}", error))
            .with_detail("network_error", error)
    }

    /// Attach an HTTP status. Only provider errors carry one.
    pub fn with_status(mut self, status: u16) -> Self {
        if let Self::Provider { status_code, .. } = &mut self {
            *status_code = Some(status);
        }
        self
    }

    /// Attach a diagnostic detail. Only provider errors carry details.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Provider { details, .. } = &mut self {
            details.insert(key.into(), value.into());
        }
        self
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider { status_code, .. } => *status_code,
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::Provider { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn provider_name(&self) -> Option<&str> {
        match self {
            Self::Provider { provider, .. } | Self::QuotaExceeded { provider, .. } => {
                Some(provider)
            }
            Self::Configuration { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.details()
            .and_then(|d| d.get("timeout"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether retrying the same call later can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::QuotaExceeded { .. } => true,
            Self::Configuration { .. } => false,
            Self::Provider { status_code, .. } => {
                self.is_timeout()
                    || self
                        .details()
                        .is_some_and(|d| d.contains_key("network_error"))
                    || status_code.is_some_and(|s| s >= 500)
            }
        }
    }

    /// Stable kind name reported by connection tests
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Provider { .. } => "LLMProviderError",
            Self::Configuration { .. } => "LLMConfigurationError",
            Self::QuotaExceeded { .. } => "LLMQuotaExceededError",
        }
    }
}
