use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ApiKey, CostTable};
use crate::domain::LlmError;
use crate::domain::llm::Usage;
use crate::domain::usage::PricingCatalog;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Vendor behind a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "open_ai")]
    OpenAi,
    Anthropic,
    #[serde(alias = "gemini")]
    Google,
}

impl ProviderKind {
    /// Human-readable provider name reported on responses
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic (Claude)",
            Self::Google => "Google",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Google => "gemini-1.5-pro",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Google => write!(f, "google"),
        }
    }
}

/// Configuration-level generation defaults
///
/// A request's own `temperature`/`max_tokens` take priority over these.
/// `extra` entries are merged into the payload before the request's
/// `extra_params`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// Read-only description of one provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<ApiKey>,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Vendor API version header, where the vendor has one
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub model_parameters: ModelParameters,
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub cost: CostTable,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bumped whenever the configuration is edited
    #[serde(default)]
    pub revision: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ProviderConfig {
    /// Configuration with the vendor's default endpoint and model
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            name: kind.display_name().to_string(),
            kind,
            api_key: None,
            api_endpoint: Some(kind.default_endpoint().to_string()),
            api_version: None,
            default_model: kind.default_model().to_string(),
            model_parameters: ModelParameters::default(),
            custom_headers: BTreeMap::new(),
            cost: CostTable::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            revision: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<ApiKey>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    pub fn without_endpoint(mut self) -> Self {
        self.api_endpoint = None;
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.model_parameters.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.model_parameters.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_model_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.model_parameters.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cost(mut self, cost: CostTable) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Fill an empty cost table from the catalog entry of the default model
    pub fn with_catalog_pricing(mut self, catalog: &PricingCatalog) -> Self {
        if !self.cost.is_enabled() {
            if let Some(pricing) = catalog.get(self.default_model()) {
                self.cost = pricing.to_cost_table();
            }
        }
        self
    }

    /// Name shown to users; falls back to the vendor display name
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.kind.display_name()
        } else {
            self.name.as_str()
        }
    }

    /// Model used when a request names none
    pub fn default_model(&self) -> &str {
        if self.default_model.is_empty() {
            self.kind.default_model()
        } else {
            self.default_model.as_str()
        }
    }

    /// Decrypted API key, or a configuration error if none is set
    pub fn api_key(&self) -> Result<&str, LlmError> {
        match &self.api_key {
            Some(key) if !key.is_empty() => Ok(key.expose()),
            _ => Err(LlmError::configuration(format!(
                "API key is not configured for provider '{}'",
                self.id
            ))),
        }
    }

    /// Endpoint without a trailing slash, or a configuration error if none is set
    pub fn endpoint(&self) -> Result<&str, LlmError> {
        match self.api_endpoint.as_deref().map(|e| e.trim_end_matches('/')) {
            Some(endpoint) if !endpoint.trim().is_empty() => Ok(endpoint),
            _ => Err(LlmError::configuration(format!(
                "API endpoint is not configured for provider '{}'",
                self.id
            ))),
        }
    }

    /// Fails when the key or the endpoint is missing
    pub fn validate(&self) -> Result<(), LlmError> {
        self.api_key()?;
        self.endpoint()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn has_cost_tracking(&self) -> bool {
        self.cost.is_enabled()
    }

    /// USD cost for the given token counts, ignoring whether tracking is on
    pub fn calculate_request_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.cost.calculate(input_tokens, output_tokens)
    }

    /// Cost of a finished call, `None` when tracking is off
    pub fn cost_for(&self, usage: &Usage) -> Option<f64> {
        self.cost.cost_for(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_vendor_defaults() {
        let config = ProviderConfig::new("gemini", ProviderKind::Google);

        assert_eq!(config.display_name(), "Google");
        assert_eq!(
            config.endpoint().unwrap(),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(config.default_model, "gemini-1.5-pro");
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(!config.has_cost_tracking());
    }

    #[test]
    fn test_validate_missing_key() {
        let config = ProviderConfig::new("openai", ProviderKind::OpenAi);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, LlmError::Configuration { .. }));
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_validate_missing_endpoint() {
        let config = ProviderConfig::new("openai", ProviderKind::OpenAi)
            .with_api_key("sk-test")
            .without_endpoint();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let config = ProviderConfig::new("local", ProviderKind::OpenAi)
            .with_endpoint("http://localhost:8080/v1/");
        assert_eq!(config.endpoint().unwrap(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_catalog_pricing_fills_empty_table_only() {
        let catalog = PricingCatalog::with_defaults();

        let config = ProviderConfig::new("openai", ProviderKind::OpenAi)
            .with_default_model("gpt-4o")
            .with_catalog_pricing(&catalog);
        assert!(config.has_cost_tracking());
        assert_eq!(config.cost.input_per_1k, Some(0.005));

        let config = ProviderConfig::new("openai", ProviderKind::OpenAi)
            .with_default_model("gpt-4o")
            .with_cost(CostTable::new(1.0, 2.0))
            .with_catalog_pricing(&catalog);
        assert_eq!(config.cost.input_per_1k, Some(1.0));
    }

    #[test]
    fn test_deserialize_from_toml_shape() {
        let json = serde_json::json!({
            "id": "claude",
            "kind": "anthropic",
            "api_key": "sk-ant-0123456789abcdef",
            "api_endpoint": "https://api.anthropic.com",
            "default_model": "claude-3-5-haiku-latest",
            "model_parameters": { "temperature": 0.7, "max_tokens": 4000, "top_k": 40 },
            "cost": { "input_per_1k": 0.015, "output_per_1k": 0.075 }
        });

        let config: ProviderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.kind, ProviderKind::Anthropic);
        assert_eq!(config.model_parameters.max_tokens, Some(4000));
        assert_eq!(config.model_parameters.extra["top_k"], serde_json::json!(40));
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.display_name(), "Anthropic (Claude)");
        assert!(!format!("{:?}", config).contains("0123456789abcdef"));
    }

    #[test]
    fn test_kind_names() {
        let kind: ProviderKind = serde_json::from_value(serde_json::json!("openai")).unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
        let kind: ProviderKind = serde_json::from_value(serde_json::json!("gemini")).unwrap();
        assert_eq!(kind, ProviderKind::Google);
        assert_eq!(serde_json::to_value(ProviderKind::OpenAi).unwrap(), "openai");
    }

    #[test]
    fn test_cost_for_respects_tracking_flag() {
        let usage = Usage::new(1000, 1000);

        let untracked = ProviderConfig::new("a", ProviderKind::OpenAi);
        assert_eq!(untracked.cost_for(&usage), None);

        let tracked = untracked.with_cost(CostTable::new(0.01, 0.02));
        let cost = tracked.cost_for(&usage).unwrap();
        assert!((cost - 0.03).abs() < 1e-9);
    }
}
