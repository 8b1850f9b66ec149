use serde::Deserialize;

use crate::domain::{PricingCatalog, ProviderConfig};
use crate::infrastructure::logging::LoggingConfig;

/// Configuration for the `llm-dock` binary
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl AppConfig {
    /// Load from `config/default`, `config/local` and `APP__*` variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self, config::ConfigError> {
        let mut app: Self = config.try_deserialize()?;
        let catalog = PricingCatalog::with_defaults();

        app.providers = app
            .providers
            .into_iter()
            .map(|mut provider| {
                if provider.api_endpoint.is_none() {
                    provider.api_endpoint = Some(provider.kind.default_endpoint().to_string());
                }
                provider.with_catalog_pricing(&catalog)
            })
            .collect();

        Ok(app)
    }

    /// Provider configuration by id
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}
