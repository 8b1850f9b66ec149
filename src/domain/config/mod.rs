//! Provider configuration consumed by the LLM providers

mod cost;
mod provider;
mod secret;

pub use cost::CostTable;
pub use provider::{ModelParameters, ProviderConfig, ProviderKind};
pub use secret::ApiKey;
