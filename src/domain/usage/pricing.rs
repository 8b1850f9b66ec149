use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::config::{CostTable, ProviderKind};

/// USD list prices for one model family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model id or id prefix (`gpt-4o` also prices `gpt-4o-2024-08-06`)
    pub model_id: String,
    pub kind: ProviderKind,
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn new(
        model_id: impl Into<String>,
        kind: ProviderKind,
        input_per_1k: f64,
        output_per_1k: f64,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            kind,
            input_per_1k,
            output_per_1k,
        }
    }

    /// USD cost of a call with the given token counts
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        self.to_cost_table().calculate(input_tokens, output_tokens)
    }

    /// Per-configuration cost table carrying this model's prices
    pub fn to_cost_table(&self) -> CostTable {
        CostTable::new(self.input_per_1k, self.output_per_1k)
    }
}

const DEFAULT_PRICES: &[(&str, ProviderKind, f64, f64)] = &[
    ("gpt-4o", ProviderKind::OpenAi, 0.005, 0.015),
    ("gpt-4o-mini", ProviderKind::OpenAi, 0.00015, 0.0006),
    ("gpt-4-turbo", ProviderKind::OpenAi, 0.01, 0.03),
    ("gpt-4", ProviderKind::OpenAi, 0.03, 0.06),
    ("gpt-3.5-turbo", ProviderKind::OpenAi, 0.0005, 0.0015),
    ("claude-3-5-sonnet", ProviderKind::Anthropic, 0.003, 0.015),
    ("claude-3-5-haiku", ProviderKind::Anthropic, 0.0008, 0.004),
    ("claude-3-opus", ProviderKind::Anthropic, 0.015, 0.075),
    ("claude-3-haiku", ProviderKind::Anthropic, 0.00025, 0.00125),
    ("claude-sonnet-4", ProviderKind::Anthropic, 0.003, 0.015),
    ("claude-opus-4", ProviderKind::Anthropic, 0.015, 0.075),
    ("gemini-1.5-pro", ProviderKind::Google, 0.00125, 0.005),
    ("gemini-1.5-flash", ProviderKind::Google, 0.000075, 0.0003),
    ("gemini-2.5-pro", ProviderKind::Google, 0.00125, 0.01),
    ("gemini-2.5-flash", ProviderKind::Google, 0.0003, 0.0025),
];

/// Per-model price lookup consumed by provider configurations
#[derive(Debug, Clone, Default)]
pub struct PricingCatalog {
    entries: HashMap<String, ModelPricing>,
}

impl PricingCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-filled with list prices of common models
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        for &(model, kind, input, output) in DEFAULT_PRICES {
            catalog.insert(ModelPricing::new(model, kind, input, output));
        }
        catalog
    }

    /// Add or replace the entry for `pricing.model_id`
    pub fn insert(&mut self, pricing: ModelPricing) {
        self.entries.insert(pricing.model_id.clone(), pricing);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match first, then the longest catalog id that prefixes `model`
    /// (so dated snapshots like `gpt-4o-2024-08-06` resolve to `gpt-4o`)
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        if let Some(pricing) = self.entries.get(model) {
            return Some(pricing);
        }

        self.entries
            .iter()
            .filter(|(id, _)| model.starts_with(id.as_str()))
            .max_by_key(|(id, _)| id.len())
            .map(|(_, pricing)| pricing)
    }
}
