//! Token accounting and pricing
//!
//! Provides the per-model price catalog and the character-count heuristics
//! used when a vendor does not report usage.

mod estimate;
mod pricing;

pub use estimate::{CHARS_PER_TOKEN, estimate_output_tokens, estimate_tokens, estimate_usage};
pub use pricing::{ModelPricing, PricingCatalog};
