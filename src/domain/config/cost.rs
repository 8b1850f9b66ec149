use serde::{Deserialize, Serialize};

use crate::domain::llm::Usage;

/// Per-configuration prices in USD
///
/// Cost tracking is on when any entry is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_per_1k: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_per_1k: Option<f64>,
    /// Flat fee added to every request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_request: Option<f64>,
}

impl CostTable {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k: Some(input_per_1k),
            output_per_1k: Some(output_per_1k),
            per_request: None,
        }
    }

    pub fn with_per_request(mut self, fee: f64) -> Self {
        self.per_request = Some(fee);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.input_per_1k.is_some() || self.output_per_1k.is_some() || self.per_request.is_some()
    }

    /// USD cost for the given token counts
    pub fn calculate(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let mut total = 0.0;

        if let Some(price) = self.input_per_1k {
            total += price * (input_tokens as f64 / 1000.0);
        }

        if let Some(price) = self.output_per_1k {
            total += price * (output_tokens as f64 / 1000.0);
        }

        if let Some(fee) = self.per_request {
            total += fee;
        }

        total
    }

    /// Cost of a call, `None` when tracking is off
    pub fn cost_for(&self, usage: &Usage) -> Option<f64> {
        self.is_enabled()
            .then(|| self.calculate(usage.input_tokens, usage.output_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_table() {
        let table = CostTable::default();
        assert!(!table.is_enabled());
        assert_eq!(table.cost_for(&Usage::new(100, 100)), None);
    }

    #[test]
    fn test_calculate_with_fee() {
        let table = CostTable::new(0.03, 0.06).with_per_request(0.001);

        // 0.03 + 0.03 + 0.001
        let cost = table.calculate(1000, 500);
        assert!((cost - 0.061).abs() < 1e-9);
    }

    #[test]
    fn test_zero_usage_costs_zero() {
        let table = CostTable::new(0.03, 0.06);
        assert_eq!(table.cost_for(&Usage::default()), Some(0.0));
    }

    #[test]
    fn test_partial_table_is_enabled() {
        let table = CostTable {
            output_per_1k: Some(0.002),
            ..CostTable::default()
        };
        assert!(table.is_enabled());
        assert!((table.calculate(5000, 1000) - 0.002).abs() < 1e-9);
    }
}
