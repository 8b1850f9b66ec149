use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Usage with a vendor-reported total, which may include tokens
    /// outside input/output (e.g. reasoning or cached tokens)
    pub fn with_total(input_tokens: u32, output_tokens: u32, total_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// Normalized result of a unary chat call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Reply text; empty when the vendor returned no candidates
    pub content: String,
    /// Model actually used, as echoed by the vendor
    pub model: String,
    /// Provider display name
    pub provider: String,
    pub usage: Usage,
    /// USD cost, `None` when the configuration has no cost tracking
    pub cost: Option<f64>,
    /// Wall-clock latency of the network call only
    pub response_time_ms: u64,
    /// Untouched vendor payload kept for diagnostics
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub raw_response: Value,
    pub created_at: DateTime<Utc>,
}

impl ChatResponse {
    pub fn new(
        content: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            provider: provider.into(),
            usage: Usage::default(),
            cost: None,
            response_time_ms: 0,
            raw_response: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_cost(mut self, cost: Option<f64>) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn with_raw_response(mut self, raw: Value) -> Self {
        self.raw_response = raw;
        self
    }

    pub fn is_successful(&self) -> bool {
        !self.content.is_empty()
    }
}

/// One unit of a streaming response
///
/// Exactly one chunk per stream is final; it comes last, has empty content
/// and carries usage, cost and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub is_final: bool,
    pub model: String,
    pub provider: String,
    pub chunk_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl StreamChunk {
    /// Incremental text delta
    pub fn delta(
        content: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
        chunk_index: u32,
    ) -> Self {
        Self {
            content: content.into(),
            is_final: false,
            model: model.into(),
            provider: provider.into(),
            chunk_index,
            usage: None,
            cost: None,
            response_time_ms: None,
        }
    }

    /// Terminal chunk with the aggregate accounting
    pub fn terminal(
        model: impl Into<String>,
        provider: impl Into<String>,
        chunk_index: u32,
        usage: Usage,
        cost: Option<f64>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            content: String::new(),
            is_final: true,
            model: model.into(),
            provider: provider.into(),
            chunk_index,
            usage: Some(usage),
            cost,
            response_time_ms: Some(response_time_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_calculation() {
        let usage = Usage::new(10, 20);
        assert_eq!(usage.total_tokens, 30);
        assert!(!usage.is_empty());
        assert!(Usage::default().is_empty());
    }

    #[test]
    fn test_response_builder() {
        let response = ChatResponse::new("Hello!", "gpt-4", "OpenAI")
            .with_usage(Usage::new(3, 2))
            .with_cost(Some(0.01))
            .with_response_time(120);

        assert_eq!(response.content, "Hello!");
        assert_eq!(response.usage.total_tokens, 5);
        assert_eq!(response.cost, Some(0.01));
        assert_eq!(response.response_time_ms, 120);
        assert!(response.is_successful());
    }

    #[test]
    fn test_terminal_chunk_has_empty_content() {
        let chunk = StreamChunk::terminal("gemini-1.5-pro", "Google", 4, Usage::new(1, 1), None, 50);
        assert!(chunk.is_final);
        assert!(chunk.content.is_empty());
        assert_eq!(chunk.usage, Some(Usage::new(1, 1)));
        assert_eq!(chunk.response_time_ms, Some(50));
    }

    #[test]
    fn test_delta_chunk_serialization_omits_accounting() {
        let chunk = StreamChunk::delta("Hel", "gpt-4", "OpenAI", 0);
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["content"], "Hel");
        assert_eq!(json["is_final"], false);
        assert!(json.get("usage").is_none());
        assert!(json.get("cost").is_none());
    }
}
