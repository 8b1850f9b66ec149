//! Vendor error translation into the shared `LlmError` taxonomy

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::http_client::{HttpResponse, TransportError};
use crate::domain::LlmError;

const MAX_ERROR_TEXT_CHARS: usize = 1_024;

static BEARER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9._\-+/=]{8,}").expect("valid bearer token regex")
});

static KEY_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([?&]key=)[^&\s]+").expect("valid key parameter regex"));

/// Which kind of call failed; shapes messages and details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Unary,
    Streaming,
    ModelListing,
}

/// Naming used when mapping one vendor's errors
#[derive(Debug, Clone, Copy)]
pub(crate) struct VendorErrors {
    /// Display name carried on errors
    pub provider: &'static str,
    /// Prefix for generic API errors (`"<vendor> API error: …"`)
    pub vendor: &'static str,
    /// Detail key holding the vendor's own error classification
    pub code_key: &'static str,
}

impl VendorErrors {
    /// Map a non-2xx response
    pub(crate) fn from_response(&self, response: &HttpResponse) -> LlmError {
        let (message, code) = parse_error_body(response);

        let error = match response.status {
            401 | 403 => LlmError::configuration(format!("Invalid API key: {}", message)),
            429 => LlmError::quota_exceeded(
                self.provider,
                format!("Rate limit exceeded: {}", message),
            ),
            400 => LlmError::provider(self.provider, format!("Bad request: {}", message))
                .with_status(400)
                .with_detail("raw_body", sanitize_error_text(&response.body)),
            status => {
                let error = LlmError::provider(
                    self.provider,
                    format!("{} API error: {}", self.vendor, message),
                )
                .with_status(status)
                .with_detail("raw_body", sanitize_error_text(&response.body));

                match code {
                    Some(code) => error.with_detail(self.code_key, code),
                    None => error,
                }
            }
        };

        tracing::error!(
            provider = self.provider,
            status = response.status,
            error = %error,
            "Vendor returned an error response"
        );

        error
    }

    /// Map a failure below the HTTP level
    pub(crate) fn from_transport(&self, kind: CallKind, error: TransportError) -> LlmError {
        let mapped = match error {
            TransportError::Timeout => {
                let message = match kind {
                    CallKind::Unary => "Request timed out",
                    CallKind::Streaming => "Streaming request timed out",
                    CallKind::ModelListing => "Request timed out while fetching models",
                };
                LlmError::timeout(self.provider, message)
            }
            TransportError::Network(text) => {
                let text = sanitize_error_text(&text);
                let message = match kind {
                    CallKind::Unary => format!("Network error: {}", text),
                    CallKind::Streaming => format!("Streaming network error: {}", text),
                    CallKind::ModelListing => {
                        format!("Network error while fetching models: {}", text)
                    }
                };
                LlmError::provider(self.provider, message).with_detail("network_error", text)
            }
        };

        let mapped = if kind == CallKind::Streaming {
            mapped.with_detail("streaming", true)
        } else {
            mapped
        };

        tracing::error!(provider = self.provider, error = %mapped, "Transport failure");
        mapped
    }

    /// Decode a successful response body as JSON
    pub(crate) fn parse_json(&self, response: &HttpResponse) -> Result<Value, LlmError> {
        serde_json::from_str(&response.body).map_err(|e| {
            LlmError::provider(self.provider, format!("Failed to parse response: {}", e))
                .with_status(response.status)
                .with_detail("raw_body", sanitize_error_text(&response.body))
        })
    }
}

/// Message and vendor code from `{"error": {"message", "type"|"code"|"status"}}`
///
/// Non-JSON bodies fall back to `HTTP {status}: {text}`.
fn parse_error_body(response: &HttpResponse) -> (String, Option<String>) {
    let Ok(json) = serde_json::from_str::<Value>(&response.body) else {
        return (
            format!(
                "HTTP {}: {}",
                response.status,
                sanitize_error_text(&response.body)
            ),
            Some("http_error".to_string()),
        );
    };

    let error = &json["error"];
    let message = error["message"]
        .as_str()
        .or_else(|| error.as_str())
        .map(sanitize_error_text)
        .unwrap_or_else(|| "Unknown error".to_string());

    let code = ["type", "status", "code"]
        .iter()
        .find_map(|key| match &error[*key] {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .or_else(|| json["type"].as_str().map(str::to_string));

    (message, code)
}

/// Redact credentials and truncate long payloads
pub(crate) fn sanitize_error_text(raw: &str) -> String {
    let trimmed = raw.trim();
    let redacted = BEARER_TOKEN_RE.replace_all(trimmed, "Bearer [REDACTED]");
    let redacted = KEY_PARAM_RE.replace_all(&redacted, "${1}[REDACTED]");

    let char_count = redacted.chars().count();
    if char_count <= MAX_ERROR_TEXT_CHARS {
        return redacted.into_owned();
    }

    let truncated: String = redacted.chars().take(MAX_ERROR_TEXT_CHARS).collect();
    format!(
        "{}... [truncated {} chars]",
        truncated,
        char_count - MAX_ERROR_TEXT_CHARS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENAI: VendorErrors = VendorErrors {
        provider: "OpenAI",
        vendor: "OpenAI",
        code_key: "error_type",
    };

    fn openai_error(status: u16, message: &str, kind: &str) -> HttpResponse {
        HttpResponse::new(
            status,
            serde_json::json!({"error": {"message": message, "type": kind}}).to_string(),
        )
    }

    #[test]
    fn test_auth_failures_are_configuration_errors() {
        for status in [401, 403] {
            let error = OPENAI.from_response(&openai_error(status, "Incorrect key", "auth"));
            assert!(matches!(error, LlmError::Configuration { .. }));
            assert_eq!(
                error.to_string(),
                "Configuration error: Invalid API key: Incorrect key"
            );
        }
    }

    #[test]
    fn test_rate_limit_is_quota_error() {
        let error = OPENAI.from_response(&openai_error(429, "Slow down", "rate_limit"));
        assert!(matches!(error, LlmError::QuotaExceeded { .. }));
        assert!(error.to_string().contains("Rate limit exceeded: Slow down"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_bad_request() {
        let error = OPENAI.from_response(&openai_error(400, "bad temperature", "invalid"));
        assert_eq!(error.status_code(), Some(400));
        assert!(error.to_string().contains("Bad request: bad temperature"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_server_error_keeps_vendor_code_and_raw_body() {
        let error = OPENAI.from_response(&openai_error(503, "overloaded", "server_error"));

        assert_eq!(error.status_code(), Some(503));
        assert!(error.to_string().contains("OpenAI API error: overloaded"));

        let details = error.details().unwrap();
        assert_eq!(details["error_type"], "server_error");
        assert!(details["raw_body"].as_str().unwrap().contains("overloaded"));
    }

    #[test]
    fn test_non_json_body_falls_back() {
        let error = OPENAI.from_response(&HttpResponse::new(502, "<html>Bad Gateway</html>"));
        assert!(
            error
                .to_string()
                .contains("OpenAI API error: HTTP 502: <html>Bad Gateway</html>")
        );
    }

    #[test]
    fn test_numeric_vendor_code() {
        let google = VendorErrors {
            provider: "Google",
            vendor: "Google",
            code_key: "error_code",
        };
        let response = HttpResponse::new(
            500,
            serde_json::json!({"error": {"code": 500, "message": "Internal"}}).to_string(),
        );

        let error = google.from_response(&response);
        assert_eq!(error.details().unwrap()["error_code"], "500");
    }

    #[test]
    fn test_transport_timeout_flags() {
        let error = OPENAI.from_transport(CallKind::Unary, TransportError::Timeout);
        assert!(error.is_timeout());
        assert!(error.to_string().contains("Request timed out"));

        let error = OPENAI.from_transport(CallKind::Streaming, TransportError::Timeout);
        assert!(error.is_timeout());
        assert_eq!(error.details().unwrap()["streaming"], true);
    }

    #[test]
    fn test_transport_network_detail() {
        let error = OPENAI.from_transport(
            CallKind::Unary,
            TransportError::Network("connection refused".into()),
        );
        assert_eq!(error.details().unwrap()["network_error"], "connection refused");
        assert!(error.to_string().contains("Network error: connection refused"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_sanitize_redacts_credentials() {
        let text = "GET /models?key=AIzaSyABCDEF&alt=json failed, Authorization: Bearer sk-1234567890abcdef";
        let sanitized = sanitize_error_text(text);

        assert!(!sanitized.contains("AIzaSyABCDEF"));
        assert!(!sanitized.contains("sk-1234567890abcdef"));
        assert!(sanitized.contains("?key=[REDACTED]&alt=json"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let sanitized = sanitize_error_text(&"x".repeat(2000));
        assert!(sanitized.ends_with("... [truncated 976 chars]"));
    }
}
