use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error_mapping::{CallKind, VendorErrors};
use super::http_client::{HttpClientTrait, StreamingResponse};
use super::payload::{GenerationParams, merge_extra_params, with_custom_headers};
use super::streaming::{
    ReportedUsage, SseDecoder, StreamContext, StreamEvent, decode_event, drive,
};
use crate::domain::{
    ChatRequest, ChatResponse, ChatStream, LlmError, LlmProvider, MessageRole, ProviderConfig,
    Usage,
};

const PROVIDER_NAME: &str = "Anthropic (Claude)";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4000;

const ERRORS: VendorErrors = VendorErrors {
    provider: PROVIDER_NAME,
    vendor: "Anthropic",
    code_key: "error_type",
};

/// Served when the deployment has no model-listing endpoint
const KNOWN_MODELS: &[&str] = &[
    "claude-opus-4-20250514",
    "claude-sonnet-4-20250514",
    "claude-3-7-sonnet-20250219",
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// Anthropic Messages API provider
#[derive(Debug)]
pub struct AnthropicProvider<C: HttpClientTrait> {
    client: C,
    config: ProviderConfig,
}

impl<C: HttpClientTrait> AnthropicProvider<C> {
    pub fn new(client: C, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> Result<String, LlmError> {
        Ok(format!("{}/v1/{}", self.config.endpoint()?, path))
    }

    fn api_version(&self) -> &str {
        self.config
            .api_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(ANTHROPIC_VERSION)
    }

    fn headers<'a>(&'a self, api_key: &'a str, streaming: bool) -> Vec<(&'a str, &'a str)> {
        let mut headers = vec![
            ("x-api-key", api_key),
            ("anthropic-version", self.api_version()),
            ("Content-Type", "application/json"),
        ];
        if streaming {
            headers.push(("Accept", "text/event-stream"));
        }
        with_custom_headers(headers, &self.config)
    }

    fn build_request(&self, model: &str, request: &ChatRequest, stream: bool) -> Value {
        // The Messages API takes system prompts as a top-level field
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role() == MessageRole::System)
            .map(|m| m.content())
            .collect();

        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role() != MessageRole::System)
            .map(|m| AnthropicMessage {
                role: m.role().as_str(),
                content: m.content(),
            })
            .collect();

        let params = GenerationParams::resolve(request, &self.config);

        let mut body = Map::new();
        body.insert("model".into(), Value::from(model));
        body.insert(
            "max_tokens".into(),
            Value::from(params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        body.insert("messages".into(), serde_json::json!(messages));

        if !system.is_empty() {
            body.insert("system".into(), Value::from(system.join("\n")));
        }

        if let Some(temperature) = params.temperature {
            body.insert("temperature".into(), Value::from(temperature));
        }

        if stream {
            body.insert("stream".into(), Value::Bool(true));
        }

        merge_extra_params(&mut body, &self.config, request);
        Value::Object(body)
    }

    fn parse_response(
        &self,
        json: Value,
        requested_model: &str,
        response_time_ms: u64,
    ) -> Result<ChatResponse, LlmError> {
        let response = AnthropicResponse::deserialize(&json).map_err(|e| {
            LlmError::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e))
        })?;

        let content: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        // Anthropic reports no total; it is always the sum
        let usage = response
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        let model = response
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| requested_model.to_string());

        tracing::info!(
            provider = PROVIDER_NAME,
            model = %model,
            content_length = content.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received chat response"
        );

        Ok(ChatResponse::new(content, model, PROVIDER_NAME)
            .with_usage(usage)
            .with_cost(self.config.cost_for(&usage))
            .with_response_time(response_time_ms)
            .with_raw_response(json))
    }
}

#[async_trait]
impl<C: HttpClientTrait + 'static> LlmProvider for AnthropicProvider<C> {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn default_max_tokens(&self) -> u32 {
        DEFAULT_MAX_TOKENS
    }

    async fn send_chat_request(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.config.validate()?;

        let model = request.resolve_model(self.config.default_model());
        let url = self.url("messages")?;
        let api_key = self.config.api_key()?;
        let body = self.build_request(model, request, false);

        tracing::info!(
            provider = PROVIDER_NAME,
            model = %model,
            messages = request.messages.len(),
            "Sending chat request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post_json(&url, self.headers(api_key, false), &body)
            .await
            .map_err(|e| ERRORS.from_transport(CallKind::Unary, e))?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        if !response.is_success() {
            return Err(ERRORS.from_response(&response));
        }

        let json = ERRORS.parse_json(&response)?;
        self.parse_response(json, model, response_time_ms)
    }

    async fn stream_chat_request(&self, request: &ChatRequest) -> Result<ChatStream, LlmError> {
        self.config.validate()?;

        let model = request.resolve_model(self.config.default_model());
        let url = self.url("messages")?;
        let api_key = self.config.api_key()?;
        let body = self.build_request(model, request, true);

        tracing::info!(
            provider = PROVIDER_NAME,
            model = %model,
            messages = request.messages.len(),
            "Starting streaming request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post_json_stream(&url, self.headers(api_key, true), &body)
            .await
            .map_err(|e| ERRORS.from_transport(CallKind::Streaming, e))?;

        match response {
            StreamingResponse::Stream(bytes) => Ok(drive(
                bytes,
                SseDecoder::new(parse_stream_event),
                StreamContext {
                    errors: ERRORS,
                    model: model.to_string(),
                    input_chars: request.total_content_length(),
                    cost: self.config.cost,
                    started,
                },
            )),
            StreamingResponse::Error(response) => Err(ERRORS.from_response(&response)),
        }
    }

    async fn get_available_models(&self) -> Result<Vec<String>, LlmError> {
        self.config.validate()?;

        let url = self.url("models")?;
        let api_key = self.config.api_key()?;

        tracing::info!(provider = PROVIDER_NAME, "Fetching available models");

        let response = self
            .client
            .get(&url, self.headers(api_key, false))
            .await
            .map_err(|e| ERRORS.from_transport(CallKind::ModelListing, e))?;

        if response.status == 404 {
            tracing::info!(
                provider = PROVIDER_NAME,
                count = KNOWN_MODELS.len(),
                "No model-listing endpoint, returning known models"
            );
            return Ok(KNOWN_MODELS.iter().map(|m| m.to_string()).collect());
        }

        if !response.is_success() {
            return Err(ERRORS.from_response(&response));
        }

        let list: AnthropicModelList = serde_json::from_value(ERRORS.parse_json(&response)?)
            .map_err(|e| {
                LlmError::provider(PROVIDER_NAME, format!("Failed to parse model list: {}", e))
            })?;

        let models: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
        tracing::info!(provider = PROVIDER_NAME, count = models.len(), "Fetched models");
        Ok(models)
    }
}

/// One SSE `data:` payload of the Messages streaming protocol
///
/// `message_start` carries the model and input usage, `content_block_delta`
/// the text, `message_delta` the cumulative output usage and
/// `message_stop` ends the stream.
fn parse_stream_event(data: &str) -> Vec<StreamEvent> {
    let Some(event) = decode_event::<AnthropicStreamEvent>(PROVIDER_NAME, data) else {
        return Vec::new();
    };

    let parsed = match event {
        AnthropicStreamEvent::MessageStart { message } => StreamEvent {
            model: message.model,
            usage: message.usage.map(|u| ReportedUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: None,
            }),
            ..StreamEvent::default()
        },
        AnthropicStreamEvent::ContentBlockDelta { delta } => match delta.text {
            Some(text) => StreamEvent::delta(text),
            None => return Vec::new(),
        },
        AnthropicStreamEvent::MessageDelta { usage } => StreamEvent {
            usage: usage.map(|u| ReportedUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
                total_tokens: None,
            }),
            ..StreamEvent::default()
        },
        AnthropicStreamEvent::MessageStop => StreamEvent::done(),
        AnthropicStreamEvent::Error { error } => StreamEvent::error(stream_error(error)),
        AnthropicStreamEvent::Other => return Vec::new(),
    };

    vec![parsed]
}

fn stream_error(error: AnthropicErrorBody) -> LlmError {
    let message = error.message.unwrap_or_else(|| "Unknown error".to_string());
    let kind = error.kind.unwrap_or_else(|| "unknown".to_string());

    match kind.as_str() {
        "authentication_error" | "permission_error" => {
            LlmError::configuration(format!("Invalid API key: {}", message))
        }
        "rate_limit_error" => {
            LlmError::quota_exceeded(PROVIDER_NAME, format!("Rate limit exceeded: {}", message))
        }
        _ => LlmError::provider(PROVIDER_NAME, format!("Anthropic API error: {}", message))
            .with_detail("error_type", kind)
            .with_detail("streaming", true),
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicStreamMessage,
    },
    ContentBlockDelta {
        delta: AnthropicDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<AnthropicStreamUsage>,
    },
    MessageStop,
    Error {
        error: AnthropicErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamMessage {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicStreamUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicModelList {
    #[serde(default)]
    data: Vec<AnthropicModel>,
}

#[derive(Debug, Deserialize)]
struct AnthropicModel {
    id: String,
}
