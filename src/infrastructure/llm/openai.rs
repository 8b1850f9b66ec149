use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error_mapping::{CallKind, VendorErrors, sanitize_error_text};
use super::http_client::{HttpClientTrait, StreamingResponse};
use super::payload::{GenerationParams, merge_extra_params, with_custom_headers};
use super::streaming::{
    ReportedUsage, SseDecoder, StreamContext, StreamEvent, decode_event, drive,
};
use crate::domain::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmError, LlmProvider, ProviderConfig,
    Usage,
};

const PROVIDER_NAME: &str = "OpenAI";

const ERRORS: VendorErrors = VendorErrors {
    provider: PROVIDER_NAME,
    vendor: "OpenAI",
    code_key: "error_type",
};

/// OpenAI chat completions provider
///
/// Also serves any OpenAI-compatible endpoint via `api_endpoint`.
#[derive(Debug)]
pub struct OpenAiProvider<C: HttpClientTrait> {
    client: C,
    config: ProviderConfig,
}

impl<C: HttpClientTrait> OpenAiProvider<C> {
    pub fn new(client: C, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> Result<String, LlmError> {
        Ok(format!("{}/{}", self.config.endpoint()?, path))
    }

    fn auth_header(&self) -> Result<String, LlmError> {
        Ok(format!("Bearer {}", self.config.api_key()?))
    }

    fn build_request(&self, model: &str, request: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<OpenAiMessage> =
            request.messages.iter().map(OpenAiMessage::from_domain).collect();

        let mut body = Map::new();
        body.insert("model".into(), Value::from(model));
        body.insert("messages".into(), serde_json::json!(messages));

        let params = GenerationParams::resolve(request, &self.config);
        if let Some(temperature) = params.temperature {
            body.insert("temperature".into(), Value::from(temperature));
        }
        if let Some(max_tokens) = params.max_tokens {
            body.insert("max_tokens".into(), Value::from(max_tokens));
        }

        if stream {
            body.insert("stream".into(), Value::Bool(true));
            body.insert(
                "stream_options".into(),
                serde_json::json!({ "include_usage": true }),
            );
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
        let response = OpenAiResponse::deserialize(&json).map_err(|e| {
            LlmError::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e))
        })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        let usage = response.usage.map(OpenAiUsage::to_domain).unwrap_or_default();
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
impl<C: HttpClientTrait + 'static> LlmProvider for OpenAiProvider<C> {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn send_chat_request(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.config.validate()?;

        let model = request.resolve_model(self.config.default_model());
        let url = self.url("chat/completions")?;
        let auth = self.auth_header()?;
        let body = self.build_request(model, request, false);

        tracing::info!(
            provider = PROVIDER_NAME,
            model = %model,
            messages = request.messages.len(),
            "Sending chat request"
        );

        let headers = with_custom_headers(
            vec![
                ("Authorization", auth.as_str()),
                ("Content-Type", "application/json"),
            ],
            &self.config,
        );

        let started = Instant::now();
        let response = self
            .client
            .post_json(&url, headers, &body)
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
        let url = self.url("chat/completions")?;
        let auth = self.auth_header()?;
        let body = self.build_request(model, request, true);

        tracing::info!(
            provider = PROVIDER_NAME,
            model = %model,
            messages = request.messages.len(),
            "Starting streaming request"
        );

        let headers = with_custom_headers(
            vec![
                ("Authorization", auth.as_str()),
                ("Content-Type", "application/json"),
                ("Accept", "text/event-stream"),
            ],
            &self.config,
        );

        let started = Instant::now();
        let response = self
            .client
            .post_json_stream(&url, headers, &body)
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
        let auth = self.auth_header()?;
        let headers = with_custom_headers(vec![("Authorization", auth.as_str())], &self.config);

        tracing::info!(provider = PROVIDER_NAME, "Fetching available models");

        let response = self
            .client
            .get(&url, headers)
            .await
            .map_err(|e| ERRORS.from_transport(CallKind::ModelListing, e))?;

        if !response.is_success() {
            return Err(ERRORS.from_response(&response));
        }

        let list: OpenAiModelList = serde_json::from_value(ERRORS.parse_json(&response)?)
            .map_err(|e| {
                LlmError::provider(PROVIDER_NAME, format!("Failed to parse model list: {}", e))
            })?;

        let models: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
        tracing::info!(provider = PROVIDER_NAME, count = models.len(), "Fetched models");
        Ok(models)
    }
}

/// One SSE `data:` payload; `[DONE]` ends the stream
///
/// With `include_usage`, the usage block arrives in a final chunk whose
/// `choices` is empty, just before `[DONE]`.
fn parse_stream_event(data: &str) -> Vec<StreamEvent> {
    if data.trim() == "[DONE]" {
        return vec![StreamEvent::done()];
    }

    let Some(chunk) = decode_event::<OpenAiStreamChunk>(PROVIDER_NAME, data) else {
        return Vec::new();
    };

    if let Some(error) = chunk.error {
        return vec![StreamEvent::error(stream_error(&error))];
    }

    let delta = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content);

    vec![StreamEvent {
        delta,
        usage: chunk.usage.map(|u| ReportedUsage {
            input_tokens: Some(u.prompt_tokens),
            output_tokens: Some(u.completion_tokens),
            total_tokens: u.total_tokens,
        }),
        model: chunk.model,
        done: false,
        error: None,
    }]
}

/// Map an `{"error": {...}}` event sent after the stream has started
fn stream_error(error: &Value) -> LlmError {
    let message = error["message"]
        .as_str()
        .map(sanitize_error_text)
        .unwrap_or_else(|| "Unknown error".to_string());
    let kind = error["type"]
        .as_str()
        .or_else(|| error["code"].as_str())
        .unwrap_or("unknown");

    match kind {
        "invalid_api_key" | "authentication_error" | "permission_error" => {
            LlmError::configuration(format!("Invalid API key: {}", message))
        }
        "rate_limit_exceeded" | "insufficient_quota" | "rate_limit_error" => {
            LlmError::quota_exceeded(PROVIDER_NAME, format!("Rate limit exceeded: {}", message))
        }
        _ => LlmError::provider(PROVIDER_NAME, format!("OpenAI API error: {}", message))
            .with_detail("error_type", kind)
            .with_detail("streaming", true),
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl OpenAiMessage {
    fn from_domain(message: &ChatMessage) -> Self {
        Self {
            role: message.role().as_str(),
            content: message.content().to_string(),
            name: message.name().map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl OpenAiUsage {
    fn to_domain(self) -> Usage {
        match self.total_tokens {
            Some(total) => Usage::with_total(self.prompt_tokens, self.completion_tokens, total),
            None => Usage::new(self.prompt_tokens, self.completion_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: Option<OpenAiDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}
