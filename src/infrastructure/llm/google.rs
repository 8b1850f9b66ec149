use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error_mapping::{CallKind, VendorErrors};
use super::http_client::{HttpClientTrait, HttpResponse, StreamingResponse};
use super::payload::{GenerationParams, merge_extra_params, with_custom_headers};
use super::streaming::{
    JsonObjectDecoder, ReportedUsage, StreamContext, StreamEvent, decode_event, drive,
};
use crate::domain::{
    ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmError, LlmProvider, MessageRole,
    ProviderConfig, Usage,
};

const PROVIDER_NAME: &str = "Google";

const ERRORS: VendorErrors = VendorErrors {
    provider: PROVIDER_NAME,
    vendor: "Google",
    code_key: "error_code",
};

/// Google Gemini `generateContent` provider
///
/// Authenticates with the `key` query parameter, so URLs are never logged.
#[derive(Debug)]
pub struct GoogleProvider<C: HttpClientTrait> {
    client: C,
    config: ProviderConfig,
}

impl<C: HttpClientTrait> GoogleProvider<C> {
    pub fn new(client: C, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn model_url(&self, model: &str, method: &str) -> Result<String, LlmError> {
        self.url(&["models", &format!("{}:{}", model, method)])
    }

    /// Endpoint plus percent-encoded path segments and the `key` parameter
    fn url(&self, segments: &[&str]) -> Result<String, LlmError> {
        let endpoint = self.config.endpoint()?;
        let mut url = reqwest::Url::parse(endpoint).map_err(|e| {
            LlmError::configuration(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                LlmError::configuration(format!("Endpoint '{}' cannot be a base URL", endpoint))
            })?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("key", self.config.api_key()?);

        Ok(url.into())
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        with_custom_headers(vec![("Content-Type", "application/json")], &self.config)
    }

    fn build_request(&self, request: &ChatRequest) -> Value {
        let contents: Vec<GeminiContent> =
            request.messages.iter().map(GeminiContent::from_domain).collect();

        let mut body = Map::new();
        body.insert("contents".into(), serde_json::json!(contents));

        let params = GenerationParams::resolve(request, &self.config);
        let mut generation_config = Map::new();
        if let Some(temperature) = params.temperature {
            generation_config.insert("temperature".into(), Value::from(temperature));
        }
        if let Some(max_tokens) = params.max_tokens {
            generation_config.insert("maxOutputTokens".into(), Value::from(max_tokens));
        }
        if !generation_config.is_empty() {
            body.insert("generationConfig".into(), Value::Object(generation_config));
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
        let response = GeminiResponse::deserialize(&json).map_err(|e| {
            LlmError::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e))
        })?;

        let content = response.first_candidate_text().unwrap_or_default();
        let usage = response
            .usage_metadata
            .map(GeminiUsage::to_domain)
            .unwrap_or_default();
        let model = response
            .model_version
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
impl<C: HttpClientTrait + 'static> LlmProvider for GoogleProvider<C> {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn send_chat_request(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.config.validate()?;

        let model = request.resolve_model(self.config.default_model());
        let url = self.model_url(model, "generateContent")?;
        let body = self.build_request(request);

        tracing::info!(
            provider = PROVIDER_NAME,
            model = %model,
            messages = request.messages.len(),
            "Sending chat request"
        );
        tracing::debug!(
            provider = PROVIDER_NAME,
            contents = request.messages.len(),
            has_generation_config = body.get("generationConfig").is_some(),
            "Built Gemini payload"
        );

        let started = Instant::now();
        let response = self
            .client
            .post_json(&url, self.headers(), &body)
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
        let url = self.model_url(model, "streamGenerateContent")?;
        let body = self.build_request(request);

        tracing::info!(
            provider = PROVIDER_NAME,
            model = %model,
            messages = request.messages.len(),
            "Starting streaming request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post_json_stream(&url, self.headers(), &body)
            .await
            .map_err(|e| ERRORS.from_transport(CallKind::Streaming, e))?;

        match response {
            StreamingResponse::Stream(bytes) => Ok(drive(
                bytes,
                JsonObjectDecoder::new(parse_stream_object),
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

        let url = self.url(&["models"])?;

        tracing::info!(provider = PROVIDER_NAME, "Fetching available models");

        let response = self
            .client
            .get(&url, self.headers())
            .await
            .map_err(|e| ERRORS.from_transport(CallKind::ModelListing, e))?;

        if !response.is_success() {
            return Err(ERRORS.from_response(&response));
        }

        let list: GeminiModelList = serde_json::from_value(ERRORS.parse_json(&response)?)
            .map_err(|e| {
                LlmError::provider(PROVIDER_NAME, format!("Failed to parse model list: {}", e))
            })?;

        // Embedding and other non-generative models are left out
        let models: Vec<String> = list
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .filter_map(|m| m.name.strip_prefix("models/").map(str::to_string))
            .collect();

        tracing::info!(provider = PROVIDER_NAME, count = models.len(), "Fetched models");
        Ok(models)
    }
}

/// One top-level object of a `streamGenerateContent` body
///
/// Any candidate `finishReason` ends the stream. `usageMetadata` may repeat;
/// the last one seen wins.
fn parse_stream_object(text: &str) -> Vec<StreamEvent> {
    let Some(value) = decode_event::<Value>(PROVIDER_NAME, text) else {
        return Vec::new();
    };

    if let Some(code) = value["error"]["code"].as_u64() {
        let status = u16::try_from(code).unwrap_or(500);
        let error = ERRORS
            .from_response(&HttpResponse::new(status, text))
            .with_detail("streaming", true);
        return vec![StreamEvent::error(error)];
    }

    let Some(chunk) = decode_event::<GeminiResponse>(PROVIDER_NAME, text) else {
        return Vec::new();
    };

    let done = chunk
        .candidates
        .first()
        .is_some_and(|c| c.finish_reason.is_some());

    vec![StreamEvent {
        delta: chunk.first_candidate_text(),
        usage: chunk.usage_metadata.map(|u| ReportedUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        }),
        model: chunk.model_version,
        done,
        error: None,
    }]
}

// Gemini API types

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPartOut>,
}

#[derive(Debug, Serialize)]
struct GeminiPartOut {
    text: String,
}

impl GeminiContent {
    /// Gemini has no system role: assistant turns become `model`, all others `user`
    fn from_domain(message: &ChatMessage) -> Self {
        let role = match message.role() {
            MessageRole::Assistant => "model",
            MessageRole::User | MessageRole::System => "user",
        };

        Self {
            role,
            parts: vec![GeminiPartOut {
                text: message.content().to_string(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    model_version: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate
    fn first_candidate_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        Some(
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
    #[serde(default)]
    total_token_count: Option<u32>,
}

impl GeminiUsage {
    fn to_domain(self) -> Usage {
        let input = self.prompt_token_count.unwrap_or(0);
        let output = self.candidates_token_count.unwrap_or(0);
        match self.total_token_count {
            Some(total) => Usage::with_total(input, output, total),
            None => Usage::new(input, output),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}
